//! Construction-time failures.
//!
//! Malformed ingress, out-of-range values and short histories are all
//! recovered inside the core (defaults, clamping, empty results). The only
//! thing that escapes is a bad configuration, and it escapes at construction
//! so a running simulation never discovers it mid-tick.

use crate::types::Regime;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("regime transition matrix: expected {expected} rows, got {got}")]
    MatrixRows { expected: usize, got: usize },

    #[error("regime transition matrix row `{row}`: expected {expected} entries, got {got}")]
    MatrixRowLength {
        row: Regime,
        expected: usize,
        got: usize,
    },

    #[error("regime transition matrix row `{row}` sums to {sum} (must be 1 ± {epsilon})")]
    NotRowStochastic { row: Regime, sum: f64, epsilon: f64 },

    #[error("regime transition matrix row `{row}`, column `{col}`: invalid probability {value}")]
    InvalidTransition { row: Regime, col: Regime, value: f64 },

    #[error("{parameter}: {detail}")]
    InvalidParameter {
        parameter: &'static str,
        detail: String,
    },

    #[error("probability `{parameter}` = {value} is outside [0, 1]")]
    InvalidProbability { parameter: &'static str, value: f64 },

    #[error("tick source `{name}` is absent (period must be > 0)")]
    MissingTickSource { name: &'static str },

    #[error("narrative template bank is empty")]
    EmptyTemplateBank,
}

impl ConfigError {
    pub fn parameter(parameter: &'static str, detail: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            parameter,
            detail: detail.into(),
        }
    }
}

/// Reject a probability that is NaN or outside [0, 1].
pub fn check_probability(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidProbability { parameter, value })
    }
}

/// Reject an inclusive range whose bounds are inverted or non-finite.
pub fn check_range(parameter: &'static str, range: (f64, f64)) -> Result<(f64, f64), ConfigError> {
    let (lo, hi) = range;
    if lo.is_finite() && hi.is_finite() && lo <= hi {
        Ok(range)
    } else {
        Err(ConfigError::parameter(
            parameter,
            format!("invalid range [{}, {}]", lo, hi),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_bounds() {
        assert!(check_probability("p", 0.0).is_ok());
        assert!(check_probability("p", 1.0).is_ok());
        assert!(check_probability("p", -0.1).is_err());
        assert!(check_probability("p", f64::NAN).is_err());
    }

    #[test]
    fn test_error_message_names_parameter() {
        let err = check_range("dwell", (5.0, 1.0)).unwrap_err();
        assert!(err.to_string().starts_with("dwell:"));
    }
}
