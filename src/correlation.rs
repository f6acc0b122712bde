//! Cross-asset sentiment correlation and divergence.

use std::collections::BTreeMap;

use crate::config::CorrelationConfig;
use crate::error::{check_probability, ConfigError};
use crate::stats::{pearson, RollingWindow};
use crate::types::{AssetCorrelation, DivergenceKind};

/// Per-symbol sliding windows of sentiment scores. `Clone` is the snapshot
/// mechanism: the refresh task copies the windows and computes off-lock.
#[derive(Debug, Clone)]
pub struct CrossAssetCorrelationEngine {
    cfg: CorrelationConfig,
    windows: BTreeMap<String, RollingWindow>,
}

impl CrossAssetCorrelationEngine {
    pub fn new(cfg: CorrelationConfig) -> Result<Self, ConfigError> {
        if cfg.window < 2 {
            return Err(ConfigError::parameter("correlation.window", "must be >= 2"));
        }
        if cfg.min_samples < 2 || cfg.min_samples > cfg.window {
            return Err(ConfigError::parameter(
                "correlation.min_samples",
                format!("must be in [2, {}]", cfg.window),
            ));
        }
        check_probability("correlation.low_correlation", cfg.low_correlation)?;
        check_probability("correlation.meaningful_correlation", cfg.meaningful_correlation)?;
        if cfg.sign_tolerance.is_nan() || cfg.sign_tolerance < 0.0 {
            return Err(ConfigError::parameter("correlation.sign_tolerance", "must be >= 0"));
        }
        Ok(Self {
            cfg,
            windows: BTreeMap::new(),
        })
    }

    pub fn update(&mut self, symbol: &str, score: f64) {
        if !score.is_finite() {
            return;
        }
        let window = self.cfg.window;
        self.windows
            .entry(symbol.to_string())
            .or_insert_with(|| RollingWindow::new(window))
            .push(score);
    }

    pub fn samples(&self, symbol: &str) -> usize {
        self.windows.get(symbol).map_or(0, |w| w.len())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(|s| s.as_str())
    }

    fn classify(&self, r: f64, latest_target: f64, latest_other: f64) -> Option<DivergenceKind> {
        if r.abs() < self.cfg.low_correlation {
            return Some(DivergenceKind::WeakCorrelation);
        }
        let tol = self.cfg.sign_tolerance;
        if r.abs() >= self.cfg.meaningful_correlation
            && latest_target.abs() > tol
            && latest_other.abs() > tol
        {
            let same_sign = (latest_target > 0.0) == (latest_other > 0.0);
            let expected_same = r > 0.0;
            if same_sign != expected_same {
                return Some(DivergenceKind::SignConflict);
            }
        }
        None
    }

    /// Correlation of `target` against every other symbol with enough
    /// overlapping samples. Unknown target or short history gives an empty
    /// list; zero-variance pairs are left out.
    pub fn correlations(&self, target: &str) -> Vec<AssetCorrelation> {
        let Some(tw) = self.windows.get(target) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (symbol, ow) in &self.windows {
            if symbol == target {
                continue;
            }
            let n = tw.len().min(ow.len());
            if n < self.cfg.min_samples {
                continue;
            }
            let xs = tw.tail(n);
            let ys = ow.tail(n);
            let Some(r) = pearson(&xs, &ys) else {
                continue;
            };
            let latest_other = ys.last().copied().unwrap_or(0.0);
            let latest_target = xs.last().copied().unwrap_or(0.0);
            let reason = self.classify(r, latest_target, latest_other);
            out.push(AssetCorrelation {
                symbol: symbol.clone(),
                sentiment_score: latest_other,
                correlation: r,
                divergence: reason.is_some(),
                divergence_reason: reason,
            });
        }
        out
    }
}
