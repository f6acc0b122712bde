//! Regime state machine: a discrete Markov chain with dwell-time persistence.
//!
//! The chain only re-evaluates when its dwell counter runs out; in between
//! the current regime is held. Because every state draws its dwell from the
//! same range, the long-run share of ticks spent in each regime equals the
//! stationary distribution of the transition matrix.

use rand::Rng;

use crate::config::RegimeConfig;
use crate::error::ConfigError;
use crate::types::Regime;

const N: usize = 4;

/// Validated row-stochastic matrix over `Regime::ALL`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    rows: [[f64; N]; N],
}

impl TransitionMatrix {
    pub fn from_rows(rows: &[Vec<f64>], epsilon: f64) -> Result<Self, ConfigError> {
        if rows.len() != N {
            return Err(ConfigError::MatrixRows {
                expected: N,
                got: rows.len(),
            });
        }
        let mut out = [[0.0; N]; N];
        for (i, row) in rows.iter().enumerate() {
            let from = Regime::ALL[i];
            if row.len() != N {
                return Err(ConfigError::MatrixRowLength {
                    row: from,
                    expected: N,
                    got: row.len(),
                });
            }
            for (j, &p) in row.iter().enumerate() {
                if !p.is_finite() || p < 0.0 {
                    return Err(ConfigError::InvalidTransition {
                        row: from,
                        col: Regime::ALL[j],
                        value: p,
                    });
                }
                out[i][j] = p;
            }
            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > epsilon {
                return Err(ConfigError::NotRowStochastic {
                    row: from,
                    sum,
                    epsilon,
                });
            }
        }
        Ok(Self { rows: out })
    }

    pub fn row(&self, from: Regime) -> &[f64; N] {
        &self.rows[from.index()]
    }

    pub fn probability(&self, from: Regime, to: Regime) -> f64 {
        self.rows[from.index()][to.index()]
    }

    /// Walk `from`'s row cumulatively and return the first state whose
    /// cumulative probability exceeds `u`. The last state takes the residual.
    pub fn sample(&self, from: Regime, u: f64) -> Regime {
        let row = self.row(from);
        let mut cumulative = 0.0;
        for (j, p) in row.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                return Regime::ALL[j];
            }
        }
        Regime::ALL[N - 1]
    }

    /// Stationary distribution by power iteration on the lazy chain
    /// `(P + I) / 2`, which shares P's stationary vector and converges even
    /// when P is periodic.
    pub fn stationary(&self) -> [f64; N] {
        let mut pi = [1.0 / N as f64; N];
        for _ in 0..100_000 {
            let mut next = [0.0; N];
            for i in 0..N {
                next[i] += 0.5 * pi[i];
                for j in 0..N {
                    next[j] += 0.5 * pi[i] * self.rows[i][j];
                }
            }
            let delta: f64 = next.iter().zip(&pi).map(|(a, b)| (a - b).abs()).sum();
            pi = next;
            if delta < 1e-13 {
                break;
            }
        }
        let total: f64 = pi.iter().sum();
        if total > 0.0 {
            for p in pi.iter_mut() {
                *p /= total;
            }
        }
        pi
    }
}

#[derive(Debug, Clone)]
pub struct RegimeStateMachine {
    matrix: TransitionMatrix,
    current: Regime,
    dwell: u32,
    dwell_min: u32,
    dwell_max: u32,
    last_transition_probability: f64,
}

impl RegimeStateMachine {
    pub fn new(cfg: &RegimeConfig) -> Result<Self, ConfigError> {
        let matrix = TransitionMatrix::from_rows(&cfg.transition_matrix, cfg.epsilon)?;
        Self::with_matrix(matrix, cfg.dwell_min, cfg.dwell_max, cfg.initial, cfg.initial_dwell)
    }

    pub fn with_matrix(
        matrix: TransitionMatrix,
        dwell_min: u32,
        dwell_max: u32,
        initial: Regime,
        initial_dwell: u32,
    ) -> Result<Self, ConfigError> {
        if dwell_min == 0 || dwell_min > dwell_max {
            return Err(ConfigError::parameter(
                "regime.dwell",
                format!("dwell range [{}, {}] must satisfy 1 <= min <= max", dwell_min, dwell_max),
            ));
        }
        let last_transition_probability = matrix.probability(initial, initial);
        Ok(Self {
            matrix,
            current: initial,
            dwell: initial_dwell,
            dwell_min,
            dwell_max,
            last_transition_probability,
        })
    }

    /// Advance one tick.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Regime {
        self.dwell = self.dwell.saturating_sub(1);
        if self.dwell > 0 {
            return self.current;
        }
        let u: f64 = rng.gen();
        let next = self.matrix.sample(self.current, u);
        self.last_transition_probability = self.matrix.probability(self.current, next);
        self.current = next;
        self.dwell = rng.gen_range(self.dwell_min..=self.dwell_max);
        next
    }

    pub fn current(&self) -> Regime {
        self.current
    }

    pub fn dwell_remaining(&self) -> u32 {
        self.dwell
    }

    /// Probability of the transition that produced the current regime.
    pub fn regime_probability(&self) -> f64 {
        self.last_transition_probability
    }

    pub fn matrix(&self) -> &TransitionMatrix {
        &self.matrix
    }

    /// Long-run share of ticks per regime, `Regime::ALL` order.
    pub fn stationary(&self) -> [f64; N] {
        self.matrix.stationary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn cfg() -> RegimeConfig {
        RegimeConfig::default()
    }

    #[test]
    fn test_rejects_row_not_summing_to_one() {
        let mut c = cfg();
        c.transition_matrix[2] = vec![0.5, 0.2, 0.2, 0.2];
        let err = RegimeStateMachine::new(&c).unwrap_err();
        match err {
            ConfigError::NotRowStochastic { row, .. } => assert_eq!(row, Regime::Volatile),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let mut c = cfg();
        c.transition_matrix.pop();
        assert!(matches!(
            RegimeStateMachine::new(&c),
            Err(ConfigError::MatrixRows { got: 3, .. })
        ));

        let mut c = cfg();
        c.transition_matrix[0] = vec![0.5, 0.5];
        assert!(matches!(
            RegimeStateMachine::new(&c),
            Err(ConfigError::MatrixRowLength { row: Regime::Calm, .. })
        ));
    }

    #[test]
    fn test_rejects_negative_entry() {
        let mut c = cfg();
        c.transition_matrix[1] = vec![1.2, -0.2, 0.0, 0.0];
        assert!(matches!(
            RegimeStateMachine::new(&c),
            Err(ConfigError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_dwell_range() {
        let mut c = cfg();
        c.dwell_min = 10;
        c.dwell_max = 5;
        assert!(RegimeStateMachine::new(&c).is_err());
        c.dwell_min = 0;
        c.dwell_max = 5;
        assert!(RegimeStateMachine::new(&c).is_err());
    }

    #[test]
    fn test_holds_regime_while_dwell_positive() {
        let mut c = cfg();
        c.initial_dwell = 5;
        let mut sm = RegimeStateMachine::new(&c).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..4 {
            assert_eq!(sm.step(&mut rng), Regime::Calm);
        }
        assert_eq!(sm.dwell_remaining(), 1);
        sm.step(&mut rng);
        assert!(sm.dwell_remaining() >= c.dwell_min && sm.dwell_remaining() <= c.dwell_max);
    }

    #[test]
    fn test_sample_walks_cumulative_row() {
        let m = TransitionMatrix::from_rows(&cfg().transition_matrix, 1e-6).unwrap();
        assert_eq!(m.sample(Regime::Calm, 0.0), Regime::Calm);
        assert_eq!(m.sample(Regime::Calm, 0.69), Regime::Calm);
        assert_eq!(m.sample(Regime::Calm, 0.71), Regime::Trending);
        assert_eq!(m.sample(Regime::Calm, 0.86), Regime::Volatile);
        assert_eq!(m.sample(Regime::Calm, 0.999_999_9), Regime::Liquidation);
    }

    #[test]
    fn test_last_state_absorbs_rounding() {
        let rows = vec![
            vec![0.3333333, 0.3333333, 0.3333333, 0.0],
            vec![0.25, 0.25, 0.25, 0.25],
            vec![0.25, 0.25, 0.25, 0.25],
            vec![0.25, 0.25, 0.25, 0.25],
        ];
        let m = TransitionMatrix::from_rows(&rows, 1e-6).unwrap();
        assert_eq!(m.sample(Regime::Calm, 0.99999995), Regime::Liquidation);
    }

    #[test]
    fn test_stationary_of_identity_like_chain() {
        let rows = vec![
            vec![0.5, 0.5, 0.0, 0.0],
            vec![0.5, 0.5, 0.0, 0.0],
            vec![0.5, 0.5, 0.0, 0.0],
            vec![0.5, 0.5, 0.0, 0.0],
        ];
        let m = TransitionMatrix::from_rows(&rows, 1e-6).unwrap();
        let pi = m.stationary();
        assert!((pi[0] - 0.5).abs() < 1e-9);
        assert!((pi[1] - 0.5).abs() < 1e-9);
        assert!(pi[2].abs() < 1e-9);
    }

    #[test]
    fn test_stationary_of_periodic_chain() {
        // calm and trending alternate deterministically; the others feed calm
        let rows = vec![
            vec![0.0, 1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0],
        ];
        let m = TransitionMatrix::from_rows(&rows, 1e-6).unwrap();
        let pi = m.stationary();
        assert!((pi[0] - 0.5).abs() < 1e-9, "{:?}", pi);
        assert!((pi[1] - 0.5).abs() < 1e-9, "{:?}", pi);
        assert!(pi[2].abs() < 1e-9);
        assert!(pi[3].abs() < 1e-9);
    }

    #[test]
    fn test_stationary_is_fixed_point_of_default_matrix() {
        let m = TransitionMatrix::from_rows(&RegimeConfig::default().transition_matrix, 1e-6).unwrap();
        let pi = m.stationary();
        for j in 0..N {
            let next: f64 = (0..N).map(|i| pi[i] * m.rows[i][j]).sum();
            assert!((next - pi[j]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_regime_probability_tracks_transition() {
        let mut c = cfg();
        c.initial_dwell = 1;
        let mut sm = RegimeStateMachine::new(&c).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let from = sm.current();
        let to = sm.step(&mut rng);
        assert_eq!(sm.regime_probability(), sm.matrix().probability(from, to));
    }
}
