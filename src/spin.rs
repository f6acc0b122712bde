//! Ising-style opinion network driven by the aggregate sentiment signal.
//!
//! Each node holds a binary spin (bullish +1 / bearish -1). Nodes sit on a
//! ring lattice and feel their neighbours plus an external field proportional
//! to the current score. A hysteresis band keeps spins sticky. While the
//! market sits in the extreme regime for long enough, every spin is forced to
//! the sign of the score once (a cascade), after which normal dynamics resume.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SpinConfig;
use crate::error::{check_probability, check_range, ConfigError};
use crate::stats::{clamp_unit, variance};
use crate::types::{SentimentReading, SpinLink, SpinNode};

const LINK_STRENGTH: (f64, f64) = (0.5, 1.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinMetrics {
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub polarization: f64,
    pub consensus: bool,
    pub polarized: bool,
    pub susceptibility: f64,
}

/// clamp(variance(spins) * 2, 0, 1).
pub fn susceptibility(spins: &[f64]) -> f64 {
    clamp_unit(variance(spins) * 2.0)
}

#[derive(Debug, Clone)]
pub struct SpinNetworkDynamics {
    cfg: SpinConfig,
    nodes: Vec<SpinNode>,
    links: Vec<SpinLink>,
    adjacency: Vec<Vec<(usize, f64)>>,
    extreme_ticks: u32,
    cascades: u64,
}

impl SpinNetworkDynamics {
    pub fn new<R: Rng + ?Sized>(cfg: SpinConfig, rng: &mut R) -> Result<Self, ConfigError> {
        if cfg.nodes < 2 {
            return Err(ConfigError::parameter("spin.nodes", "need at least 2 nodes"));
        }
        if cfg.neighbours == 0 || 2 * cfg.neighbours >= cfg.nodes {
            return Err(ConfigError::parameter(
                "spin.neighbours",
                format!("must be in [1, {}) for {} nodes", cfg.nodes.div_ceil(2), cfg.nodes),
            ));
        }
        let (lo, hi) = check_range("spin.coupling_range", cfg.coupling_range)?;
        check_probability("spin.coupling_range", lo)?;
        check_probability("spin.coupling_range", hi)?;
        check_probability("spin.consensus_threshold", cfg.consensus_threshold)?;
        check_probability("spin.polarized_threshold", cfg.polarized_threshold)?;
        if cfg.threshold.is_nan() || cfg.threshold < 0.0 || cfg.noise.is_nan() || cfg.noise < 0.0 {
            return Err(ConfigError::parameter("spin.threshold", "threshold and noise must be >= 0"));
        }

        let nodes: Vec<SpinNode> = (0..cfg.nodes)
            .map(|id| SpinNode {
                id,
                spin: if rng.gen::<bool>() { 1 } else { -1 },
                coupling: rng.gen_range(lo..=hi),
            })
            .collect();

        let mut links = Vec::with_capacity(cfg.nodes * cfg.neighbours);
        let mut adjacency = vec![Vec::with_capacity(2 * cfg.neighbours); cfg.nodes];
        for i in 0..cfg.nodes {
            for d in 1..=cfg.neighbours {
                let j = (i + d) % cfg.nodes;
                let strength = rng.gen_range(LINK_STRENGTH.0..=LINK_STRENGTH.1);
                links.push(SpinLink {
                    source: i,
                    target: j,
                    strength,
                });
                adjacency[i].push((j, strength));
                adjacency[j].push((i, strength));
            }
        }

        Ok(Self {
            cfg,
            nodes,
            links,
            adjacency,
            extreme_ticks: 0,
            cascades: 0,
        })
    }

    /// Advance one tick. Returns true when this tick was a cascade.
    pub fn step<R: Rng + ?Sized>(&mut self, reading: &SentimentReading, rng: &mut R) -> bool {
        if reading.regime == self.cfg.extreme_regime {
            self.extreme_ticks = self.extreme_ticks.saturating_add(1);
            if self.extreme_ticks == self.cfg.cascade_delay.max(1) {
                self.set_all(reading.polarity());
                self.cascades += 1;
                return true;
            }
        } else {
            self.extreme_ticks = 0;
        }

        let previous: Vec<i8> = self.nodes.iter().map(|n| n.spin).collect();
        let field = self.cfg.field_gain * reading.score;
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let neighbours = &self.adjacency[i];
            let local: f64 = neighbours
                .iter()
                .map(|&(j, strength)| previous[j] as f64 * strength)
                .sum::<f64>()
                / neighbours.len().max(1) as f64;
            let influence = local + field;
            let noise = if self.cfg.noise > 0.0 {
                rng.gen_range(-self.cfg.noise..self.cfg.noise)
            } else {
                0.0
            };
            let tendency = previous[i] as f64
                + influence * node.coupling * self.cfg.influence_weight
                + noise
                + reading.momentum * self.cfg.momentum_weight;
            if tendency > self.cfg.threshold {
                node.spin = 1;
            } else if tendency < -self.cfg.threshold {
                node.spin = -1;
            }
        }
        false
    }

    pub fn metrics(&self) -> SpinMetrics {
        let n = self.nodes.len();
        let bullish_count = self.nodes.iter().filter(|node| node.spin > 0).count();
        let bearish_count = n - bullish_count;
        let polarization = (bullish_count as f64 - bearish_count as f64).abs() / n as f64;
        let spins: Vec<f64> = self.nodes.iter().map(|node| node.spin as f64).collect();
        SpinMetrics {
            bullish_count,
            bearish_count,
            polarization,
            consensus: polarization > self.cfg.consensus_threshold,
            polarized: polarization < self.cfg.polarized_threshold,
            susceptibility: susceptibility(&spins),
        }
    }

    pub fn nodes(&self) -> &[SpinNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[SpinLink] {
        &self.links
    }

    pub fn cascades(&self) -> u64 {
        self.cascades
    }

    /// Overwrite every spin with the sign of `spin` (zero counts as +1).
    pub fn set_all(&mut self, spin: i8) {
        let s = if spin >= 0 { 1 } else { -1 };
        for node in self.nodes.iter_mut() {
            node.spin = s;
        }
    }
}
