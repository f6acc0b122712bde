//! Per-symbol simulation and the multi-asset market service.
//!
//! A [`Simulation`] wires one regime chain, one generator and one narrative
//! emitter to a private `StdRng`. [`MarketSimulator`] runs one simulation per
//! symbol, keeps bounded histories, feeds the correlation engine and
//! publishes readings and alerts on a [`SentimentFeed`].

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::alerts::{evaluate, Alert, AlertRule};
use crate::config::SimConfig;
use crate::correlation::CrossAssetCorrelationEngine;
use crate::error::ConfigError;
use crate::feed::SentimentFeed;
use crate::generator::{SentimentProcessGenerator, SimState};
use crate::logging;
use crate::narrative::NarrativeEventEmitter;
use crate::noise::{CoherentNoise, PerlinNoise};
use crate::regime::RegimeStateMachine;
use crate::types::{AssetCorrelation, NarrativeEvent, Regime, SentimentReading};

/// Per-symbol seed derived from the master seed and the symbol's slot.
pub fn derive_seed(master: u64, slot: usize) -> u64 {
    master
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((slot as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9))
}

/// SHA-256 over the JSON lines of `readings`, hex encoded.
pub fn fingerprint(readings: &[SentimentReading]) -> String {
    let mut hasher = Sha256::new();
    for r in readings {
        if let Ok(bytes) = serde_json::to_vec(r) {
            hasher.update(&bytes);
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub reading: SentimentReading,
    pub alerts: Vec<Alert>,
    /// (from, to) when this tick changed the regime.
    pub regime_shift: Option<(Regime, Regime)>,
}

// =============================================================================
// Single-symbol simulation
// =============================================================================

#[derive(Debug)]
pub struct Simulation {
    symbol: String,
    rng: StdRng,
    state: SimState,
    regime: RegimeStateMachine,
    generator: SentimentProcessGenerator,
    narrative: NarrativeEventEmitter,
    alert_rules: Vec<AlertRule>,
    last: Option<SentimentReading>,
}

impl Simulation {
    pub fn new(
        symbol: &str,
        cfg: &SimConfig,
        seed: u64,
        noise: Arc<dyn CoherentNoise>,
    ) -> Result<Self, ConfigError> {
        let regime = RegimeStateMachine::new(&cfg.regime)?;
        let generator = SentimentProcessGenerator::new(cfg.generator.clone(), noise)?;
        let narrative = NarrativeEventEmitter::new(cfg.narrative.clone())?;
        let state = generator.initial_state();
        Ok(Self {
            symbol: symbol.to_string(),
            rng: StdRng::seed_from_u64(seed),
            state,
            regime,
            generator,
            narrative,
            alert_rules: cfg.alerts.rules.clone(),
            last: None,
        })
    }

    /// Seeded Perlin noise for the generator.
    pub fn with_seed(symbol: &str, cfg: &SimConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::new(symbol, cfg, seed, Arc::new(PerlinNoise::new(seed)))
    }

    pub fn step(&mut self) -> StepOutput {
        let before = self.regime.current();
        let regime = self.regime.step(&mut self.rng);
        let probability = self.regime.regime_probability();
        let reading = self.generator.tick(
            &mut self.state,
            &self.symbol,
            regime,
            Some(probability),
            &mut self.rng,
        );
        let narrative = self.narrative.maybe_emit(&reading, &mut self.rng);
        if let Some(evt) = &narrative {
            logging::log_narrative(&self.symbol, evt);
        }
        let reading = reading.with_narrative(narrative);

        let regime_shift = if regime != before {
            logging::log_regime_shift(
                &self.symbol,
                self.state.tick,
                before,
                regime,
                probability,
                self.regime.dwell_remaining(),
            );
            Some((before, regime))
        } else {
            None
        };
        logging::log_reading(&reading, self.state.tick);

        let alerts = evaluate(self.last.as_ref(), &reading, &self.alert_rules);
        self.last = Some(reading.clone());
        StepOutput {
            reading,
            alerts,
            regime_shift,
        }
    }

    /// Run `ticks` steps and collect the readings.
    pub fn run(&mut self, ticks: usize) -> Vec<SentimentReading> {
        (0..ticks).map(|_| self.step().reading).collect()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn tick(&self) -> u64 {
        self.state.tick
    }

    pub fn regime_machine(&self) -> &RegimeStateMachine {
        &self.regime
    }

    pub fn last(&self) -> Option<&SentimentReading> {
        self.last.as_ref()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<NarrativeEvent> {
        self.narrative.recent(limit)
    }
}

// =============================================================================
// Multi-asset service
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub symbol: String,
    /// Inclusive lower bound, epoch ms.
    pub start: Option<u64>,
    /// Inclusive upper bound, epoch ms.
    pub end: Option<u64>,
    /// Newest `limit` matches.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeOverview {
    pub symbol: String,
    pub regime: Regime,
    pub probability: f64,
    pub score: f64,
    pub confidence: f64,
}

#[derive(Debug)]
pub struct MarketSimulator {
    symbols: Vec<String>,
    sims: BTreeMap<String, Simulation>,
    history: BTreeMap<String, VecDeque<SentimentReading>>,
    history_capacity: usize,
    correlation: CrossAssetCorrelationEngine,
    feed: SentimentFeed,
    ticks: u64,
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

impl MarketSimulator {
    /// One Perlin-driven simulation per configured symbol.
    pub fn new(cfg: &SimConfig) -> Result<Self, ConfigError> {
        Self::build(cfg, |seed| Arc::new(PerlinNoise::new(seed)))
    }

    /// Same noise field for every symbol (useful with `ZeroNoise` in tests).
    pub fn with_noise(cfg: &SimConfig, noise: Arc<dyn CoherentNoise>) -> Result<Self, ConfigError> {
        Self::build(cfg, move |_| noise.clone())
    }

    fn build<F>(cfg: &SimConfig, noise_for: F) -> Result<Self, ConfigError>
    where
        F: Fn(u64) -> Arc<dyn CoherentNoise>,
    {
        let symbols: Vec<String> = cfg.runtime.symbols.iter().map(|s| normalize_symbol(s)).collect();
        if symbols.is_empty() {
            return Err(ConfigError::parameter("runtime.symbols", "at least one symbol is required"));
        }
        if cfg.runtime.history_capacity == 0 {
            return Err(ConfigError::parameter("runtime.history_capacity", "must be >= 1"));
        }
        let mut sims = BTreeMap::new();
        for (slot, symbol) in symbols.iter().enumerate() {
            if sims.contains_key(symbol) {
                return Err(ConfigError::parameter(
                    "runtime.symbols",
                    format!("duplicate symbol {}", symbol),
                ));
            }
            let seed = derive_seed(cfg.runtime.seed, slot);
            sims.insert(symbol.clone(), Simulation::new(symbol, cfg, seed, noise_for(seed))?);
        }
        Ok(Self {
            history: symbols.iter().map(|s| (s.clone(), VecDeque::new())).collect(),
            symbols,
            sims,
            history_capacity: cfg.runtime.history_capacity,
            correlation: CrossAssetCorrelationEngine::new(cfg.correlation.clone())?,
            feed: SentimentFeed::new(),
            ticks: 0,
        })
    }

    /// Advance every symbol one tick, in configured order.
    pub fn step_all(&mut self) -> Vec<StepOutput> {
        self.ticks += 1;
        let mut out = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            let Some(sim) = self.sims.get_mut(symbol) else {
                continue;
            };
            let step = sim.step();
            if let Some(h) = self.history.get_mut(symbol) {
                if h.len() >= self.history_capacity {
                    h.pop_front();
                }
                h.push_back(step.reading.clone());
            }
            self.correlation.update(symbol, step.reading.score);
            self.feed.publish(&step.reading);
            for alert in &step.alerts {
                logging::log_alert(alert);
                self.feed.publish_alert(alert);
            }
            out.push(step);
        }
        out
    }

    pub fn feed(&self) -> SentimentFeed {
        self.feed.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn supported_assets(&self) -> &[String] {
        &self.symbols
    }

    pub fn latest(&self, symbol: &str) -> Option<SentimentReading> {
        self.history
            .get(&normalize_symbol(symbol))
            .and_then(|h| h.back().cloned())
    }

    /// Oldest-first readings matching the query.
    pub fn history(&self, query: &HistoryQuery) -> Vec<SentimentReading> {
        let Some(h) = self.history.get(&normalize_symbol(&query.symbol)) else {
            return Vec::new();
        };
        let matches: Vec<&SentimentReading> = h
            .iter()
            .filter(|r| query.start.map_or(true, |s| r.timestamp >= s))
            .filter(|r| query.end.map_or(true, |e| r.timestamp <= e))
            .collect();
        let skip = query
            .limit
            .map_or(0, |l| matches.len().saturating_sub(l));
        matches.into_iter().skip(skip).cloned().collect()
    }

    /// Recent narrative events for `symbol`, newest first.
    pub fn events(&self, symbol: &str, limit: usize) -> Vec<NarrativeEvent> {
        self.sims
            .get(&normalize_symbol(symbol))
            .map(|s| s.recent_events(limit))
            .unwrap_or_default()
    }

    pub fn correlations(&self, symbol: &str) -> Vec<AssetCorrelation> {
        self.correlation.correlations(&normalize_symbol(symbol))
    }

    /// Copy of the correlation windows for off-lock computation.
    pub fn correlation_snapshot(&self) -> CrossAssetCorrelationEngine {
        self.correlation.clone()
    }

    pub fn regimes(&self) -> Vec<RegimeOverview> {
        self.symbols
            .iter()
            .filter_map(|symbol| {
                let sim = self.sims.get(symbol)?;
                let last = sim.last()?;
                Some(RegimeOverview {
                    symbol: symbol.clone(),
                    regime: last.regime,
                    probability: sim.regime_machine().regime_probability(),
                    score: last.score,
                    confidence: last.confidence,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::ZeroNoise;

    fn small_cfg() -> SimConfig {
        let mut cfg = SimConfig::default();
        cfg.runtime.symbols = vec!["btc".into(), "ETH".into(), "SOL".into()];
        cfg.runtime.history_capacity = 50;
        cfg
    }

    #[test]
    fn test_same_seed_same_fingerprint() {
        let cfg = SimConfig::default();
        let a = Simulation::with_seed("BTC", &cfg, 7).unwrap().run(300);
        let b = Simulation::with_seed("BTC", &cfg, 7).unwrap().run(300);
        let c = Simulation::with_seed("BTC", &cfg, 8).unwrap().run(300);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_narrative_every_six_ticks_by_default() {
        let cfg = SimConfig::default();
        let readings = Simulation::with_seed("ETH", &cfg, 1).unwrap().run(60);
        let with_narrative: Vec<usize> = readings
            .iter()
            .enumerate()
            .filter(|(_, r)| r.narrative.is_some())
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(with_narrative, vec![6, 12, 18, 24, 30, 36, 42, 48, 54, 60]);
    }

    #[test]
    fn test_timestamps_simulated() {
        let mut cfg = SimConfig::default();
        cfg.generator.start_ts_ms = 1_000;
        let readings = Simulation::with_seed("BTC", &cfg, 3).unwrap().run(3);
        let ts: Vec<u64> = readings.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![1_500, 2_000, 2_500]);
    }

    #[test]
    fn test_market_history_bounded_and_queryable() {
        let mut m = MarketSimulator::new(&small_cfg()).unwrap();
        for _ in 0..80 {
            m.step_all();
        }
        let all = m.history(&HistoryQuery {
            symbol: "btc".into(),
            ..Default::default()
        });
        assert_eq!(all.len(), 50);
        let last5 = m.history(&HistoryQuery {
            symbol: "BTC".into(),
            limit: Some(5),
            ..Default::default()
        });
        assert_eq!(last5.len(), 5);
        assert_eq!(last5.last(), all.last());
        let ranged = m.history(&HistoryQuery {
            symbol: "BTC".into(),
            start: Some(all[10].timestamp),
            end: Some(all[19].timestamp),
            limit: None,
        });
        assert_eq!(ranged.len(), 10);
        assert!(m.history(&HistoryQuery {
            symbol: "NOPE".into(),
            ..Default::default()
        })
        .is_empty());
    }

    #[test]
    fn test_market_overview_and_lookups() {
        let mut m = MarketSimulator::with_noise(&small_cfg(), Arc::new(ZeroNoise)).unwrap();
        assert!(m.regimes().is_empty());
        assert!(m.latest("BTC").is_none());
        for _ in 0..30 {
            m.step_all();
        }
        let overview = m.regimes();
        assert_eq!(overview.len(), 3);
        assert_eq!(overview[0].symbol, "BTC");
        assert_eq!(m.supported_assets(), &["BTC", "ETH", "SOL"]);
        assert_eq!(m.events("eth", 10).len(), 5);
        assert!(m.events("DOGE", 10).is_empty());
        assert_eq!(m.feed().published(), 90);
        assert_eq!(m.latest("SOL").unwrap().symbol, "SOL");
    }

    #[test]
    fn test_market_correlations_after_min_samples() {
        let mut m = MarketSimulator::new(&small_cfg()).unwrap();
        for _ in 0..19 {
            m.step_all();
        }
        assert!(m.correlations("BTC").is_empty());
        for _ in 0..10 {
            m.step_all();
        }
        let c = m.correlations("BTC");
        assert_eq!(c.len(), 2);
        for pair in c {
            assert!((-1.0..=1.0).contains(&pair.correlation));
        }
    }

    #[test]
    fn test_rejects_duplicate_symbols() {
        let mut cfg = small_cfg();
        cfg.runtime.symbols = vec!["BTC".into(), "btc".into()];
        assert!(MarketSimulator::new(&cfg).is_err());
    }
}
