//! Simulation configuration.
//!
//! Every tunable lives here as data: regime tables, process gains, narrative
//! templates, field and spin parameters. `SimConfig::from_env` layers
//! environment overrides on top of the defaults; `SimConfig::from_json`
//! loads a full document.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::alerts::AlertRule;
use crate::narrative::{default_templates, FirePolicy, NarrativeTemplate, SelectionPolicy};
use crate::types::{Regime, RegimeTable};

pub const SUPPORTED_ASSETS: [&str; 10] = [
    "BTC", "ETH", "SOL", "DOGE", "XRP", "ADA", "AVAX", "MATIC", "LINK", "DOT",
];

// =============================================================================
// Regime chain
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Row-stochastic matrix, rows/cols in `Regime::ALL` order.
    pub transition_matrix: Vec<Vec<f64>>,
    /// Inclusive dwell range drawn after every re-evaluation.
    pub dwell_min: u32,
    pub dwell_max: u32,
    pub initial: Regime,
    pub initial_dwell: u32,
    pub epsilon: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            transition_matrix: vec![
                vec![0.70, 0.15, 0.10, 0.05],
                vec![0.45, 0.35, 0.15, 0.05],
                vec![0.35, 0.20, 0.30, 0.15],
                vec![0.40, 0.10, 0.35, 0.15],
            ],
            dwell_min: 50,
            dwell_max: 150,
            initial: Regime::Calm,
            initial_dwell: 100,
            epsilon: 1e-6,
        }
    }
}

// =============================================================================
// Sentiment process
// =============================================================================

/// Per-regime process parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeParams {
    pub volatility: f64,
    pub base_confidence: f64,
    /// Constant drift of the trend component.
    pub trend_bias: f64,
    /// Amplitude of the periodic trend component.
    pub trend_amplitude: f64,
    pub authenticity_baseline: f64,
    pub funding_bias: f64,
}

pub fn default_regime_params() -> RegimeTable<RegimeParams> {
    RegimeTable {
        calm: RegimeParams {
            volatility: 0.3,
            base_confidence: 0.88,
            trend_bias: 0.0,
            trend_amplitude: 0.0,
            authenticity_baseline: 0.92,
            funding_bias: 0.0,
        },
        trending: RegimeParams {
            volatility: 0.5,
            base_confidence: 0.8,
            trend_bias: 0.0,
            trend_amplitude: 1.0,
            authenticity_baseline: 0.88,
            funding_bias: 0.005,
        },
        volatile: RegimeParams {
            volatility: 1.0,
            base_confidence: 0.65,
            trend_bias: 0.0,
            trend_amplitude: 0.3,
            authenticity_baseline: 0.7,
            funding_bias: 0.01,
        },
        liquidation: RegimeParams {
            volatility: 1.6,
            base_confidence: 0.55,
            trend_bias: -1.0,
            trend_amplitude: 0.0,
            authenticity_baseline: 0.55,
            funding_bias: 0.025,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub regimes: RegimeTable<RegimeParams>,
    /// k1: gain on the score noise (scaled by regime volatility).
    pub noise_gain: f64,
    /// k2: pull of the score back towards zero.
    pub mean_reversion: f64,
    /// k3: gain on the regime trend component.
    pub trend_gain: f64,
    /// Period of the trend oscillation, in simulation-time units.
    pub trend_period: f64,
    pub momentum_scale: f64,
    /// Simulation time advanced per tick.
    pub time_step: f64,
    pub confidence_volatility_weight: f64,
    pub confidence_noise: f64,
    pub confidence_floor: f64,
    /// Attribution centre, [social, onchain, microstructure].
    pub attribution_base: [f64; 3],
    pub attribution_spread: f64,
    pub attribution_floor: f64,
    pub initial_score: f64,
    pub start_ts_ms: u64,
    pub tick_ms: u64,
    pub model: String,
    pub include_signals: bool,
    pub include_authenticity: bool,
    pub funding_base: f64,
    pub funding_gain: f64,
    pub funding_jitter: f64,
    pub funding_threshold: f64,
    pub liquidation_baseline: f64,
    pub liquidation_escalation: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            regimes: default_regime_params(),
            noise_gain: 0.05,
            mean_reversion: 0.01,
            trend_gain: 0.01,
            trend_period: 40.0,
            momentum_scale: 10.0,
            time_step: 0.05,
            confidence_volatility_weight: 0.15,
            confidence_noise: 0.05,
            confidence_floor: 0.1,
            attribution_base: [0.3, 0.5, 0.2],
            attribution_spread: 0.15,
            attribution_floor: 0.01,
            initial_score: 0.45,
            start_ts_ms: 0,
            tick_ms: 500,
            model: "sentiment-fusion-v1".to_string(),
            include_signals: true,
            include_authenticity: true,
            funding_base: 0.01,
            funding_gain: 0.03,
            funding_jitter: 0.002,
            funding_threshold: 0.02,
            liquidation_baseline: 0.1,
            liquidation_escalation: 25.0,
        }
    }
}

// =============================================================================
// Narrative
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeConfig {
    pub fire: FirePolicy,
    pub selection: SelectionPolicy,
    /// Chance that an unmatched token still gets a small contribution.
    pub noise_highlight_probability: f64,
    pub noise_highlight_magnitude: f64,
    pub keyword_jitter: f64,
    /// q: chance the tone is derived from impact instead of the template.
    pub tone_override_probability: f64,
    /// |impact| at which a derived tone becomes hype/fud.
    pub strong_impact: f64,
    pub nlp_confidence_range: (f64, f64),
    pub retained_events: usize,
    pub templates: Vec<NarrativeTemplate>,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            fire: FirePolicy::EveryNTicks { n: 6 },
            selection: SelectionPolicy::RoundRobin,
            noise_highlight_probability: 0.15,
            noise_highlight_magnitude: 0.1,
            keyword_jitter: 0.05,
            tone_override_probability: 0.25,
            strong_impact: 0.3,
            nlp_confidence_range: (0.85, 0.95),
            retained_events: 50,
            templates: default_templates(),
        }
    }
}

// =============================================================================
// Consumers: trail, field, spin, correlation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailConfig {
    pub capacity: usize,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self { capacity: 300 }
    }
}

/// Max-age range and shaping strength for one particle source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub max_age_min: u32,
    pub max_age_max: u32,
    pub speed_scale: f64,
    /// Oscillation amplitude (social) or jitter amplitude (microstructure), radians.
    pub wobble: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfiles {
    pub social: SourceProfile,
    pub onchain: SourceProfile,
    pub microstructure: SourceProfile,
}

impl Default for SourceProfiles {
    fn default() -> Self {
        Self {
            social: SourceProfile {
                max_age_min: 40,
                max_age_max: 90,
                speed_scale: 1.0,
                wobble: 0.6,
            },
            onchain: SourceProfile {
                max_age_min: 150,
                max_age_max: 300,
                speed_scale: 0.5,
                wobble: 0.0,
            },
            microstructure: SourceProfile {
                max_age_min: 20,
                max_age_max: 50,
                speed_scale: 1.4,
                wobble: 0.8,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub divergence_scale: f64,
    pub curl_scale: f64,
    pub angle_gain: f64,
    pub noise_scale: f64,
    pub noise_time_scale: f64,
    pub noise_strength: f64,
    pub curl_rotation: f64,
    pub speed: f64,
    pub decay: f64,
    pub width: f64,
    pub height: f64,
    pub particle_count: usize,
    pub profiles: SourceProfiles,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            divergence_scale: 1.0,
            curl_scale: 1.0,
            angle_gain: 1.0,
            noise_scale: 0.004,
            noise_time_scale: 0.1,
            noise_strength: 1.2,
            curl_rotation: 1.5,
            speed: 2.0,
            decay: 0.92,
            width: 800.0,
            height: 600.0,
            particle_count: 400,
            profiles: SourceProfiles::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinConfig {
    pub nodes: usize,
    /// Ring neighbours linked on each side.
    pub neighbours: usize,
    pub coupling_range: (f64, f64),
    pub field_gain: f64,
    pub influence_weight: f64,
    pub momentum_weight: f64,
    pub noise: f64,
    /// Hysteresis band half-width.
    pub threshold: f64,
    pub consensus_threshold: f64,
    pub polarized_threshold: f64,
    pub extreme_regime: Regime,
    pub cascade_delay: u32,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            nodes: 24,
            neighbours: 2,
            coupling_range: (0.5, 1.0),
            field_gain: 5.0,
            influence_weight: 0.1,
            momentum_weight: 0.05,
            noise: 1.2,
            threshold: 0.3,
            consensus_threshold: 0.7,
            polarized_threshold: 0.2,
            extreme_regime: Regime::Liquidation,
            cascade_delay: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    pub window: usize,
    pub min_samples: usize,
    pub low_correlation: f64,
    pub meaningful_correlation: f64,
    pub sign_tolerance: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window: 100,
            min_samples: 20,
            low_correlation: 0.3,
            meaningful_correlation: 0.5,
            sign_tolerance: 0.1,
        }
    }
}

// =============================================================================
// Runtime and alerts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub seed: u64,
    pub tick_ms: u64,
    pub frame_ms: u64,
    pub correlation_refresh_secs: u64,
    pub symbols: Vec<String>,
    pub primary_symbol: String,
    pub history_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            tick_ms: 500,
            frame_ms: 16,
            correlation_refresh_secs: 30,
            symbols: SUPPORTED_ASSETS.iter().map(|s| s.to_string()).collect(),
            primary_symbol: "BTC".to_string(),
            history_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub rules: Vec<AlertRule>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                AlertRule::RegimeChange,
                AlertRule::ScoreThreshold { threshold: 0.8 },
                AlertRule::ConfidenceDrop { threshold: 0.4 },
            ],
        }
    }
}

// =============================================================================
// Top level
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub narrative: NarrativeConfig,
    #[serde(default)]
    pub trail: TrailConfig,
    #[serde(default)]
    pub field: FieldConfig,
    #[serde(default)]
    pub spin: SpinConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse `"a,b,c,d;e,f,g,h;..."`. Unparseable entries become NaN so the
/// matrix fails validation (naming the row) instead of silently defaulting.
pub fn parse_matrix(raw: &str) -> Vec<Vec<f64>> {
    raw.split(';')
        .filter(|row| !row.trim().is_empty())
        .map(|row| {
            row.split(',')
                .map(|v| v.trim().parse::<f64>().unwrap_or(f64::NAN))
                .collect()
        })
        .collect()
}

impl SimConfig {
    pub fn from_env() -> Self {
        let mut cfg = SimConfig::default();

        if let Ok(raw) = std::env::var("REGIME_MATRIX") {
            cfg.regime.transition_matrix = parse_matrix(&raw);
        }
        cfg.regime.dwell_min = env_parse("DWELL_MIN").unwrap_or(cfg.regime.dwell_min);
        cfg.regime.dwell_max = env_parse("DWELL_MAX").unwrap_or(cfg.regime.dwell_max);

        cfg.runtime.seed = env_parse("SEED").unwrap_or(cfg.runtime.seed);
        cfg.runtime.tick_ms = env_parse("TICK_MS").unwrap_or(cfg.runtime.tick_ms);
        cfg.runtime.frame_ms = env_parse("FRAME_MS").unwrap_or(cfg.runtime.frame_ms);
        cfg.runtime.correlation_refresh_secs =
            env_parse("CORR_REFRESH_SECS").unwrap_or(cfg.runtime.correlation_refresh_secs);
        cfg.runtime.history_capacity =
            env_parse("HISTORY_CAPACITY").unwrap_or(cfg.runtime.history_capacity);
        if let Ok(raw) = std::env::var("SYMBOLS") {
            let symbols: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !symbols.is_empty() {
                cfg.runtime.symbols = symbols;
            }
        }
        if let Ok(primary) = std::env::var("PRIMARY_SYMBOL") {
            cfg.runtime.primary_symbol = primary.trim().to_uppercase();
        }
        cfg.generator.tick_ms = cfg.runtime.tick_ms;

        if let Some(p) = env_parse::<f64>("NARRATIVE_PROB") {
            cfg.narrative.fire = FirePolicy::Probability { p };
        } else if let Some(n) = env_parse::<u32>("NARRATIVE_EVERY") {
            cfg.narrative.fire = FirePolicy::EveryNTicks { n };
        }
        if matches!(
            std::env::var("NARRATIVE_SELECTION").as_deref(),
            Ok("weighted")
        ) {
            cfg.narrative.selection = SelectionPolicy::WeightedRandom;
        }

        cfg.trail.capacity = env_parse("TRAIL_CAPACITY").unwrap_or(cfg.trail.capacity);
        cfg.field.particle_count = env_parse("PARTICLES").unwrap_or(cfg.field.particle_count);
        cfg.spin.nodes = env_parse("SPIN_NODES").unwrap_or(cfg.spin.nodes);
        cfg.correlation.window = env_parse("CORR_WINDOW").unwrap_or(cfg.correlation.window);
        cfg.correlation.min_samples =
            env_parse("CORR_MIN_SAMPLES").unwrap_or(cfg.correlation.min_samples);

        cfg
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
