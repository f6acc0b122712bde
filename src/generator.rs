//! Sentiment process generator.
//!
//! One call to [`SentimentProcessGenerator::tick`] produces one reading. The
//! continuous state (previous score, simulation time, tick count) lives in a
//! caller-owned [`SimState`], so two simulations never share anything but
//! configuration.
//!
//! ```text
//! score'     = clamp(score + k1·n·vol(regime) − k2·score + k3·trend(regime, t))
//! momentum   = (score' − score) · momentum_scale
//! confidence = clamp(base(regime) − vol(regime)·w + c·n_conf, [floor, 1])
//! ```

use rand::Rng;
use std::f64::consts::TAU;
use std::sync::Arc;

use crate::config::{GeneratorConfig, RegimeParams};
use crate::error::{check_probability, ConfigError};
use crate::noise::CoherentNoise;
use crate::stats::{clamp_signed, clamp_unit};
use crate::types::{
    Attribution, AuthenticityMetrics, Regime, SentimentReading, SignalMetrics,
};

// Distinct noise lanes so the samples are independent of each other.
const SCORE_LANE: f64 = 0.5;
const SOCIAL_LANE: f64 = 37.21;
const ONCHAIN_LANE: f64 = 71.83;
const MICRO_LANE: f64 = 113.57;
const CONFIDENCE_LANE: f64 = 151.19;

/// Continuous simulator state threaded through every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimState {
    pub score: f64,
    pub time: f64,
    pub tick: u64,
}

impl SimState {
    pub fn new(initial_score: f64) -> Self {
        Self {
            score: clamp_signed(initial_score),
            time: 0.0,
            tick: 0,
        }
    }
}

pub struct SentimentProcessGenerator {
    cfg: GeneratorConfig,
    noise: Arc<dyn CoherentNoise>,
}

impl std::fmt::Debug for SentimentProcessGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentProcessGenerator")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..amplitude)
    } else {
        0.0
    }
}

impl SentimentProcessGenerator {
    pub fn new(cfg: GeneratorConfig, noise: Arc<dyn CoherentNoise>) -> Result<Self, ConfigError> {
        check_probability("generator.confidence_floor", cfg.confidence_floor)?;
        if cfg.trend_period.is_nan() || cfg.trend_period <= 0.0 {
            return Err(ConfigError::parameter(
                "generator.trend_period",
                format!("must be > 0, got {}", cfg.trend_period),
            ));
        }
        if cfg.attribution_floor.is_nan() || cfg.attribution_floor <= 0.0 || cfg.attribution_floor > 1.0 {
            return Err(ConfigError::parameter(
                "generator.attribution_floor",
                format!("must be in (0, 1], got {}", cfg.attribution_floor),
            ));
        }
        for regime in Regime::ALL {
            let p = cfg.regimes.get(regime);
            if !p.volatility.is_finite() || p.volatility < 0.0 {
                return Err(ConfigError::parameter(
                    "generator.regimes.volatility",
                    format!("{}: must be finite and >= 0, got {}", regime, p.volatility),
                ));
            }
            check_probability("generator.regimes.base_confidence", p.base_confidence)?;
        }
        Ok(Self { cfg, noise })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.cfg
    }

    pub fn initial_state(&self) -> SimState {
        SimState::new(self.cfg.initial_score)
    }

    pub fn volatility(&self, regime: Regime) -> f64 {
        self.cfg.regimes.get(regime).volatility
    }

    pub fn base_confidence(&self, regime: Regime) -> f64 {
        self.cfg.regimes.get(regime).base_confidence
    }

    /// Trend component: constant bias plus a sinusoid over simulation time.
    pub fn trend_component(&self, regime: Regime, time: f64) -> f64 {
        let p = self.cfg.regimes.get(regime);
        p.trend_bias + p.trend_amplitude * (TAU * time / self.cfg.trend_period).sin()
    }

    /// Produce the next reading and advance `state`.
    pub fn tick<R: Rng + ?Sized>(
        &self,
        state: &mut SimState,
        symbol: &str,
        regime: Regime,
        regime_probability: Option<f64>,
        rng: &mut R,
    ) -> SentimentReading {
        let cfg = &self.cfg;
        let params = *cfg.regimes.get(regime);

        state.tick += 1;
        state.time += cfg.time_step;
        let t = state.time;

        let n_score = self.noise.sample(t, SCORE_LANE);
        let n_social = self.noise.sample(t, SOCIAL_LANE);
        let n_onchain = self.noise.sample(t, ONCHAIN_LANE);
        let n_micro = self.noise.sample(t, MICRO_LANE);
        let n_confidence = self.noise.sample(t, CONFIDENCE_LANE);

        let prev = state.score;
        let score = clamp_signed(
            prev + cfg.noise_gain * n_score * params.volatility
                + cfg.mean_reversion * (-prev)
                + cfg.trend_gain * self.trend_component(regime, t),
        );
        let momentum = (score - prev) * cfg.momentum_scale;

        let confidence = clamp_unit(
            params.base_confidence - params.volatility * cfg.confidence_volatility_weight
                + cfg.confidence_noise * n_confidence,
        )
        .max(cfg.confidence_floor);

        let weight = |base: f64, n: f64| {
            (base + cfg.attribution_spread * n).clamp(cfg.attribution_floor, 1.0)
        };
        let [social_base, onchain_base, micro_base] = cfg.attribution_base;
        let attribution = Attribution::normalized(
            weight(social_base, n_social),
            weight(onchain_base, n_onchain),
            weight(micro_base, n_micro),
        );

        let signals = if cfg.include_signals {
            Some(self.signals(regime, &params, &attribution, rng))
        } else {
            None
        };
        let authenticity = if cfg.include_authenticity {
            Some(self.authenticity(&params, rng))
        } else {
            None
        };

        state.score = score;

        SentimentReading {
            timestamp: cfg.start_ts_ms + state.tick * cfg.tick_ms,
            symbol: symbol.to_string(),
            score,
            momentum,
            confidence,
            regime,
            regime_probability: regime_probability.map(clamp_unit),
            attribution,
            signals,
            authenticity,
            narrative: None,
            model: cfg.model.clone(),
        }
    }

    fn signals<R: Rng + ?Sized>(
        &self,
        regime: Regime,
        params: &RegimeParams,
        attribution: &Attribution,
        rng: &mut R,
    ) -> SignalMetrics {
        let cfg = &self.cfg;
        let funding_rate = cfg.funding_base
            + cfg.funding_gain * (attribution.microstructure - 1.0 / 3.0)
            + params.funding_bias
            + jitter(rng, cfg.funding_jitter);

        let mut liquidation_risk = cfg.liquidation_baseline;
        if funding_rate > cfg.funding_threshold {
            liquidation_risk += (funding_rate - cfg.funding_threshold) * cfg.liquidation_escalation;
        }
        liquidation_risk = clamp_unit(liquidation_risk);
        if regime == Regime::Liquidation {
            let floor = 0.9 + rng.gen::<f64>() * 0.1;
            liquidation_risk = liquidation_risk.max(floor).clamp(0.9, 1.0);
        }

        SignalMetrics {
            funding_rate,
            liquidation_risk,
            sarcasm_detected: clamp_unit(0.2 + jitter(rng, 0.1)),
            whale_movement: clamp_unit(
                0.5 + (attribution.onchain - 1.0 / 3.0) * 0.6 + jitter(rng, 0.2),
            ),
        }
    }

    fn authenticity<R: Rng + ?Sized>(&self, params: &RegimeParams, rng: &mut R) -> AuthenticityMetrics {
        let score = (params.authenticity_baseline + jitter(rng, 0.05)).clamp(0.2, 1.0);
        let inauthentic = 1.0 - score;
        AuthenticityMetrics {
            score,
            bot_filtered: clamp_unit(0.03 + inauthentic * 0.2 + rng.gen::<f64>() * 0.02),
            shill_detected: clamp_unit(0.02 + inauthentic * 0.15 + rng.gen::<f64>() * 0.02),
            organic_ratio: clamp_unit(score + 0.03 - rng.gen::<f64>() * 0.05),
        }
    }
}
