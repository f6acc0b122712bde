//! Shared value types: readings, narrative events, trail points and the
//! closed enums they are built from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stats::clamp_signed;

/// Market regime, the "weather" the generator is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Calm,
    Trending,
    Volatile,
    Liquidation,
}

impl Regime {
    pub const ALL: [Regime; 4] = [
        Regime::Calm,
        Regime::Trending,
        Regime::Volatile,
        Regime::Liquidation,
    ];

    pub fn index(&self) -> usize {
        match self {
            Regime::Calm => 0,
            Regime::Trending => 1,
            Regime::Volatile => 2,
            Regime::Liquidation => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Calm => "calm",
            Regime::Trending => "trending",
            Regime::Volatile => "volatile",
            Regime::Liquidation => "liquidation",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per regime. Lookup tables are data, not match arms, so any
/// regime's parameters can be swapped out in config or in a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTable<T> {
    pub calm: T,
    pub trending: T,
    pub volatile: T,
    pub liquidation: T,
}

impl<T> RegimeTable<T> {
    pub fn get(&self, regime: Regime) -> &T {
        match regime {
            Regime::Calm => &self.calm,
            Regime::Trending => &self.trending,
            Regime::Volatile => &self.volatile,
            Regime::Liquidation => &self.liquidation,
        }
    }

    pub fn get_mut(&mut self, regime: Regime) -> &mut T {
        match regime {
            Regime::Calm => &mut self.calm,
            Regime::Trending => &mut self.trending,
            Regime::Volatile => &mut self.volatile,
            Regime::Liquidation => &mut self.liquidation,
        }
    }
}

/// The three competing influences behind a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributionSource {
    Social,
    Onchain,
    Microstructure,
}

impl AttributionSource {
    pub const ALL: [AttributionSource; 3] = [
        AttributionSource::Social,
        AttributionSource::Onchain,
        AttributionSource::Microstructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionSource::Social => "social",
            AttributionSource::Onchain => "onchain",
            AttributionSource::Microstructure => "microstructure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedTone {
    Sarcasm,
    Sincere,
    Hype,
    Fud,
}

impl DetectedTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedTone::Sarcasm => "sarcasm",
            DetectedTone::Sincere => "sincere",
            DetectedTone::Hype => "hype",
            DetectedTone::Fud => "fud",
        }
    }
}

/// Attribution weights. Only constructed through [`Attribution::normalized`],
/// so the three weights always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub social: f64,
    pub onchain: f64,
    pub microstructure: f64,
}

impl Attribution {
    /// Zero out negative or non-finite weights and divide by the sum.
    /// An all-zero input falls back to equal thirds.
    pub fn normalized(social: f64, onchain: f64, microstructure: f64) -> Self {
        let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let (s, o, m) = (clean(social), clean(onchain), clean(microstructure));
        let sum = s + o + m;
        if sum <= f64::EPSILON {
            return Self::balanced();
        }
        Self {
            social: s / sum,
            onchain: o / sum,
            microstructure: m / sum,
        }
    }

    pub fn balanced() -> Self {
        Self {
            social: 1.0 / 3.0,
            onchain: 1.0 / 3.0,
            microstructure: 1.0 / 3.0,
        }
    }

    pub fn weight(&self, source: AttributionSource) -> f64 {
        match source {
            AttributionSource::Social => self.social,
            AttributionSource::Onchain => self.onchain,
            AttributionSource::Microstructure => self.microstructure,
        }
    }

    pub fn sum(&self) -> f64 {
        self.social + self.onchain + self.microstructure
    }

    /// Source with the largest weight (ties resolve in declaration order).
    pub fn dominant(&self) -> AttributionSource {
        let mut best = AttributionSource::Social;
        for source in AttributionSource::ALL {
            if self.weight(source) > self.weight(best) {
                best = source;
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalMetrics {
    pub funding_rate: f64,
    pub liquidation_risk: f64,
    pub sarcasm_detected: f64,
    pub whale_movement: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthenticityMetrics {
    pub score: f64,
    pub bot_filtered: f64,
    pub shill_detected: f64,
    pub organic_ratio: f64,
}

/// Per-word explanation of a narrative summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapHighlight {
    pub word: String,
    pub contribution: f64,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEvent {
    pub id: String,
    pub summary: String,
    pub source: AttributionSource,
    pub impact: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
    #[serde(default)]
    pub shap_highlights: Vec<ShapHighlight>,
    pub nlp_confidence: f64,
    pub detected_tone: DetectedTone,
    pub timestamp: u64,
}

/// A single point in sentiment phase space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub symbol: String,
    pub score: f64,
    pub momentum: f64,
    pub confidence: f64,
    pub regime: Regime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime_probability: Option<f64>,
    pub attribution: Attribution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<SignalMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticity: Option<AuthenticityMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativeEvent>,
    pub model: String,
}

impl SentimentReading {
    /// Attach a narrative while the reading is still being assembled.
    pub fn with_narrative(mut self, narrative: Option<NarrativeEvent>) -> Self {
        self.narrative = narrative;
        self
    }

    /// Spin-valued sign of the score; zero counts as bullish.
    pub fn polarity(&self) -> i8 {
        if self.score >= 0.0 {
            1
        } else {
            -1
        }
    }
}

/// Phase-space sample: x = score, y = momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub x: f64,
    pub y: f64,
    pub timestamp: u64,
    pub regime: Regime,
    pub alpha: f64,
}

impl TrailPoint {
    pub fn from_reading(reading: &SentimentReading) -> Self {
        Self {
            x: clamp_signed(reading.score),
            y: reading.momentum,
            timestamp: reading.timestamp,
            regime: reading.regime,
            alpha: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// |r| is too small for the pair to be considered linked.
    WeakCorrelation,
    /// |r| is meaningful but the latest values contradict its sign.
    SignConflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCorrelation {
    pub symbol: String,
    pub sentiment_score: f64,
    pub correlation: f64,
    pub divergence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divergence_reason: Option<DivergenceKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinNode {
    pub id: usize,
    /// Always -1 or +1.
    pub spin: i8,
    pub coupling: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpinLink {
    pub source: usize,
    pub target: usize,
    pub strength: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribution_normalized_sums_to_one() {
        let a = Attribution::normalized(2.0, 1.0, 1.0);
        assert!((a.social - 0.5).abs() < 1e-12);
        assert!((a.onchain - 0.25).abs() < 1e-12);
        assert!((a.microstructure - 0.25).abs() < 1e-12);
        assert!((a.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_attribution_degenerate_falls_back_to_thirds() {
        let a = Attribution::normalized(0.0, -3.0, f64::NAN);
        assert_eq!(a, Attribution::balanced());
    }

    #[test]
    fn test_attribution_dominant() {
        let a = Attribution::normalized(0.2, 0.5, 0.3);
        assert_eq!(a.dominant(), AttributionSource::Onchain);
    }

    #[test]
    fn test_polarity_treats_zero_as_bullish() {
        let mut r = SentimentReading {
            timestamp: 0,
            symbol: "BTC".into(),
            score: 0.0,
            momentum: 0.0,
            confidence: 1.0,
            regime: Regime::Calm,
            regime_probability: None,
            attribution: Attribution::balanced(),
            signals: None,
            authenticity: None,
            narrative: None,
            model: "test".into(),
        };
        assert_eq!(r.polarity(), 1);
        r.score = -0.01;
        assert_eq!(r.polarity(), -1);
    }

    #[test]
    fn test_regime_table_lookup() {
        let mut t = RegimeTable {
            calm: 0.0,
            trending: 0.0,
            volatile: 0.0,
            liquidation: 0.0,
        };
        *t.get_mut(Regime::Volatile) = 1.5;
        assert_eq!(*t.get(Regime::Volatile), 1.5);
        assert_eq!(*t.get(Regime::Calm), 0.0);
    }

    #[test]
    fn test_regime_serializes_lowercase() {
        let s = serde_json::to_string(&Regime::Liquidation).unwrap();
        assert_eq!(s, "\"liquidation\"");
    }
}
