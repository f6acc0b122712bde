//! Ingress normalization for externally supplied readings.
//!
//! Payloads from replay files or upstream services are loosely typed JSON.
//! Nothing here fails: missing fields fall back to documented defaults,
//! out-of-range numbers are clamped, and unknown labels map to a fixed
//! fallback. Every such repair is listed in the [`IngressReport`].
//!
//! Defaults for missing fields:
//!
//! | field        | default              |
//! |--------------|----------------------|
//! | timestamp    | caller-supplied      |
//! | score        | 0.0                  |
//! | momentum     | 0.0                  |
//! | confidence   | 0.5                  |
//! | regime       | calm                 |
//! | attribution  | equal thirds         |
//!
//! A reading with any missing field is `degraded` and has its confidence
//! multiplied by [`DEGRADATION_FACTOR`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::stats::{clamp_signed, clamp_unit};
use crate::types::{
    Attribution, AttributionSource, AuthenticityMetrics, DetectedTone, NarrativeEvent, Regime,
    SentimentReading, ShapHighlight, SignalMetrics,
};

pub const DEGRADATION_FACTOR: f64 = 0.5;
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_SYMBOL: &str = "UNKNOWN";
pub const DEFAULT_MODEL: &str = "external";

const REGIME_LABELS: &[(&str, Regime)] = &[
    ("calm", Regime::Calm),
    ("trending", Regime::Trending),
    ("volatile", Regime::Volatile),
    ("liquidation", Regime::Liquidation),
];

const TONE_LABELS: &[(&str, DetectedTone)] = &[
    ("sarcasm", DetectedTone::Sarcasm),
    ("sincere", DetectedTone::Sincere),
    ("hype", DetectedTone::Hype),
    ("fud", DetectedTone::Fud),
];

const SOURCE_LABELS: &[(&str, AttributionSource)] = &[
    ("social", AttributionSource::Social),
    ("onchain", AttributionSource::Onchain),
    ("microstructure", AttributionSource::Microstructure),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IngressIssue {
    NotAnObject,
    MissingField { field: &'static str },
    Clamped { field: &'static str, value: f64 },
    UnknownLabel { field: &'static str, label: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngressReport {
    /// A label had to be mapped to a fallback value.
    pub fidelity_loss: bool,
    /// A required field was missing.
    pub degraded: bool,
    pub issues: Vec<IngressIssue>,
}

impl IngressReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn missing(&mut self, field: &'static str) {
        self.degraded = true;
        self.issues.push(IngressIssue::MissingField { field });
    }

    fn unknown(&mut self, field: &'static str, label: &str) {
        self.fidelity_loss = true;
        self.issues.push(IngressIssue::UnknownLabel {
            field,
            label: label.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngressOutcome {
    pub reading: SentimentReading,
    pub report: IngressReport,
}

fn lookup<T: Copy>(table: &[(&str, T)], label: &str) -> Option<T> {
    let label = label.trim().to_lowercase();
    table.iter().find(|(k, _)| *k == label).map(|(_, v)| *v)
}

/// First present key among the snake_case and camelCase spellings.
fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite())
}

fn number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    field(obj, keys).and_then(as_number)
}

/// Clamp with `clamp_fn`, logging an issue when the value moved.
fn clamped(report: &mut IngressReport, name: &'static str, value: f64, clamp_fn: fn(f64) -> f64) -> f64 {
    let c = clamp_fn(value);
    if c != value {
        report.issues.push(IngressIssue::Clamped { field: name, value });
    }
    c
}

fn parse_regime(obj: &Map<String, Value>, report: &mut IngressReport) -> Regime {
    match field(obj, &["regime"]).and_then(Value::as_str) {
        Some(label) => lookup(REGIME_LABELS, label).unwrap_or_else(|| {
            report.unknown("regime", label);
            Regime::Calm
        }),
        None => {
            report.missing("regime");
            Regime::Calm
        }
    }
}

fn parse_attribution(obj: &Map<String, Value>, report: &mut IngressReport) -> Attribution {
    let Some(a) = field(obj, &["attribution"]).and_then(Value::as_object) else {
        report.missing("attribution");
        return Attribution::balanced();
    };
    let mut weight = |name: &'static str, keys: &[&str]| {
        number(a, keys).unwrap_or_else(|| {
            report.missing(name);
            0.0
        })
    };
    let s = weight("attribution.social", &["social"]);
    let o = weight("attribution.onchain", &["onchain", "onChain"]);
    let m = weight("attribution.microstructure", &["microstructure", "microStructure"]);
    for (name, v) in [
        ("attribution.social", s),
        ("attribution.onchain", o),
        ("attribution.microstructure", m),
    ] {
        if v < 0.0 {
            report.issues.push(IngressIssue::Clamped { field: name, value: v });
        }
    }
    Attribution::normalized(s, o, m)
}

fn parse_signals(obj: &Map<String, Value>) -> Option<SignalMetrics> {
    let s = field(obj, &["signals"])?.as_object()?;
    Some(SignalMetrics {
        funding_rate: number(s, &["funding_rate", "fundingRate"]).unwrap_or(0.0),
        liquidation_risk: clamp_unit(number(s, &["liquidation_risk", "liquidationRisk"]).unwrap_or(0.0)),
        sarcasm_detected: clamp_unit(number(s, &["sarcasm_detected", "sarcasmDetected"]).unwrap_or(0.0)),
        whale_movement: clamp_unit(number(s, &["whale_movement", "whaleMovement"]).unwrap_or(0.0)),
    })
}

fn parse_authenticity(obj: &Map<String, Value>) -> Option<AuthenticityMetrics> {
    let a = field(obj, &["authenticity"])?.as_object()?;
    Some(AuthenticityMetrics {
        score: clamp_unit(number(a, &["score"]).unwrap_or(0.0)),
        bot_filtered: clamp_unit(number(a, &["bot_filtered", "botFiltered"]).unwrap_or(0.0)),
        shill_detected: clamp_unit(number(a, &["shill_detected", "shillDetected"]).unwrap_or(0.0)),
        organic_ratio: clamp_unit(number(a, &["organic_ratio", "organicRatio"]).unwrap_or(0.0)),
    })
}

fn parse_narrative(obj: &Map<String, Value>, timestamp: u64, report: &mut IngressReport) -> Option<NarrativeEvent> {
    let n = field(obj, &["narrative"])?.as_object()?;
    let source = match field(n, &["source"]).and_then(Value::as_str) {
        Some(label) => lookup(SOURCE_LABELS, label).unwrap_or_else(|| {
            report.unknown("narrative.source", label);
            AttributionSource::Onchain
        }),
        None => AttributionSource::Onchain,
    };
    let detected_tone = match field(n, &["detected_tone", "detectedTone"]).and_then(Value::as_str) {
        Some(label) => lookup(TONE_LABELS, label).unwrap_or_else(|| {
            report.unknown("narrative.detected_tone", label);
            DetectedTone::Sincere
        }),
        None => DetectedTone::Sincere,
    };
    let entities = field(n, &["entities"]).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(|e| e.as_str().map(str::to_string))
            .collect::<Vec<_>>()
    });
    let shap_highlights = field(n, &["shap_highlights", "shapHighlights"])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, h)| {
                    let h = h.as_object()?;
                    Some(ShapHighlight {
                        word: field(h, &["word"])?.as_str()?.to_string(),
                        contribution: clamp_signed(number(h, &["contribution"]).unwrap_or(0.0)),
                        position: number(h, &["position"]).map_or(i, |p| p.max(0.0) as usize),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(NarrativeEvent {
        id: field(n, &["id"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("ext-{}", timestamp)),
        summary: field(n, &["summary"]).and_then(Value::as_str).unwrap_or_default().to_string(),
        source,
        impact: clamp_signed(number(n, &["impact"]).unwrap_or(0.0)),
        entities,
        shap_highlights,
        nlp_confidence: clamp_unit(number(n, &["nlp_confidence", "nlpConfidence"]).unwrap_or(0.0)),
        detected_tone,
        timestamp: number(n, &["timestamp"]).map_or(timestamp, |t| t.max(0.0) as u64),
    })
}

/// Normalize one payload. `fallback_ts` is used when the payload has no
/// usable timestamp.
pub fn normalize_payload(payload: &Value, fallback_ts: u64) -> IngressOutcome {
    let mut report = IngressReport::default();
    let empty = Map::new();
    let obj = match payload.as_object() {
        Some(o) => o,
        None => {
            report.degraded = true;
            report.issues.push(IngressIssue::NotAnObject);
            &empty
        }
    };

    let timestamp = match number(obj, &["timestamp", "ts"]) {
        Some(t) if t >= 0.0 => t as u64,
        _ => {
            report.missing("timestamp");
            fallback_ts
        }
    };
    let symbol = field(obj, &["symbol"])
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SYMBOL.to_string());

    let score = match number(obj, &["score"]) {
        Some(v) => clamped(&mut report, "score", v, clamp_signed),
        None => {
            report.missing("score");
            0.0
        }
    };
    let momentum = number(obj, &["momentum"]).unwrap_or_else(|| {
        report.missing("momentum");
        0.0
    });
    let mut confidence = match number(obj, &["confidence"]) {
        Some(v) => clamped(&mut report, "confidence", v, clamp_unit),
        None => {
            report.missing("confidence");
            DEFAULT_CONFIDENCE
        }
    };
    let regime = parse_regime(obj, &mut report);
    let attribution = parse_attribution(obj, &mut report);
    let regime_probability = number(obj, &["regime_probability", "regimeProbability"])
        .map(|p| clamped(&mut report, "regime_probability", p, clamp_unit));
    let signals = parse_signals(obj);
    let authenticity = parse_authenticity(obj);
    let narrative = parse_narrative(obj, timestamp, &mut report);
    let model = field(obj, &["model"])
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_MODEL)
        .to_string();

    if report.degraded {
        confidence *= DEGRADATION_FACTOR;
    }

    IngressOutcome {
        reading: SentimentReading {
            timestamp,
            symbol,
            score,
            momentum,
            confidence,
            regime,
            regime_probability,
            attribution,
            signals,
            authenticity,
            narrative,
            model,
        },
        report,
    }
}

// =============================================================================
// Replay ordering
// =============================================================================

/// Accepts readings with non-decreasing timestamps; anything older than the
/// last accepted reading is dropped and counted.
#[derive(Debug, Clone, Default)]
struct ReplayWindow {
    last_ts: Option<u64>,
    dropped: u64,
}

impl ReplayWindow {
    fn admit(&mut self, reading: &SentimentReading) -> bool {
        match self.last_ts {
            Some(last) if reading.timestamp < last => {
                self.dropped += 1;
                false
            }
            _ => {
                self.last_ts = Some(reading.timestamp);
                true
            }
        }
    }
}

/// Keep the in-order subsequence of `readings`. Returns it with the number
/// of readings dropped.
pub fn ordered_replay<I>(readings: I) -> (Vec<SentimentReading>, u64)
where
    I: IntoIterator<Item = SentimentReading>,
{
    let mut window = ReplayWindow::default();
    let kept = readings.into_iter().filter(|r| window.admit(r)).collect();
    (kept, window.dropped)
}
