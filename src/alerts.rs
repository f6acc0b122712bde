//! Alert evaluation over consecutive readings of one symbol.

use serde::{Deserialize, Serialize};

use crate::types::{Regime, SentimentReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// Configured alert rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertRule {
    /// Any regime transition.
    RegimeChange,
    /// |score| crosses `threshold` from below.
    ScoreThreshold { threshold: f64 },
    /// Confidence falls below `threshold`.
    ConfidenceDrop { threshold: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub symbol: String,
    pub level: AlertLevel,
    pub message: String,
    pub trigger: String,
    pub timestamp: u64,
}

impl Alert {
    fn new(cur: &SentimentReading, level: AlertLevel, trigger: &str, message: String) -> Self {
        Self {
            symbol: cur.symbol.clone(),
            level,
            message,
            trigger: trigger.to_string(),
            timestamp: cur.timestamp,
        }
    }
}

/// Warning raised on entering a stressed regime.
fn regime_warning(prev: Option<&SentimentReading>, cur: &SentimentReading) -> Option<Alert> {
    let entered = prev.map_or(true, |p| p.regime != cur.regime);
    if !entered {
        return None;
    }
    let level = match cur.regime {
        Regime::Volatile => AlertLevel::Warning,
        Regime::Liquidation => AlertLevel::Critical,
        _ => return None,
    };
    Some(Alert::new(
        cur,
        level,
        "regime_warning",
        format!("{} entered {} regime", cur.symbol, cur.regime),
    ))
}

/// Evaluate all alerts for `cur` given the previous reading of the same symbol.
pub fn evaluate(
    prev: Option<&SentimentReading>,
    cur: &SentimentReading,
    rules: &[AlertRule],
) -> Vec<Alert> {
    let mut out = Vec::new();
    if let Some(a) = regime_warning(prev, cur) {
        out.push(a);
    }
    for rule in rules {
        match *rule {
            AlertRule::RegimeChange => {
                if let Some(p) = prev {
                    if p.regime != cur.regime {
                        out.push(Alert::new(
                            cur,
                            AlertLevel::Info,
                            "regime_change",
                            format!("{} regime {} -> {}", cur.symbol, p.regime, cur.regime),
                        ));
                    }
                }
            }
            AlertRule::ScoreThreshold { threshold } => {
                let was_below = prev.map_or(true, |p| p.score.abs() < threshold);
                if was_below && cur.score.abs() >= threshold {
                    out.push(Alert::new(
                        cur,
                        AlertLevel::Warning,
                        "score_threshold",
                        format!(
                            "{} score {:.3} crossed |{:.2}|",
                            cur.symbol, cur.score, threshold
                        ),
                    ));
                }
            }
            AlertRule::ConfidenceDrop { threshold } => {
                let was_above = prev.map_or(true, |p| p.confidence >= threshold);
                if was_above && cur.confidence < threshold {
                    out.push(Alert::new(
                        cur,
                        AlertLevel::Warning,
                        "confidence_drop",
                        format!(
                            "{} confidence {:.3} below {:.2}",
                            cur.symbol, cur.confidence, threshold
                        ),
                    ));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attribution;

    fn reading(regime: Regime, score: f64, confidence: f64) -> SentimentReading {
        SentimentReading {
            timestamp: 10,
            symbol: "ETH".into(),
            score,
            momentum: 0.0,
            confidence,
            regime,
            regime_probability: None,
            attribution: Attribution::balanced(),
            signals: None,
            authenticity: None,
            narrative: None,
            model: "test".into(),
        }
    }

    fn rules() -> Vec<AlertRule> {
        vec![
            AlertRule::RegimeChange,
            AlertRule::ScoreThreshold { threshold: 0.8 },
            AlertRule::ConfidenceDrop { threshold: 0.4 },
        ]
    }

    #[test]
    fn test_quiet_when_nothing_changes() {
        let a = reading(Regime::Calm, 0.2, 0.9);
        let b = reading(Regime::Calm, 0.25, 0.88);
        assert!(evaluate(Some(&a), &b, &rules()).is_empty());
    }

    #[test]
    fn test_liquidation_entry_is_critical() {
        let a = reading(Regime::Volatile, -0.2, 0.7);
        let b = reading(Regime::Liquidation, -0.3, 0.6);
        let alerts = evaluate(Some(&a), &b, &rules());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[0].trigger, "regime_warning");
        assert_eq!(alerts[1].trigger, "regime_change");
    }

    #[test]
    fn test_regime_warning_fires_once_per_entry() {
        let a = reading(Regime::Volatile, 0.0, 0.7);
        let b = reading(Regime::Volatile, 0.0, 0.7);
        assert!(evaluate(Some(&a), &b, &[]).is_empty());
        let first = evaluate(None, &a, &[]);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].level, AlertLevel::Warning);
    }

    #[test]
    fn test_threshold_rules_fire_on_crossing_only() {
        let a = reading(Regime::Calm, 0.7, 0.5);
        let b = reading(Regime::Calm, -0.85, 0.35);
        let alerts = evaluate(Some(&a), &b, &rules());
        let triggers: Vec<&str> = alerts.iter().map(|a| a.trigger.as_str()).collect();
        assert_eq!(triggers, vec!["score_threshold", "confidence_drop"]);

        let c = reading(Regime::Calm, -0.9, 0.3);
        assert!(evaluate(Some(&b), &c, &rules()).is_empty());
    }

    #[test]
    fn test_rule_serde_shape() {
        let json = serde_json::to_string(&AlertRule::ScoreThreshold { threshold: 0.8 }).unwrap();
        assert_eq!(json, r#"{"type":"score_threshold","threshold":0.8}"#);
    }
}
