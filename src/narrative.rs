//! Narrative event emitter.
//!
//! Attaches explanatory text to readings: a template is picked, its summary is
//! tokenized, and every token that matches one of the template's keywords gets
//! a signed contribution (a SHAP-style word highlight). Tone comes from the
//! template most of the time and is occasionally re-derived from impact.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::NarrativeConfig;
use crate::error::{check_probability, check_range, ConfigError};
use crate::stats::{clamp_signed, clamp_unit};
use crate::types::{AttributionSource, DetectedTone, NarrativeEvent, SentimentReading, ShapHighlight};

/// When the emitter fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FirePolicy {
    /// Independent Bernoulli(p) draw every reading.
    Probability { p: f64 },
    /// Exactly once every `n` readings.
    EveryNTicks { n: u32 },
}

/// How the next template is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    RoundRobin,
    WeightedRandom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    /// Signed base contribution in [-1, 1].
    pub polarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeTemplate {
    pub summary: String,
    pub source: AttributionSource,
    pub impact: f64,
    #[serde(default)]
    pub entities: Vec<String>,
    pub tone: DetectedTone,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

fn template(
    summary: &str,
    source: AttributionSource,
    impact: f64,
    entities: &[&str],
    tone: DetectedTone,
    keywords: &[(&str, f64)],
    weight: f64,
) -> NarrativeTemplate {
    NarrativeTemplate {
        summary: summary.to_string(),
        source,
        impact,
        entities: entities.iter().map(|e| e.to_string()).collect(),
        tone,
        keywords: keywords
            .iter()
            .map(|(word, polarity)| Keyword {
                word: word.to_string(),
                polarity: *polarity,
            })
            .collect(),
        weight,
    }
}

/// Built-in template bank.
pub fn default_templates() -> Vec<NarrativeTemplate> {
    use AttributionSource::*;
    use DetectedTone::*;
    vec![
        template(
            "Steady accumulation detected from institutional wallets",
            Onchain,
            0.15,
            &["Institutions", "Wallets"],
            Sincere,
            &[("steady", 0.3), ("accumulation", 0.4), ("institutional", 0.35)],
            1.0,
        ),
        template(
            "Funding rates normalizing across major exchanges",
            Microstructure,
            0.1,
            &["Binance", "Bybit", "OKX"],
            Sincere,
            &[("normalizing", 0.4), ("major", 0.2)],
            1.0,
        ),
        template(
            "Community sentiment holding bullish on crypto Twitter",
            Social,
            0.2,
            &["Twitter", "Community"],
            Sincere,
            &[("bullish", 0.5), ("holding", 0.25)],
            1.0,
        ),
        template(
            "Whale wallet activity confirms long-term holding pattern",
            Onchain,
            0.18,
            &["Whales", "HODLers"],
            Sincere,
            &[("whale", 0.3), ("confirms", 0.35), ("long-term", 0.4)],
            1.0,
        ),
        template(
            "Large sell pressure detected from exchange inflows",
            Onchain,
            -0.35,
            &["Exchanges", "Whales"],
            Fud,
            &[("sell", -0.4), ("pressure", -0.3), ("inflows", -0.2)],
            0.8,
        ),
        template(
            "Social media sentiment shifting bearish rapidly",
            Social,
            -0.25,
            &["Twitter", "Reddit"],
            Fud,
            &[("bearish", -0.5), ("rapidly", -0.2)],
            0.8,
        ),
        template(
            "WAGMI! Community sentiment at all-time high",
            Social,
            0.5,
            &["Community", "Twitter"],
            Hype,
            &[("wagmi", 0.6), ("all-time", 0.4), ("high", 0.3)],
            0.5,
        ),
        template(
            "Another dip, thanks for the discount!",
            Social,
            0.1,
            &["Community"],
            Sarcasm,
            &[("dip", -0.2), ("discount", 0.3)],
            0.5,
        ),
        template(
            "Open interest spikes as leveraged longs crowd in",
            Microstructure,
            -0.2,
            &["Perpetuals"],
            Sincere,
            &[("spikes", -0.2), ("leveraged", -0.35), ("crowd", -0.25)],
            0.7,
        ),
    ]
}

/// Strip surrounding punctuation, keeping inner hyphens ("long-term").
fn clean_token(raw: &str) -> &str {
    raw.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Case-insensitive substring match in either direction. The reverse
/// direction (keyword contains token) needs at least 3 chars so stop-words
/// like "on" or "at" do not light up.
fn keyword_matches(token: &str, keyword: &str) -> bool {
    let t = token.to_lowercase();
    let k = keyword.to_lowercase();
    if t.is_empty() || k.is_empty() {
        return false;
    }
    t.contains(&k) || (t.chars().count() >= 3 && k.contains(&t))
}

#[derive(Debug, Clone)]
pub struct NarrativeEventEmitter {
    cfg: NarrativeConfig,
    cursor: usize,
    ticks_since_fire: u32,
    seq: u64,
    recent: VecDeque<NarrativeEvent>,
}

impl NarrativeEventEmitter {
    pub fn new(cfg: NarrativeConfig) -> Result<Self, ConfigError> {
        if cfg.templates.is_empty() {
            return Err(ConfigError::EmptyTemplateBank);
        }
        match cfg.fire {
            FirePolicy::Probability { p } => {
                check_probability("narrative.fire.p", p)?;
            }
            FirePolicy::EveryNTicks { n } if n == 0 => {
                return Err(ConfigError::parameter("narrative.fire.n", "must be >= 1"));
            }
            FirePolicy::EveryNTicks { .. } => {}
        }
        check_probability("narrative.noise_highlight_probability", cfg.noise_highlight_probability)?;
        check_probability("narrative.tone_override_probability", cfg.tone_override_probability)?;
        check_range("narrative.nlp_confidence_range", cfg.nlp_confidence_range)?;
        if cfg.selection == SelectionPolicy::WeightedRandom {
            let valid = cfg.templates.iter().all(|t| t.weight.is_finite() && t.weight >= 0.0);
            let total: f64 = cfg.templates.iter().map(|t| t.weight).sum();
            if !valid || total <= 0.0 {
                return Err(ConfigError::parameter(
                    "narrative.templates.weight",
                    "weights must be >= 0 with a positive sum",
                ));
            }
        }
        let capacity = cfg.retained_events.max(1);
        Ok(Self {
            cfg,
            cursor: 0,
            ticks_since_fire: 0,
            seq: 0,
            recent: VecDeque::with_capacity(capacity),
        })
    }

    fn should_fire<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        match self.cfg.fire {
            FirePolicy::Probability { p } => rng.gen::<f64>() < p,
            FirePolicy::EveryNTicks { n } => {
                self.ticks_since_fire += 1;
                if self.ticks_since_fire >= n {
                    self.ticks_since_fire = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn select<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let len = self.cfg.templates.len();
        match self.cfg.selection {
            SelectionPolicy::RoundRobin => {
                let idx = self.cursor % len;
                self.cursor = (self.cursor + 1) % len;
                idx
            }
            SelectionPolicy::WeightedRandom => {
                let total: f64 = self.cfg.templates.iter().map(|t| t.weight).sum();
                let u = rng.gen::<f64>() * total;
                let mut cumulative = 0.0;
                for (i, t) in self.cfg.templates.iter().enumerate() {
                    cumulative += t.weight;
                    if u < cumulative {
                        return i;
                    }
                }
                len - 1
            }
        }
    }

    /// Per-token contributions for `template`'s summary.
    fn highlights<R: Rng + ?Sized>(&self, template: &NarrativeTemplate, rng: &mut R) -> Vec<ShapHighlight> {
        let mut out = Vec::new();
        for (position, raw) in template.summary.split_whitespace().enumerate() {
            let word = clean_token(raw);
            if word.is_empty() {
                continue;
            }
            let matched = template
                .keywords
                .iter()
                .find(|k| keyword_matches(word, &k.word));
            let contribution = match matched {
                Some(k) => {
                    let jitter = if self.cfg.keyword_jitter > 0.0 {
                        rng.gen_range(-self.cfg.keyword_jitter..self.cfg.keyword_jitter)
                    } else {
                        0.0
                    };
                    clamp_signed(k.polarity + jitter)
                }
                None => {
                    if rng.gen::<f64>() >= self.cfg.noise_highlight_probability {
                        continue;
                    }
                    let m = self.cfg.noise_highlight_magnitude.abs();
                    if m > 0.0 {
                        clamp_signed(rng.gen_range(-m..m))
                    } else {
                        0.0
                    }
                }
            };
            out.push(ShapHighlight {
                word: word.to_string(),
                contribution,
                position,
            });
        }
        out
    }

    /// Tone implied by an impact value relative to the reading it explains.
    pub fn derive_tone(&self, impact: f64, score: f64) -> DetectedTone {
        if impact >= self.cfg.strong_impact {
            DetectedTone::Hype
        } else if impact <= -self.cfg.strong_impact {
            DetectedTone::Fud
        } else if impact * score < 0.0 {
            DetectedTone::Sarcasm
        } else {
            DetectedTone::Sincere
        }
    }

    /// Fire (or not) for this reading. Emitted events are also retained in
    /// the bounded recent-events list.
    pub fn maybe_emit<R: Rng + ?Sized>(
        &mut self,
        reading: &SentimentReading,
        rng: &mut R,
    ) -> Option<NarrativeEvent> {
        if !self.should_fire(rng) {
            return None;
        }
        let idx = self.select(rng);
        let template = self.cfg.templates[idx].clone();
        let shap_highlights = self.highlights(&template, rng);

        let impact = clamp_signed(template.impact);
        let detected_tone = if rng.gen::<f64>() < self.cfg.tone_override_probability {
            self.derive_tone(impact, reading.score)
        } else {
            template.tone
        };

        let (lo, hi) = self.cfg.nlp_confidence_range;
        let nlp_confidence = clamp_unit(if hi > lo { rng.gen_range(lo..hi) } else { lo });

        self.seq += 1;
        let event = NarrativeEvent {
            id: format!(
                "evt-{}-{}-{}",
                reading.timestamp,
                rng.gen_range(1000..10000),
                self.seq
            ),
            summary: template.summary,
            source: template.source,
            impact,
            entities: if template.entities.is_empty() {
                None
            } else {
                Some(template.entities)
            },
            shap_highlights,
            nlp_confidence,
            detected_tone,
            timestamp: reading.timestamp,
        };

        if self.recent.len() >= self.cfg.retained_events.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(event.clone());
        Some(event)
    }

    /// Most recent events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<NarrativeEvent> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    pub fn retained(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attribution, Regime};
    use rand::{rngs::StdRng, SeedableRng};

    fn reading(score: f64) -> SentimentReading {
        SentimentReading {
            timestamp: 1_000,
            symbol: "BTC".into(),
            score,
            momentum: 0.0,
            confidence: 0.8,
            regime: Regime::Calm,
            regime_probability: None,
            attribution: Attribution::balanced(),
            signals: None,
            authenticity: None,
            narrative: None,
            model: "test".into(),
        }
    }

    fn emitter(cfg: NarrativeConfig) -> NarrativeEventEmitter {
        NarrativeEventEmitter::new(cfg).unwrap()
    }

    #[test]
    fn test_every_n_ticks_policy() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 3 };
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(1);
        let fired: Vec<bool> = (0..9)
            .map(|_| e.maybe_emit(&reading(0.2), &mut rng).is_some())
            .collect();
        assert_eq!(
            fired,
            vec![false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_probability_policy_extremes() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::Probability { p: 0.0 };
        let mut never = emitter(cfg.clone());
        cfg.fire = FirePolicy::Probability { p: 1.0 };
        let mut always = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            assert!(never.maybe_emit(&reading(0.0), &mut rng).is_none());
            assert!(always.maybe_emit(&reading(0.0), &mut rng).is_some());
        }
    }

    #[test]
    fn test_round_robin_cycles_templates() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 1 };
        let summaries: Vec<String> = cfg.templates.iter().map(|t| t.summary.clone()).collect();
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(3);
        for round in 0..2 {
            for expected in &summaries {
                let evt = e.maybe_emit(&reading(0.1), &mut rng).unwrap();
                assert_eq!(&evt.summary, expected, "round {}", round);
            }
        }
    }

    #[test]
    fn test_weighted_selection_respects_zero_weight() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 1 };
        cfg.selection = SelectionPolicy::WeightedRandom;
        for t in cfg.templates.iter_mut() {
            t.weight = 0.0;
        }
        cfg.templates[4].weight = 1.0;
        let target = cfg.templates[4].summary.clone();
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..25 {
            assert_eq!(e.maybe_emit(&reading(0.0), &mut rng).unwrap().summary, target);
        }
    }

    #[test]
    fn test_keyword_highlights_carry_polarity() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 1 };
        cfg.noise_highlight_probability = 0.0;
        cfg.keyword_jitter = 0.0;
        cfg.templates = vec![template(
            "Large sell pressure detected from exchange inflows",
            AttributionSource::Onchain,
            -0.35,
            &[],
            DetectedTone::Fud,
            &[("sell", -0.4), ("pressure", -0.3), ("inflows", -0.2)],
            1.0,
        )];
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(5);
        let evt = e.maybe_emit(&reading(-0.3), &mut rng).unwrap();
        let words: Vec<(&str, f64, usize)> = evt
            .shap_highlights
            .iter()
            .map(|h| (h.word.as_str(), h.contribution, h.position))
            .collect();
        assert_eq!(
            words,
            vec![("sell", -0.4, 1), ("pressure", -0.3, 2), ("inflows", -0.2, 6)]
        );
        assert!(evt.entities.is_none());
    }

    #[test]
    fn test_no_keyword_match_gives_empty_highlights() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 1 };
        cfg.noise_highlight_probability = 0.0;
        cfg.templates = vec![template(
            "Nothing notable happened today",
            AttributionSource::Social,
            0.0,
            &[],
            DetectedTone::Sincere,
            &[("liquidation", -0.5)],
            1.0,
        )];
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(6);
        let evt = e.maybe_emit(&reading(0.0), &mut rng).unwrap();
        assert!(evt.shap_highlights.is_empty());
    }

    #[test]
    fn test_keyword_matching_rules() {
        assert!(keyword_matches("WAGMI", "wagmi"));
        assert!(keyword_matches("long-term", "long"));
        assert!(keyword_matches("bull", "bullish"));
        assert!(!keyword_matches("on", "long-term"));
        assert_eq!(clean_token("high!"), "high");
        assert_eq!(clean_token("\"long-term,\""), "long-term");
    }

    #[test]
    fn test_tone_derivation() {
        let e = emitter(NarrativeConfig::default());
        assert_eq!(e.derive_tone(0.5, 0.1), DetectedTone::Hype);
        assert_eq!(e.derive_tone(-0.5, 0.1), DetectedTone::Fud);
        assert_eq!(e.derive_tone(0.1, -0.4), DetectedTone::Sarcasm);
        assert_eq!(e.derive_tone(0.1, 0.4), DetectedTone::Sincere);
    }

    #[test]
    fn test_tone_always_template_when_q_zero() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 1 };
        cfg.tone_override_probability = 0.0;
        let tones: Vec<DetectedTone> = cfg.templates.iter().map(|t| t.tone).collect();
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(7);
        for tone in tones {
            assert_eq!(e.maybe_emit(&reading(-0.9), &mut rng).unwrap().detected_tone, tone);
        }
    }

    #[test]
    fn test_event_fields_in_domain_and_ids_unique() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 1 };
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(8);
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            let evt = e.maybe_emit(&reading(0.2), &mut rng).unwrap();
            assert!((0.85..=0.95).contains(&evt.nlp_confidence));
            assert!((-1.0..=1.0).contains(&evt.impact));
            for h in &evt.shap_highlights {
                assert!((-1.0..=1.0).contains(&h.contribution));
            }
            assert!(ids.insert(evt.id));
        }
    }

    #[test]
    fn test_recent_events_bounded_newest_first() {
        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 1 };
        cfg.retained_events = 5;
        let mut e = emitter(cfg);
        let mut rng = StdRng::seed_from_u64(9);
        let mut last = None;
        for _ in 0..12 {
            last = e.maybe_emit(&reading(0.0), &mut rng);
        }
        assert_eq!(e.retained(), 5);
        let recent = e.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(Some(recent[0].clone()), last);
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut cfg = NarrativeConfig::default();
        cfg.templates.clear();
        assert_eq!(
            NarrativeEventEmitter::new(cfg).unwrap_err(),
            ConfigError::EmptyTemplateBank
        );

        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::Probability { p: 1.5 };
        assert!(NarrativeEventEmitter::new(cfg).is_err());

        let mut cfg = NarrativeConfig::default();
        cfg.fire = FirePolicy::EveryNTicks { n: 0 };
        assert!(NarrativeEventEmitter::new(cfg).is_err());
    }
}
