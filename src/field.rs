//! Vector-field engine: treats a reading as a flow.
//!
//! A reading is mapped to scalar diagnostics (divergence, curl, magnitude)
//! and to a spatial direction field perturbed by coherent noise. Particles
//! emitted from the three attribution sources drift through that field, each
//! source with its own lifetime and shaping rule.
//!
//! ```text
//! divergence = score * momentum * a
//! curl       = |social - onchain| * sign(score) * (1 - confidence) * b
//! angle(x,y) = atan2(-momentum*k, score*k) + noise(x*s, y*s + t*ts)*strength + curl*rotation
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::{FieldConfig, SourceProfile};
use crate::error::{check_probability, ConfigError};
use crate::noise::CoherentNoise;
use crate::stats::sign;
use crate::types::{AttributionSource, SentimentReading};

/// Chance per step that a microstructure particle reverses direction.
const MICRO_FLIP_PROBABILITY: f64 = 0.1;
/// Phase advance per step of the social oscillation.
const SOCIAL_PHASE_STEP: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldDiagnostics {
    pub divergence: f64,
    pub curl: f64,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldVector {
    /// Radians.
    pub angle: f64,
    pub magnitude: f64,
}

impl FieldVector {
    pub fn components(&self) -> (f64, f64) {
        (self.angle.cos() * self.magnitude, self.angle.sin() * self.magnitude)
    }
}

/// A particle is a value: stepping returns the next one, respawning returns a
/// brand new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub age: u32,
    pub max_age: u32,
    pub source: AttributionSource,
    pub phase: f64,
}

impl Particle {
    /// Blend the velocity towards `(fx, fy)` and move.
    pub fn advanced(&self, fx: f64, fy: f64, decay: f64) -> Particle {
        let vx = decay * self.vx + (1.0 - decay) * fx;
        let vy = decay * self.vy + (1.0 - decay) * fy;
        Particle {
            x: self.x + vx,
            y: self.y + vy,
            vx,
            vy,
            age: self.age.saturating_add(1),
            ..*self
        }
    }

    pub fn expired(&self) -> bool {
        self.age > self.max_age
    }
}

pub struct VectorFieldEngine {
    cfg: FieldConfig,
    noise: Arc<dyn CoherentNoise>,
}

impl std::fmt::Debug for VectorFieldEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorFieldEngine")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

fn check_profile(name: &'static str, p: &SourceProfile) -> Result<(), ConfigError> {
    if p.max_age_min == 0 || p.max_age_min > p.max_age_max {
        return Err(ConfigError::parameter(
            name,
            format!("max age range [{}, {}] must satisfy 1 <= min <= max", p.max_age_min, p.max_age_max),
        ));
    }
    if !p.speed_scale.is_finite() || p.speed_scale < 0.0 || !p.wobble.is_finite() || p.wobble < 0.0 {
        return Err(ConfigError::parameter(name, "speed_scale and wobble must be finite and >= 0"));
    }
    Ok(())
}

impl VectorFieldEngine {
    pub fn new(cfg: FieldConfig, noise: Arc<dyn CoherentNoise>) -> Result<Self, ConfigError> {
        check_probability("field.decay", cfg.decay)?;
        if cfg.width.is_nan() || cfg.width <= 0.0 || cfg.height.is_nan() || cfg.height <= 0.0 {
            return Err(ConfigError::parameter("field.bounds", "width and height must be > 0"));
        }
        check_profile("field.profiles.social", &cfg.profiles.social)?;
        check_profile("field.profiles.onchain", &cfg.profiles.onchain)?;
        check_profile("field.profiles.microstructure", &cfg.profiles.microstructure)?;
        Ok(Self { cfg, noise })
    }

    pub fn config(&self) -> &FieldConfig {
        &self.cfg
    }

    pub fn diagnostics(&self, reading: &SentimentReading) -> FieldDiagnostics {
        let a = &reading.attribution;
        FieldDiagnostics {
            divergence: reading.score * reading.momentum * self.cfg.divergence_scale,
            curl: (a.social - a.onchain).abs()
                * sign(reading.score)
                * (1.0 - reading.confidence)
                * self.cfg.curl_scale,
            magnitude: (reading.score * reading.score + reading.momentum * reading.momentum).sqrt(),
        }
    }

    pub fn field_at(&self, x: f64, y: f64, time: f64, reading: &SentimentReading) -> FieldVector {
        let d = self.diagnostics(reading);
        let k = self.cfg.angle_gain;
        let base = (-reading.momentum * k).atan2(reading.score * k);
        let n = self.noise.sample(
            x * self.cfg.noise_scale,
            y * self.cfg.noise_scale + time * self.cfg.noise_time_scale,
        );
        FieldVector {
            angle: base + n * self.cfg.noise_strength + d.curl * self.cfg.curl_rotation,
            magnitude: self.cfg.speed * d.magnitude,
        }
    }

    fn profile(&self, source: AttributionSource) -> &SourceProfile {
        match source {
            AttributionSource::Social => &self.cfg.profiles.social,
            AttributionSource::Onchain => &self.cfg.profiles.onchain,
            AttributionSource::Microstructure => &self.cfg.profiles.microstructure,
        }
    }

    /// Source drawn with probability proportional to the reading's attribution.
    pub fn pick_source<R: Rng + ?Sized>(&self, reading: &SentimentReading, rng: &mut R) -> AttributionSource {
        let u: f64 = rng.gen::<f64>() * reading.attribution.sum();
        let mut cumulative = 0.0;
        for source in AttributionSource::ALL {
            cumulative += reading.attribution.weight(source);
            if u < cumulative {
                return source;
            }
        }
        AttributionSource::Microstructure
    }

    /// A fresh particle at a random position.
    pub fn emit<R: Rng + ?Sized>(&self, reading: &SentimentReading, rng: &mut R) -> Particle {
        let source = self.pick_source(reading, rng);
        let profile = self.profile(source);
        Particle {
            x: rng.gen_range(0.0..self.cfg.width),
            y: rng.gen_range(0.0..self.cfg.height),
            vx: 0.0,
            vy: 0.0,
            age: 0,
            max_age: rng.gen_range(profile.max_age_min..=profile.max_age_max),
            source,
            phase: rng.gen_range(0.0..2.0 * PI),
        }
    }

    fn in_bounds(&self, p: &Particle) -> bool {
        p.x >= 0.0 && p.x <= self.cfg.width && p.y >= 0.0 && p.y <= self.cfg.height
    }

    /// Advance one particle by one frame. Out-of-bounds or expired particles
    /// come back as freshly emitted ones; the flag reports a respawn.
    pub fn step_particle<R: Rng + ?Sized>(
        &self,
        particle: &Particle,
        time: f64,
        reading: &SentimentReading,
        rng: &mut R,
    ) -> (Particle, bool) {
        let field = self.field_at(particle.x, particle.y, time, reading);
        let profile = self.profile(particle.source);
        let mut angle = field.angle;
        match particle.source {
            AttributionSource::Social => {
                angle += profile.wobble * (particle.phase + particle.age as f64 * SOCIAL_PHASE_STEP).sin();
            }
            AttributionSource::Onchain => {}
            AttributionSource::Microstructure => {
                if profile.wobble > 0.0 {
                    angle += rng.gen_range(-profile.wobble..profile.wobble);
                }
                if rng.gen::<f64>() < MICRO_FLIP_PROBABILITY {
                    angle += PI;
                }
            }
        }
        let (fx, fy) = FieldVector {
            angle,
            magnitude: field.magnitude * profile.speed_scale,
        }
        .components();
        let next = particle.advanced(fx, fy, self.cfg.decay);
        if next.expired() || !self.in_bounds(&next) {
            (self.emit(reading, rng), true)
        } else {
            (next, false)
        }
    }
}

/// Fixed-size particle population.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
    respawns: u64,
}

impl ParticleSystem {
    /// Spawn `engine.config().particle_count` particles with staggered ages
    /// so they do not all expire on the same frame.
    pub fn new<R: Rng + ?Sized>(engine: &VectorFieldEngine, reading: &SentimentReading, rng: &mut R) -> Self {
        let particles = (0..engine.config().particle_count)
            .map(|_| {
                let mut p = engine.emit(reading, rng);
                p.age = rng.gen_range(0..p.max_age);
                p
            })
            .collect();
        Self { particles, respawns: 0 }
    }

    /// Advance every particle one frame; returns the number respawned.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        engine: &VectorFieldEngine,
        time: f64,
        reading: &SentimentReading,
        rng: &mut R,
    ) -> usize {
        let mut respawned = 0;
        for p in self.particles.iter_mut() {
            let (next, fresh) = engine.step_particle(p, time, reading, rng);
            *p = next;
            if fresh {
                respawned += 1;
            }
        }
        self.respawns += respawned as u64;
        respawned
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn total_respawns(&self) -> u64 {
        self.respawns
    }

    /// Particle count per source, `AttributionSource::ALL` order.
    pub fn source_counts(&self) -> [usize; 3] {
        let mut counts = [0; 3];
        for p in &self.particles {
            let i = match p.source {
                AttributionSource::Social => 0,
                AttributionSource::Onchain => 1,
                AttributionSource::Microstructure => 2,
            };
            counts[i] += 1;
        }
        counts
    }
}
