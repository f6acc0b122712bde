//! Derived-state consumer for one symbol's reading stream.
//!
//! Owns everything the physical-analogy views need: the phase-space trail,
//! the particle population, and the spin network. It only ever sees cloned
//! readings and mutates nothing but its own state.

use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;

use crate::config::SimConfig;
use crate::error::ConfigError;
use crate::field::{FieldDiagnostics, ParticleSystem, VectorFieldEngine};
use crate::logging;
use crate::noise::CoherentNoise;
use crate::spin::{SpinMetrics, SpinNetworkDynamics};
use crate::trail::TrailBuffer;
use crate::types::{SentimentReading, TrailPoint};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObserverUpdate {
    pub diagnostics: FieldDiagnostics,
    pub spin: SpinMetrics,
    pub cascade: bool,
    pub trail_len: usize,
}

#[derive(Debug)]
pub struct Observer {
    symbol: String,
    rng: StdRng,
    trail: TrailBuffer,
    field: VectorFieldEngine,
    particles: Option<ParticleSystem>,
    spin: SpinNetworkDynamics,
    last: Option<SentimentReading>,
    frame_time: f64,
    readings_seen: u64,
}

impl Observer {
    pub fn new(
        symbol: &str,
        cfg: &SimConfig,
        seed: u64,
        noise: Arc<dyn CoherentNoise>,
    ) -> Result<Self, ConfigError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let trail = TrailBuffer::new(cfg.trail.capacity)?;
        let field = VectorFieldEngine::new(cfg.field.clone(), noise)?;
        let spin = SpinNetworkDynamics::new(cfg.spin.clone(), &mut rng)?;
        Ok(Self {
            symbol: symbol.to_string(),
            rng,
            trail,
            field,
            particles: None,
            spin,
            last: None,
            frame_time: 0.0,
            readings_seen: 0,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Fold one reading into the trail and the spin network. Readings for
    /// other symbols are ignored.
    pub fn on_reading(&mut self, reading: &SentimentReading) -> Option<ObserverUpdate> {
        if reading.symbol != self.symbol {
            return None;
        }
        self.readings_seen += 1;
        self.trail.push(TrailPoint::from_reading(reading));
        let cascade = self.spin.step(reading, &mut self.rng);
        if cascade {
            logging::log_cascade(
                &self.symbol,
                self.readings_seen,
                reading.polarity(),
                self.spin.cascades(),
            );
        }
        if self.particles.is_none() {
            self.particles = Some(ParticleSystem::new(&self.field, reading, &mut self.rng));
        }
        self.last = Some(reading.clone());
        Some(ObserverUpdate {
            diagnostics: self.field.diagnostics(reading),
            spin: self.spin.metrics(),
            cascade,
            trail_len: self.trail.len(),
        })
    }

    /// Advance the particle population by one frame of `dt` seconds. Does
    /// nothing until the first reading arrives. Returns the respawn count.
    pub fn on_frame(&mut self, dt: f64) -> usize {
        let (Some(reading), Some(particles)) = (&self.last, self.particles.as_mut()) else {
            return 0;
        };
        self.frame_time += dt;
        particles.step(&self.field, self.frame_time, reading, &mut self.rng)
    }

    /// Replace the trail with the phase-space points of `history` (this
    /// symbol only), e.g. when scrubbing to a historical window. Spin and
    /// particle state are left alone.
    pub fn rebuild_trail(&mut self, history: &[SentimentReading]) {
        let points: Vec<TrailPoint> = history
            .iter()
            .filter(|r| r.symbol == self.symbol)
            .map(TrailPoint::from_reading)
            .collect();
        self.trail.rebuild_from(&points);
    }

    /// Trail point closest to `(score, momentum)` within `max_distance`.
    pub fn nearest_point(&self, score: f64, momentum: f64, max_distance: f64) -> Option<&TrailPoint> {
        self.trail
            .nearest(score, momentum, max_distance, |x, y| (x, y))
            .and_then(|i| self.trail.get(i))
    }

    pub fn trail(&self) -> &TrailBuffer {
        &self.trail
    }

    pub fn particles(&self) -> Option<&ParticleSystem> {
        self.particles.as_ref()
    }

    pub fn spin(&self) -> &SpinNetworkDynamics {
        &self.spin
    }

    pub fn field(&self) -> &VectorFieldEngine {
        &self.field
    }

    pub fn diagnostics(&self) -> Option<FieldDiagnostics> {
        self.last.as_ref().map(|r| self.field.diagnostics(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::ZeroNoise;
    use crate::simulation::Simulation;

    #[test]
    fn test_observer_tracks_stream() {
        let mut cfg = SimConfig::default();
        cfg.trail.capacity = 20;
        cfg.field.particle_count = 50;
        let mut sim = Simulation::with_seed("BTC", &cfg, 5).unwrap();
        let mut obs = Observer::new("BTC", &cfg, 5, Arc::new(ZeroNoise)).unwrap();
        assert_eq!(obs.on_frame(0.016), 0);
        assert!(obs.diagnostics().is_none());
        for _ in 0..40 {
            let r = sim.step().reading;
            let u = obs.on_reading(&r).unwrap();
            assert!(u.trail_len <= 20);
            assert!((0.0..=1.0).contains(&u.spin.susceptibility));
        }
        assert_eq!(obs.trail().len(), 20);
        assert_eq!(obs.trail().latest().unwrap().alpha, 1.0);
        for _ in 0..10 {
            obs.on_frame(0.016);
        }
        assert_eq!(obs.particles().unwrap().len(), 50);
        assert!(obs.diagnostics().is_some());
    }

    #[test]
    fn test_observer_ignores_other_symbols() {
        let cfg = SimConfig::default();
        let mut sim = Simulation::with_seed("ETH", &cfg, 6).unwrap();
        let mut obs = Observer::new("BTC", &cfg, 6, Arc::new(ZeroNoise)).unwrap();
        assert!(obs.on_reading(&sim.step().reading).is_none());
        assert!(obs.trail().is_empty());
    }

    #[test]
    fn test_rebuild_trail_from_history_window() {
        let mut cfg = SimConfig::default();
        cfg.trail.capacity = 10;
        let mut sim = Simulation::with_seed("BTC", &cfg, 8).unwrap();
        let history = sim.run(30);
        let mut obs = Observer::new("BTC", &cfg, 8, Arc::new(ZeroNoise)).unwrap();
        for r in &history {
            obs.on_reading(r);
        }
        let window = &history[5..12];
        obs.rebuild_trail(window);
        assert_eq!(obs.trail().len(), 7);
        assert_eq!(obs.trail().get(0).unwrap().timestamp, history[5].timestamp);
        assert_eq!(obs.trail().latest().unwrap().timestamp, history[11].timestamp);
        assert_eq!(obs.trail().latest().unwrap().alpha, 1.0);

        let target = &history[8];
        let hit = obs.nearest_point(target.score, target.momentum, 1e-9).unwrap();
        assert_eq!(hit.timestamp, target.timestamp);
        assert!(obs.nearest_point(5.0, 5.0, 0.1).is_none());
    }

    #[test]
    fn test_zero_trail_capacity_rejected() {
        let mut cfg = SimConfig::default();
        cfg.trail.capacity = 0;
        assert!(Observer::new("BTC", &cfg, 1, Arc::new(ZeroNoise)).is_err());
    }
}
