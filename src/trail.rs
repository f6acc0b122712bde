//! Bounded phase-space trail with linear recency fade.

use std::collections::VecDeque;

use crate::error::ConfigError;
use crate::types::TrailPoint;

#[derive(Debug, Clone)]
pub struct TrailBuffer {
    points: VecDeque<TrailPoint>,
    capacity: usize,
}

impl TrailBuffer {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::parameter("trail.capacity", "must be >= 1"));
        }
        Ok(Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    pub fn push(&mut self, point: TrailPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
        self.refresh_alpha();
    }

    /// Replace the contents with `points`, keeping only the newest `capacity`.
    pub fn rebuild_from(&mut self, points: &[TrailPoint]) {
        let skip = points.len().saturating_sub(self.capacity);
        self.points.clear();
        self.points.extend(points[skip..].iter().copied());
        self.refresh_alpha();
    }

    // alpha_i = (i + 1) / len: oldest is faintest, newest is 1.
    fn refresh_alpha(&mut self) {
        let len = self.points.len() as f64;
        for (i, p) in self.points.iter_mut().enumerate() {
            p.alpha = (i + 1) as f64 / len;
        }
    }

    /// Index of the point closest to `(qx, qy)` in projected coordinates,
    /// within `max_distance`. Ties keep the older point.
    pub fn nearest<F>(&self, qx: f64, qy: f64, max_distance: f64, project: F) -> Option<usize>
    where
        F: Fn(f64, f64) -> (f64, f64),
    {
        let mut best: Option<(usize, f64)> = None;
        for (i, p) in self.points.iter().enumerate() {
            let (px, py) = project(p.x, p.y);
            let d = ((px - qx).powi(2) + (py - qy).powi(2)).sqrt();
            if d > max_distance {
                continue;
            }
            match best {
                Some((_, bd)) if bd <= d => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn get(&self, index: usize) -> Option<&TrailPoint> {
        self.points.get(index)
    }

    pub fn latest(&self) -> Option<&TrailPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailPoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<TrailPoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
