//! Tokio tick sources for a running market simulation.
//!
//! Each started runner owns its own intervals: the generator tick, the
//! correlation refresh, and (when an observer is attached) the render frame.
//! Nothing is global, so several runners can coexist and each can be stopped
//! on its own.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::RuntimeConfig;
use crate::error::ConfigError;
use crate::feed::Subscription;
use crate::logging::{self, ProfileScope};
use crate::observer::Observer;
use crate::simulation::MarketSimulator;
use crate::types::AssetCorrelation;

pub type SharedSimulator = Arc<Mutex<MarketSimulator>>;
pub type SharedObserver = Arc<Mutex<Observer>>;

/// Owner of a runner's tasks. Dropping it stops the runner.
#[derive(Debug)]
pub struct RunnerHandle {
    tasks: Vec<JoinHandle<()>>,
    subscription: Option<Subscription>,
    correlations: Arc<Mutex<Vec<AssetCorrelation>>>,
    stopped: bool,
}

impl RunnerHandle {
    /// Abort every task and detach the observer. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(mut sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Result of the most recent correlation refresh.
    pub fn correlations(&self) -> Vec<AssetCorrelation> {
        self.correlations
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn period(name: &'static str, millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::MissingTickSource { name });
    }
    Ok(Duration::from_millis(millis))
}

/// Spawn the runner's tasks on the current tokio runtime.
///
/// The observer, when given, is fed readings for `cfg.primary_symbol` via a
/// feed subscription and advanced on its own frame interval.
pub fn spawn(
    sim: SharedSimulator,
    observer: Option<SharedObserver>,
    cfg: &RuntimeConfig,
) -> Result<RunnerHandle, ConfigError> {
    let tick = period("generator_tick", cfg.tick_ms)?;
    let refresh = period("correlation_refresh", cfg.correlation_refresh_secs.saturating_mul(1000))?;
    let frame = if observer.is_some() {
        Some(period("render_frame", cfg.frame_ms)?)
    } else {
        None
    };

    let mut tasks = Vec::new();
    let correlations = Arc::new(Mutex::new(Vec::new()));

    let tick_sim = sim.clone();
    tasks.push(tokio::spawn(async move {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Ok(mut m) = tick_sim.lock() {
                m.step_all();
            }
            logging::tick_aggregator();
        }
    }));

    let refresh_sim = sim.clone();
    let refresh_out = correlations.clone();
    let primary = cfg.primary_symbol.clone();
    tasks.push(tokio::spawn(async move {
        let mut ticker = interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = match refresh_sim.lock() {
                Ok(m) => m.correlation_snapshot(),
                Err(_) => continue,
            };
            let scope = ProfileScope::new("correlation_refresh");
            let pairs = snapshot.correlations(&primary);
            logging::log_correlation_refresh(&primary, &pairs, scope.elapsed_ms());
            if let Ok(mut out) = refresh_out.lock() {
                *out = pairs;
            }
        }
    }));

    let mut subscription = None;
    if let (Some(obs), Some(frame)) = (observer, frame) {
        let feed = sim.lock().map(|m| m.feed()).ok();
        if let Some(feed) = feed {
            let sink = obs.clone();
            subscription = Some(feed.subscribe(move |reading| {
                if let Ok(mut o) = sink.lock() {
                    o.on_reading(reading);
                }
            }));
        }
        let dt = frame.as_secs_f64();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(frame);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Ok(mut o) = obs.lock() {
                    o.on_frame(dt);
                }
            }
        }));
    }

    Ok(RunnerHandle {
        tasks,
        subscription,
        correlations,
        stopped: false,
    })
}
