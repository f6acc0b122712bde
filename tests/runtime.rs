//! Tokio runner: tick sources, observer wiring, and shutdown.

use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

use sentimentfx::config::SimConfig;
use sentimentfx::error::ConfigError;
use sentimentfx::noise::ZeroNoise;
use sentimentfx::observer::Observer;
use sentimentfx::runtime::{self, SharedObserver, SharedSimulator};
use sentimentfx::MarketSimulator;

fn config() -> SimConfig {
    let mut cfg = SimConfig::default();
    cfg.runtime.symbols = vec!["BTC".into(), "ETH".into()];
    cfg.runtime.primary_symbol = "BTC".into();
    cfg.runtime.tick_ms = 5;
    cfg.runtime.frame_ms = 5;
    cfg.runtime.correlation_refresh_secs = 1;
    cfg.field.particle_count = 20;
    cfg
}

fn shared(cfg: &SimConfig) -> SharedSimulator {
    Arc::new(Mutex::new(MarketSimulator::new(cfg).unwrap()))
}

#[tokio::test]
async fn runner_ticks_and_feeds_observer() {
    let cfg = config();
    let sim = shared(&cfg);
    let observer: SharedObserver = Arc::new(Mutex::new(
        Observer::new("BTC", &cfg, 9, Arc::new(ZeroNoise)).unwrap(),
    ));
    let mut handle = runtime::spawn(sim.clone(), Some(observer.clone()), &cfg.runtime).unwrap();

    sleep(Duration::from_millis(150)).await;

    let ticks = sim.lock().unwrap().ticks();
    assert!(ticks > 0);
    {
        let obs = observer.lock().unwrap();
        assert!(!obs.trail().is_empty());
        assert!(obs.trail().iter().all(|p| p.x.abs() <= 1.0));
    }
    assert_eq!(sim.lock().unwrap().feed().subscriber_count(), 1);

    handle.stop();
    assert!(handle.is_stopped());
    assert_eq!(sim.lock().unwrap().feed().subscriber_count(), 0);
}

#[tokio::test]
async fn stop_is_idempotent_and_halts_ticks() {
    let cfg = config();
    let sim = shared(&cfg);
    let mut handle = runtime::spawn(sim.clone(), None, &cfg.runtime).unwrap();
    sleep(Duration::from_millis(50)).await;

    handle.stop();
    handle.stop();
    let frozen = sim.lock().unwrap().ticks();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(sim.lock().unwrap().ticks(), frozen);
    drop(handle);
}

#[tokio::test]
async fn independent_runners_coexist() {
    let cfg = config();
    let a = shared(&cfg);
    let b = shared(&cfg);
    let mut ha = runtime::spawn(a.clone(), None, &cfg.runtime).unwrap();
    let _hb = runtime::spawn(b.clone(), None, &cfg.runtime).unwrap();
    sleep(Duration::from_millis(40)).await;
    ha.stop();
    let frozen = a.lock().unwrap().ticks();
    sleep(Duration::from_millis(40)).await;
    assert_eq!(a.lock().unwrap().ticks(), frozen);
    assert!(b.lock().unwrap().ticks() > 0);
}

#[test]
fn zero_period_is_a_missing_tick_source() {
    let mut cfg = config();
    cfg.runtime.tick_ms = 0;
    let err = runtime::spawn(shared(&cfg), None, &cfg.runtime).unwrap_err();
    assert!(matches!(err, ConfigError::MissingTickSource { name: "generator_tick" }));

    let mut cfg = config();
    cfg.runtime.frame_ms = 0;
    let observer: SharedObserver = Arc::new(Mutex::new(
        Observer::new("BTC", &cfg, 1, Arc::new(ZeroNoise)).unwrap(),
    ));
    let err = runtime::spawn(shared(&cfg), Some(observer), &cfg.runtime).unwrap_err();
    assert!(matches!(err, ConfigError::MissingTickSource { name: "render_frame" }));
}
