//! Compare observed regime occupancy against the chain's stationary
//! distribution.
//!
//! Usage:
//!   regime_check [ticks] [seed]
//!
//! Honors REGIME_MATRIX / DWELL_MIN / DWELL_MAX. Exits non-zero when any
//! regime's observed share deviates from the stationary share by more than
//! TOLERANCE (default 0.02).

use anyhow::{bail, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde_json::json;

use sentimentfx::config::SimConfig;
use sentimentfx::logging;
use sentimentfx::regime::RegimeStateMachine;
use sentimentfx::Regime;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let ticks: u64 = args.next().and_then(|v| v.parse().ok()).unwrap_or(1_000_000);
    let cfg = SimConfig::from_env();
    let seed: u64 = args.next().and_then(|v| v.parse().ok()).unwrap_or(cfg.runtime.seed);
    let tolerance: f64 = std::env::var("TOLERANCE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.02);

    let mut chain = RegimeStateMachine::new(&cfg.regime).map_err(|e| {
        logging::log_config_error("regime", &e);
        e
    })?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = [0u64; 4];
    let mut transitions = 0u64;
    let mut prev = chain.current();
    for _ in 0..ticks {
        let r = chain.step(&mut rng);
        counts[r.index()] += 1;
        if r != prev {
            transitions += 1;
        }
        prev = r;
    }

    let stationary = chain.stationary();
    let mut worst = 0.0f64;
    let rows: Vec<_> = Regime::ALL
        .iter()
        .map(|r| {
            let observed = counts[r.index()] as f64 / ticks.max(1) as f64;
            let expected = stationary[r.index()];
            worst = worst.max((observed - expected).abs());
            json!({
                "regime": r.as_str(),
                "observed": observed,
                "stationary": expected,
                "delta": observed - expected,
            })
        })
        .collect();

    println!(
        "{}",
        json!({
            "ticks": ticks,
            "seed": seed,
            "transitions": transitions,
            "max_delta": worst,
            "tolerance": tolerance,
            "regimes": rows,
        })
    );
    if worst > tolerance {
        bail!("regime occupancy off by {:.4} (tolerance {:.4})", worst, tolerance);
    }
    Ok(())
}
