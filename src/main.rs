use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{interval, Duration};

use sentimentfx::config::SimConfig;
use sentimentfx::logging::{self, obj, params_hash, v_str, Domain, Level};
use sentimentfx::noise::PerlinNoise;
use sentimentfx::observer::Observer;
use sentimentfx::runtime;
use sentimentfx::simulation::MarketSimulator;

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = SimConfig::from_env();
    let cfg_json = serde_json::to_string(&cfg)?;
    logging::log_run_start(cfg.runtime.seed, &cfg.runtime.symbols, &params_hash(&cfg_json));

    let market = MarketSimulator::new(&cfg).map_err(|e| {
        logging::log_config_error("market", &e);
        e
    })?;
    let primary = cfg.runtime.primary_symbol.clone();
    if !market.supported_assets().contains(&primary) {
        logging::log(
            Level::Warn,
            Domain::System,
            "primary_symbol_unknown",
            obj(&[("symbol", v_str(&primary))]),
        );
    }
    let observer = Observer::new(
        &primary,
        &cfg,
        cfg.runtime.seed,
        Arc::new(PerlinNoise::new(cfg.runtime.seed.wrapping_add(1))),
    )
    .map_err(|e| {
        logging::log_config_error("observer", &e);
        e
    })?;

    let sim = Arc::new(Mutex::new(market));
    let obs = Arc::new(Mutex::new(observer));
    let mut handle = runtime::spawn(sim.clone(), Some(obs.clone()), &cfg.runtime).map_err(|e| {
        logging::log_config_error("runtime", &e);
        e
    })?;

    // STREAM_READINGS=1 writes primary-symbol readings as JSONL (replayable);
    // pair with LOG_STDOUT=0 to keep the stream clean.
    let _stream = matches!(std::env::var("STREAM_READINGS").as_deref(), Ok("1")).then(|| {
        let feed = sim.lock().map(|m| m.feed()).ok()?;
        let symbol = primary.clone();
        Some(feed.subscribe(move |reading| {
            if reading.symbol == symbol {
                if let Ok(line) = serde_json::to_string(reading) {
                    println!("{}", line);
                }
            }
        }))
    })
    .flatten();

    // RUN_SECS bounds the session; unset runs until Ctrl-C.
    let run_secs = env_u64("RUN_SECS");
    let status_secs = env_u64("STATUS_SECS").unwrap_or(5).max(1);
    let started = Instant::now();
    let mut status = interval(Duration::from_secs(status_secs));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = status.tick() => {
                let regimes = sim.lock().map(|m| m.regimes()).unwrap_or_default();
                let (spin, trail_len, diagnostics) = match obs.lock() {
                    Ok(o) => (Some(o.spin().metrics()), o.trail().len(), o.diagnostics()),
                    Err(_) => (None, 0, None),
                };
                let divergent = handle
                    .correlations()
                    .into_iter()
                    .filter(|c| c.divergence)
                    .map(|c| c.symbol)
                    .collect::<Vec<_>>();
                logging::log(
                    Level::Info,
                    Domain::System,
                    "status",
                    obj(&[
                        ("symbol", v_str(&primary)),
                        ("regimes", json!(regimes)),
                        ("spin", json!(spin)),
                        ("field", json!(diagnostics)),
                        ("trail_len", json!(trail_len)),
                        ("divergent", json!(divergent)),
                    ]),
                );
                if run_secs.map_or(false, |limit| started.elapsed().as_secs() >= limit) {
                    break;
                }
            }
        }
    }

    handle.stop();
    let ticks = sim.lock().map(|m| m.ticks()).unwrap_or(0);
    logging::log_session_summary(started.elapsed().as_secs(), ticks, cfg.runtime.symbols.len());
    logging::flush();
    Ok(())
}
