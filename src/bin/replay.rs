//! Replay a JSONL stream of readings through ingress and the observer.
//!
//! Usage:
//!   replay [file.jsonl]            - read payloads from a file (stdin if omitted)
//!   replay --generate <n> [seed]   - emit n simulated readings as JSONL
//!
//! Options:
//!   --symbol=<SYM>         symbol the observer follows (default: first reading's)
//!   --from=<ms> --to=<ms>  rebuild the trail from this timestamp window after replay
//!   --at=<score>,<mom>     report the trail point nearest to this phase-space position
//!   --radius=<r>           search radius for --at (default 0.25)
//!
//! The summary line carries a SHA-256 fingerprint of the normalized, ordered
//! readings, so two replays of the same input can be compared byte for byte.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use sentimentfx::config::SimConfig;
use sentimentfx::ingress::{normalize_payload, ordered_replay};
use sentimentfx::logging;
use sentimentfx::noise::PerlinNoise;
use sentimentfx::observer::Observer;
use sentimentfx::simulation::{fingerprint, Simulation};
use sentimentfx::SentimentReading;

fn generate(n: usize, seed: u64) -> Result<()> {
    let cfg = SimConfig::from_env();
    let symbol = cfg.runtime.primary_symbol.clone();
    let mut sim = Simulation::with_seed(&symbol, &cfg, seed)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for reading in sim.run(n) {
        writeln!(out, "{}", serde_json::to_string(&reading)?)?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct ReplayOptions {
    symbol: Option<String>,
    from: Option<u64>,
    to: Option<u64>,
    at: Option<(f64, f64)>,
    radius: f64,
}

fn replay(input: Box<dyn BufRead>, opts: ReplayOptions) -> Result<()> {
    let cfg = SimConfig::from_env();
    let mut normalized: Vec<SentimentReading> = Vec::new();
    let (mut bad_json, mut degraded, mut fidelity_loss) = (0u64, 0u64, 0u64);

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let payload: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(err) => {
                eprintln!("bad reading json: {}", err);
                bad_json += 1;
                continue;
            }
        };
        let fallback_ts = normalized.last().map_or(0, |r| r.timestamp);
        let outcome = normalize_payload(&payload, fallback_ts);
        logging::log_ingress_report(&outcome.reading.symbol, outcome.reading.timestamp, &outcome.report);
        if outcome.report.degraded {
            degraded += 1;
        }
        if outcome.report.fidelity_loss {
            fidelity_loss += 1;
        }
        normalized.push(outcome.reading);
    }

    let (readings, dropped) = ordered_replay(normalized);

    let mut observer = match readings.first() {
        Some(first) => {
            let follow = opts.symbol.clone().unwrap_or_else(|| first.symbol.clone());
            let seed = cfg.runtime.seed;
            Some(Observer::new(&follow, &cfg, seed, Arc::new(PerlinNoise::new(seed)))?)
        }
        None => None,
    };
    if let Some(obs) = observer.as_mut() {
        let dt = cfg.runtime.frame_ms as f64 / 1000.0;
        for reading in &readings {
            obs.on_reading(reading);
            obs.on_frame(dt);
        }
        if opts.from.is_some() || opts.to.is_some() {
            let from = opts.from.unwrap_or(0);
            let to = opts.to.unwrap_or(u64::MAX);
            let window: Vec<SentimentReading> = readings
                .iter()
                .filter(|r| r.timestamp >= from && r.timestamp <= to)
                .cloned()
                .collect();
            obs.rebuild_trail(&window);
        }
    }

    let fp = fingerprint(&readings);
    logging::log_audit("replay_fingerprint", &fp, readings.len(), dropped);

    let observer_summary = observer.as_ref().map(|o| {
        let nearest = opts
            .at
            .and_then(|(x, y)| o.nearest_point(x, y, opts.radius))
            .copied();
        json!({
            "symbol": o.symbol(),
            "trail_len": o.trail().len(),
            "trail_span": o.trail().iter().next().map(|p| p.timestamp)
                .zip(o.trail().latest().map(|p| p.timestamp)),
            "nearest": nearest,
            "field": o.diagnostics(),
            "spin": o.spin().metrics(),
            "cascades": o.spin().cascades(),
            "particle_respawns": o.particles().map(|p| p.total_respawns()),
            "particle_sources": o.particles().map(|p| p.source_counts()),
        })
    });
    println!(
        "{}",
        json!({
            "run_id": logging::run_id(),
            "readings": readings.len(),
            "dropped_out_of_order": dropped,
            "bad_json": bad_json,
            "degraded": degraded,
            "fidelity_loss": fidelity_loss,
            "fingerprint": fp,
            "observer": observer_summary,
        })
    );
    logging::flush();
    Ok(())
}

fn parse_at(raw: &str) -> Result<(f64, f64)> {
    let (x, y) = raw
        .split_once(',')
        .with_context(|| format!("--at expects <score>,<momentum>, got {}", raw))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

fn main() -> Result<()> {
    let mut opts = ReplayOptions {
        radius: 0.25,
        ..ReplayOptions::default()
    };
    let mut positional: Vec<String> = Vec::new();
    for arg in std::env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("--symbol=") {
            opts.symbol = Some(v.trim().to_uppercase());
        } else if let Some(v) = arg.strip_prefix("--from=") {
            opts.from = Some(v.parse().context("--from expects epoch ms")?);
        } else if let Some(v) = arg.strip_prefix("--to=") {
            opts.to = Some(v.parse().context("--to expects epoch ms")?);
        } else if let Some(v) = arg.strip_prefix("--at=") {
            opts.at = Some(parse_at(v)?);
        } else if let Some(v) = arg.strip_prefix("--radius=") {
            opts.radius = v.parse().context("--radius expects a number")?;
        } else {
            positional.push(arg);
        }
    }

    match positional.as_slice() {
        [flag, n, rest @ ..] if flag.as_str() == "--generate" => {
            let n: usize = n.parse().context("--generate expects a count")?;
            let seed = match rest.first() {
                Some(s) => s.parse().context("seed must be an integer")?,
                None => SimConfig::from_env().runtime.seed,
            };
            generate(n, seed)
        }
        [flag] if flag.as_str() == "--generate" => bail!("usage: replay --generate <n> [seed]"),
        [path] => {
            let file = File::open(path).with_context(|| format!("open {}", path))?;
            replay(Box::new(BufReader::new(file)), opts)
        }
        [] => replay(Box::new(BufReader::new(io::stdin())), opts),
        _ => bail!("usage: replay [file.jsonl] [--symbol=SYM] [--from=ms] [--to=ms] [--at=x,y] | replay --generate <n> [seed]"),
    }
}
