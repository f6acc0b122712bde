//! Structured logging for the sentiment simulation.
//!
//! Every record is one JSON line with a run id, a global sequence number, a
//! level and a domain. Records go to stdout and, when `LOG_DIR` is set, to
//! per-run `events.jsonl` / `trace.jsonl` / `metrics.jsonl` files.
//!
//! Environment:
//! - `LOG_LEVEL`   trace | debug | info | warn | error | fatal (default info)
//! - `LOG_DOMAINS` comma-separated domain list or `all`
//! - `LOG_DIR`     base directory for file sinks
//! - `LOG_STDOUT`  `0` silences stdout
//! - `RUN_ID`      overrides the generated run id

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use crate::alerts::{Alert, AlertLevel};
use crate::error::ConfigError;
use crate::ingress::IngressReport;
use crate::types::{AssetCorrelation, NarrativeEvent, Regime, SentimentReading};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Regime,      // Regime chain transitions
    Sentiment,   // Per-tick readings
    Narrative,   // Narrative events
    Field,       // Vector field and particles
    Spin,        // Spin network, cascades
    Correlation, // Cross-asset refresh
    Ingress,     // External payload repairs
    Alert,       // Alert rules
    System,      // Startup, shutdown, config
    Profile,     // Timing
    Audit,       // Replay fingerprints
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Regime => "regime",
            Domain::Sentiment => "sentiment",
            Domain::Narrative => "narrative",
            Domain::Field => "field",
            Domain::Spin => "spin",
            Domain::Correlation => "correlation",
            Domain::Ingress => "ingress",
            Domain::Alert => "alert",
            Domain::System => "system",
            Domain::Profile => "profile",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context and sinks
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct Sinks {
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
    metrics: Mutex<BufWriter<File>>,
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    stdout: bool,
    sinks: Option<Sinks>,
}

fn open_sinks(run_id: &str) -> Option<Sinks> {
    let base = std::env::var("LOG_DIR").ok()?;
    let mut run_dir = PathBuf::from(base);
    run_dir.push(run_id);
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir: {}", err);
        return None;
    }
    let _ = std::fs::write(
        run_dir.join("manifest.json"),
        json!({
            "run_id": run_id,
            "ts": ts_now(),
            "pid": process::id(),
            "log_dir": run_dir.to_string_lossy(),
        })
        .to_string(),
    );
    let open = |name: &str| match File::create(run_dir.join(name)) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", name, err);
            None
        }
    };
    Some(Sinks {
        events: open("events.jsonl")?,
        trace: open("trace.jsonl")?,
        metrics: open("metrics.jsonl")?,
    })
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let stdout = !matches!(std::env::var("LOG_STDOUT").as_deref(), Ok("0"));
        let sinks = open_sinks(&run_id);
        RunContext {
            run_id,
            stdout,
            sinks,
        }
    })
}

pub fn run_id() -> &'static str {
    &ensure_run_context().run_id
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["symbol", "tick", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
    }
}

/// Flush file sinks. Call on shutdown.
pub fn flush() {
    if let Some(sinks) = &ensure_run_context().sinks {
        for w in [&sinks.events, &sinks.trace, &sinks.metrics] {
            if let Ok(mut w) = w.lock() {
                let _ = w.flush();
            }
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds (wall clock)
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    if let Some(sinks) = &ctx.sinks {
        if event.starts_with("metrics.") || component == Domain::Profile.as_str() {
            write_line(&sinks.metrics, &line);
        }
        match level {
            Level::Trace | Level::Debug => write_line(&sinks.trace, &line),
            _ => write_line(&sinks.events, &line),
        }
    }
    if ctx.stdout {
        println!("{}", line);
    }
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_run_start(seed: u64, symbols: &[String], config_hash: &str) {
    log(
        Level::Info,
        Domain::System,
        "run_start",
        obj(&[
            ("seed", json!(seed)),
            ("symbols", Value::Array(symbols.iter().map(|s| v_str(s)).collect())),
            ("config_hash", v_str(config_hash)),
        ]),
    );
}

pub fn log_config_error(component: &str, err: &ConfigError) {
    log(
        Level::Error,
        Domain::System,
        "config_error",
        obj(&[
            ("component", v_str(component)),
            ("msg", v_str(&err.to_string())),
        ]),
    );
}

pub fn log_reading(reading: &SentimentReading, tick: u64) {
    log(
        Level::Trace,
        Domain::Sentiment,
        "reading",
        obj(&[
            ("symbol", v_str(&reading.symbol)),
            ("tick", json!(tick)),
            ("score", v_num(reading.score)),
            ("momentum", v_num(reading.momentum)),
            ("confidence", v_num(reading.confidence)),
            ("regime", v_str(reading.regime.as_str())),
            ("dominant", v_str(reading.attribution.dominant().as_str())),
        ]),
    );
}

pub fn log_regime_shift(symbol: &str, tick: u64, from: Regime, to: Regime, probability: f64, dwell: u32) {
    log(
        Level::Info,
        Domain::Regime,
        "regime_shift",
        obj(&[
            ("symbol", v_str(symbol)),
            ("tick", json!(tick)),
            ("from", v_str(from.as_str())),
            ("to", v_str(to.as_str())),
            ("probability", v_num(probability)),
            ("dwell", json!(dwell)),
        ]),
    );
    agg_increment("regime_shift");
}

pub fn log_narrative(symbol: &str, event: &NarrativeEvent) {
    log(
        Level::Debug,
        Domain::Narrative,
        "narrative",
        obj(&[
            ("symbol", v_str(symbol)),
            ("id", v_str(&event.id)),
            ("source", v_str(event.source.as_str())),
            ("impact", v_num(event.impact)),
            ("tone", v_str(event.detected_tone.as_str())),
            ("highlights", json!(event.shap_highlights.len())),
        ]),
    );
    agg_increment("narrative");
}

pub fn log_cascade(symbol: &str, tick: u64, direction: i8, total: u64) {
    log(
        Level::Warn,
        Domain::Spin,
        "cascade",
        obj(&[
            ("symbol", v_str(symbol)),
            ("tick", json!(tick)),
            ("direction", json!(direction)),
            ("total", json!(total)),
        ]),
    );
    agg_increment("cascade");
}

pub fn log_correlation_refresh(target: &str, pairs: &[AssetCorrelation], elapsed_ms: f64) {
    let divergent: Vec<Value> = pairs
        .iter()
        .filter(|p| p.divergence)
        .map(|p| json!({"symbol": p.symbol, "correlation": p.correlation, "reason": p.divergence_reason}))
        .collect();
    log(
        Level::Info,
        Domain::Correlation,
        "metrics.correlation_refresh",
        obj(&[
            ("symbol", v_str(target)),
            ("pairs", json!(pairs.len())),
            ("divergent", Value::Array(divergent)),
            ("elapsed_ms", v_num(elapsed_ms)),
        ]),
    );
}

pub fn log_ingress_report(symbol: &str, timestamp: u64, report: &IngressReport) {
    if report.is_clean() {
        return;
    }
    let level = if report.degraded { Level::Warn } else { Level::Debug };
    log(
        level,
        Domain::Ingress,
        "ingress_repair",
        obj(&[
            ("symbol", v_str(symbol)),
            ("timestamp", json!(timestamp)),
            ("degraded", json!(report.degraded)),
            ("fidelity_loss", json!(report.fidelity_loss)),
            ("issues", json!(report.issues)),
        ]),
    );
    agg_increment("ingress_repair");
}

pub fn log_alert(alert: &Alert) {
    let level = match alert.level {
        AlertLevel::Info => Level::Info,
        AlertLevel::Warning => Level::Warn,
        AlertLevel::Critical => Level::Error,
    };
    log(
        level,
        Domain::Alert,
        "alert",
        obj(&[
            ("symbol", v_str(&alert.symbol)),
            ("trigger", v_str(&alert.trigger)),
            ("msg", v_str(&alert.message)),
            ("timestamp", json!(alert.timestamp)),
        ]),
    );
    agg_increment("alert");
}

pub fn log_audit(event_type: &str, fingerprint: &str, readings: usize, dropped: u64) {
    log(
        Level::Info,
        Domain::Audit,
        event_type,
        obj(&[
            ("fingerprint", v_str(fingerprint)),
            ("readings", json!(readings)),
            ("dropped", json!(dropped)),
        ]),
    );
}

/// Session summary on shutdown
pub fn log_session_summary(duration_secs: u64, ticks: u64, symbols: usize) {
    let (shifts, narratives, cascades, alerts, repairs) = aggregator_totals();
    log(
        Level::Info,
        Domain::System,
        "session_summary",
        obj(&[
            ("duration_secs", json!(duration_secs)),
            ("ticks", json!(ticks)),
            ("symbols", json!(symbols)),
            ("regime_shifts", json!(shifts)),
            ("narratives", json!(narratives)),
            ("cascades", json!(cascades)),
            ("alerts", json!(alerts)),
            ("ingress_repairs", json!(repairs)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

/// SHA-256 of `input`, first 16 hex chars. Stable across builds, so config
/// hashes from different runs can be compared.
pub fn params_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(true)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(self.elapsed_ms()));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Log Aggregator for Periodic Summaries
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<LogAggregator>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<LogAggregator> {
    AGGREGATOR.get_or_init(|| Mutex::new(LogAggregator::new()))
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    regime_shifts: u64,
    narratives: u64,
    cascades: u64,
    alerts: u64,
    ingress_repairs: u64,
}

struct LogAggregator {
    window: Counts,
    total: Counts,
    last_flush: Instant,
    flush_interval_secs: u64,
}

impl LogAggregator {
    fn new() -> Self {
        Self {
            window: Counts::default(),
            total: Counts::default(),
            last_flush: Instant::now(),
            flush_interval_secs: std::env::var("LOG_FLUSH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    fn increment(&mut self, event: &str) {
        for c in [&mut self.window, &mut self.total] {
            match event {
                "regime_shift" => c.regime_shifts += 1,
                "narrative" => c.narratives += 1,
                "cascade" => c.cascades += 1,
                "alert" => c.alerts += 1,
                "ingress_repair" => c.ingress_repairs += 1,
                _ => {}
            }
        }
    }

    fn maybe_flush(&mut self) -> Option<Counts> {
        if self.last_flush.elapsed().as_secs() >= self.flush_interval_secs {
            let result = self.window;
            self.window = Counts::default();
            self.last_flush = Instant::now();
            Some(result)
        } else {
            None
        }
    }
}

fn aggregator_totals() -> (u64, u64, u64, u64, u64) {
    match get_aggregator().lock() {
        Ok(agg) => {
            let t = agg.total;
            (t.regime_shifts, t.narratives, t.cascades, t.alerts, t.ingress_repairs)
        }
        Err(_) => (0, 0, 0, 0, 0),
    }
}

/// Call periodically to emit aggregated stats
pub fn tick_aggregator() {
    if let Ok(mut agg) = get_aggregator().lock() {
        if let Some(c) = agg.maybe_flush() {
            log(
                Level::Info,
                Domain::System,
                "metrics.aggregated",
                obj(&[
                    ("regime_shifts", json!(c.regime_shifts)),
                    ("narratives", json!(c.narratives)),
                    ("cascades", json!(c.cascades)),
                    ("alerts", json!(c.alerts)),
                    ("ingress_repairs", json!(c.ingress_repairs)),
                ]),
            );
        }
    }
}

/// Increment a counter in the aggregator
pub fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.increment(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
