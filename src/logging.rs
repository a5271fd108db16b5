//! Structured JSON logging for the dashboard core.
//!
//! One line per event on stdout: timestamp, sequence number, level,
//! domain, free-form fields. `LOG_LEVEL` sets the minimum level,
//! `LOG_DOMAINS` is a comma-separated allow list (or "all").

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("debug") => Level::Debug,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

/// Log domains, one per subsystem, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Stream,    // envelope decode, drops, heartbeats
    State,     // store mutations, log rotation
    Aggregate, // derivation passes
    Export,    // snapshot capture, render phases, artifacts
    Layout,    // widget persistence
    System,    // startup, shutdown, config
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Stream => "stream",
            Domain::State => "state",
            Domain::Aggregate => "aggregate",
            Domain::Export => "export",
            Domain::Layout => "layout",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

/// RFC3339 timestamp with milliseconds.
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds.
pub fn ts_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Emit a structured log entry.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }

    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str()));
    entry.insert("domain".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("data".to_string(), Value::Object(fields));
    println!("{}", Value::Object(entry));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn obj_builds_field_map() {
        let map = obj(&[("a", v_str("x")), ("b", v_num(1.5))]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"], json!("x"));
        assert_eq!(map["b"], json!(1.5));
    }
}
