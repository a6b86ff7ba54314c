//! Telemetry events and sinks.
//!
//! Emission is fire-and-forget: a sink that fails logs a warning and the
//! caller carries on.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::consts::TELEMETRY_FILENAME;
use crate::platform::paths::data_dir;

/// A named event with arbitrary JSON properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
  pub name: String,
  pub properties: Map<String, Value>,
}

impl TelemetryEvent {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      properties: Map::new(),
    }
  }

  /// Attach a property. Values that fail to serialize are recorded as null.
  pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
    let value = serde_json::to_value(value).unwrap_or(Value::Null);
    self.properties.insert(key.to_string(), value);
    self
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.properties.get(key)
  }
}

/// `cmd_success` event for a finished command.
pub fn command_success(command: &str) -> TelemetryEvent {
  TelemetryEvent::new("cmd_success").with("command", command)
}

/// `cmd_fail` event carrying a short failure reason.
pub fn command_failure(command: &str, reason: &str) -> TelemetryEvent {
  TelemetryEvent::new("cmd_fail")
    .with("command", command)
    .with("reason", reason)
}

pub trait TelemetrySink: Send + Sync {
  fn emit(&self, event: &TelemetryEvent);
}

/// Drops every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
  fn emit(&self, _event: &TelemetryEvent) {}
}

/// Writes events to the debug log.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
  fn emit(&self, event: &TelemetryEvent) {
    let properties = serde_json::Value::Object(event.properties.clone());
    debug!(event = %event.name, properties = %properties, "telemetry");
  }
}

/// Forwards every event to each sink in turn.
impl TelemetrySink for Vec<Box<dyn TelemetrySink>> {
  fn emit(&self, event: &TelemetryEvent) {
    for sink in self {
      sink.emit(event);
    }
  }
}

/// Keeps events in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
  events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<TelemetryEvent> {
    self.events.lock().map(|e| e.clone()).unwrap_or_default()
  }

  /// Events with the given name.
  pub fn named(&self, name: &str) -> Vec<TelemetryEvent> {
    self.events().into_iter().filter(|e| e.name == name).collect()
  }
}

impl TelemetrySink for MemorySink {
  fn emit(&self, event: &TelemetryEvent) {
    if let Ok(mut events) = self.events.lock() {
      events.push(event.clone());
    }
  }
}

/// Appends one JSON object per event to a file.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
  path: PathBuf,
}

#[derive(Serialize)]
struct Record<'a> {
  event: &'a str,
  timestamp_unix: u64,
  #[serde(flatten)]
  properties: &'a Map<String, Value>,
}

impl JsonLinesSink {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Sink writing to `<data_dir>/telemetry.jsonl`.
  pub fn default_location() -> Self {
    Self::new(data_dir().join(TELEMETRY_FILENAME))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn append(&self, event: &TelemetryEvent) -> io::Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let record = Record {
      event: &event.name,
      timestamp_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0),
      properties: &event.properties,
    };
    let line = serde_json::to_string(&record).map_err(io::Error::other)?;

    let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    writeln!(file, "{}", line)
  }
}

impl TelemetrySink for JsonLinesSink {
  fn emit(&self, event: &TelemetryEvent) {
    if let Err(e) = self.append(event) {
      warn!(path = %self.path.display(), event = %event.name, error = %e, "failed to record telemetry");
    }
  }
}

/// The sink selected by configuration.
pub fn sink_from_config(config: &Config) -> Box<dyn TelemetrySink> {
  if config.telemetry {
    let sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(JsonLinesSink::default_location()), Box::new(LogSink)];
    Box::new(sinks)
  } else {
    Box::new(NullSink)
  }
}
