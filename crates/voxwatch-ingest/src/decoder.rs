//! Health record decoding.
//!
//! A raw record is one JSON object:
//!
//! ```json
//! { "component_id": "antenna_1", "color": "#FF0000", "size": 42.0,
//!   "subsystem": "Transmitter",
//!   "subsystem_health": { "RX": 30.0 },
//!   "apcu_telemetry": { ... } }
//! ```
//!
//! Only `component_id` is required. Malformed records are dropped and
//! counted in [`DecodeStats`]; they never surface as errors to the caller.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, trace};
use voxwatch_core::types::{HealthEvent, HealthEventKind};

/// Key of the opaque telemetry blob.
pub const TELEMETRY_FIELD: &str = "apcu_telemetry";

/// Reasons a record yields no events.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has no component_id")]
    MissingComponentId,
}

/// Running decode counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Records seen
    pub records: u64,
    /// Events emitted
    pub events: u64,
    /// Records that were not a JSON object
    pub malformed: u64,
    /// Objects without a usable `component_id`
    pub missing_id: u64,
}

impl DecodeStats {
    /// Total records dropped.
    pub fn errors(&self) -> u64 {
        self.malformed + self.missing_id
    }
}

/// Decodes raw records into [`HealthEvent`]s and keeps error counts.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    stats: DecodeStats,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one record. Bad input yields an empty vector.
    pub fn decode(&mut self, record: &[u8]) -> Vec<HealthEvent> {
        self.stats.records += 1;
        match parse_record(record) {
            Ok(events) => {
                self.stats.events += events.len() as u64;
                events
            }
            Err(DecodeError::MissingComponentId) => {
                self.stats.missing_id += 1;
                debug!("dropping record without component_id");
                Vec::new()
            }
            Err(e) => {
                self.stats.malformed += 1;
                debug!(error = %e, "dropping malformed record");
                Vec::new()
            }
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }
}

/// Parse one record into events.
///
/// A record with a `subsystem` field yields exactly that one subsystem event.
/// Otherwise a component event, one event per `subsystem_health` entry and a
/// telemetry event may all be emitted from the same record.
pub fn parse_record(record: &[u8]) -> Result<Vec<HealthEvent>, DecodeError> {
    let value: Value = serde_json::from_slice(record)?;
    let Value::Object(obj) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let entity_id = match obj.get("component_id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(DecodeError::MissingComponentId),
    };
    let color = obj.get("color").and_then(Value::as_str).unwrap_or_default();
    let size = obj.get("size").and_then(Value::as_f64).unwrap_or(0.0);

    if let Some(subsystem) = obj
        .get("subsystem")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
    {
        trace!(entity_id = %entity_id, subsystem, "subsystem record");
        return Ok(vec![HealthEvent::subsystem(entity_id, subsystem, color, size)]);
    }

    let mut events = Vec::new();

    if !color.is_empty() && size >= 0.0 {
        events.push(HealthEvent::component(&entity_id, color, size));
    }

    if let Some(map) = obj.get("subsystem_health").and_then(Value::as_object) {
        events.extend(bulk_subsystem_events(&entity_id, map));
    }

    if let Some(blob) = obj.get(TELEMETRY_FIELD).filter(|v| !v.is_null()) {
        events.push(HealthEvent::telemetry(&entity_id, blob.clone()));
    }

    Ok(events)
}

fn bulk_subsystem_events(entity_id: &str, map: &Map<String, Value>) -> Vec<HealthEvent> {
    let health: BTreeMap<String, f64> = map
        .iter()
        .filter_map(|(name, v)| v.as_f64().map(|h| (name.clone(), h)))
        .collect();

    health
        .iter()
        .map(|(name, percent)| HealthEvent {
            kind: HealthEventKind::BulkSubsystem,
            subsystem_map: Some(health.clone()),
            ..HealthEvent::subsystem(entity_id, name, band_color(*percent), *percent)
        })
        .collect()
}

/// Synthetic status color for a bare health percent.
pub fn band_color(percent: f64) -> &'static str {
    if percent >= 90.0 {
        "#00FF00"
    } else if percent >= 70.0 {
        "#FFFF00"
    } else if percent >= 40.0 {
        "#FFA500"
    } else if percent >= 10.0 {
        "#FF0000"
    } else {
        "#808080"
    }
}
