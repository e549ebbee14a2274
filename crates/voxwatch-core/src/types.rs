//! Shared type definitions used across voxwatch crates.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Stable identifier of a monitored component or subsystem.
pub type EntityId = String;

/// Health severity, ordered by urgency (lower ordinal = more severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusLevel {
    Critical = 0,
    Offline = 1,
    Degraded = 2,
    Warning = 3,
    Operational = 4,
    /// Unrecognized status token; never alerted
    Unknown = 5,
}

impl StatusLevel {
    /// All levels, most severe first.
    pub const ALL: [StatusLevel; 6] = [
        Self::Critical,
        Self::Offline,
        Self::Degraded,
        Self::Warning,
        Self::Operational,
        Self::Unknown,
    ];

    /// Queue priority; lower is spoken first.
    pub fn priority(&self) -> u8 {
        *self as u8
    }

    /// True if `self` is strictly more severe than `other`.
    pub fn is_more_severe_than(&self, other: StatusLevel) -> bool {
        self.priority() < other.priority()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::Offline => "Offline",
            Self::Degraded => "Degraded",
            Self::Warning => "Warning",
            Self::Operational => "Operational",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a decoded health event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthEventKind {
    /// Component-level health (`color`/`size` without `subsystem`)
    Component,
    /// Record carrying a `subsystem` field
    Subsystem,
    /// One entry of a `subsystem_health` map, with a synthetic color
    BulkSubsystem,
    /// Opaque telemetry blob
    Telemetry,
}

/// A typed health update decoded from one wire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthEvent {
    /// `component_id` of the record
    pub entity_id: EntityId,
    pub kind: HealthEventKind,
    /// Color-like status token (`#RRGGBB` or a color name)
    pub status_token: String,
    /// Health percent, nominally 0-100
    pub health_percent: f64,
    /// Set for subsystem events
    pub subsystem_name: Option<String>,
    /// Set for bulk subsystem events: the full map the entry came from
    pub subsystem_map: Option<BTreeMap<String, f64>>,
    /// Set for telemetry events
    pub telemetry: Option<serde_json::Value>,
}

impl HealthEvent {
    /// Component-level event.
    pub fn component(entity_id: impl Into<String>, token: impl Into<String>, health: f64) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind: HealthEventKind::Component,
            status_token: token.into(),
            health_percent: health,
            subsystem_name: None,
            subsystem_map: None,
            telemetry: None,
        }
    }

    /// Subsystem event from a record with a `subsystem` field.
    pub fn subsystem(
        entity_id: impl Into<String>,
        subsystem: impl Into<String>,
        token: impl Into<String>,
        health: f64,
    ) -> Self {
        Self {
            kind: HealthEventKind::Subsystem,
            subsystem_name: Some(subsystem.into()),
            ..Self::component(entity_id, token, health)
        }
    }

    /// Opaque telemetry event.
    pub fn telemetry(entity_id: impl Into<String>, blob: serde_json::Value) -> Self {
        Self {
            kind: HealthEventKind::Telemetry,
            telemetry: Some(blob),
            ..Self::component(entity_id, "", 0.0)
        }
    }

    /// Whether this event carries a status that can be alerted on.
    pub fn is_health_update(&self) -> bool {
        self.kind != HealthEventKind::Telemetry
    }

    /// Key used for cooldown and queue deduplication.
    ///
    /// Subsystems are keyed `component/subsystem` so that they cool down
    /// independently of their parent component.
    pub fn alert_key(&self) -> String {
        match &self.subsystem_name {
            Some(name) => format!("{}/{}", self.entity_id, name),
            None => self.entity_id.clone(),
        }
    }

    /// Default spoken name when no configured name exists.
    pub fn display_name(&self) -> &str {
        self.subsystem_name.as_deref().unwrap_or(&self.entity_id)
    }
}

/// A pending alert. At most one exists per entity in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEntry {
    pub entity_id: EntityId,
    pub entity_name: String,
    pub status: StatusLevel,
    pub health_percent: f64,
    /// Copied from `status.priority()`; lower is spoken first
    pub priority: u8,
}

impl AlertEntry {
    pub fn new(
        entity_id: impl Into<String>,
        entity_name: impl Into<String>,
        status: StatusLevel,
        health_percent: f64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_name: entity_name.into(),
            status,
            health_percent,
            priority: status.priority(),
        }
    }

    /// The sentence spoken for this alert.
    pub fn utterance(&self) -> String {
        format!(
            "{}, System Status {}, {} percent",
            self.entity_name,
            self.status,
            self.health_percent.round() as i64
        )
    }
}

/// Last alert actually raised for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownRecord {
    pub entity_id: EntityId,
    pub last_alert_at: Instant,
    pub last_status: StatusLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(StatusLevel::Critical < StatusLevel::Offline);
        assert!(StatusLevel::Offline < StatusLevel::Degraded);
        assert!(StatusLevel::Degraded < StatusLevel::Warning);
        assert!(StatusLevel::Warning < StatusLevel::Operational);
        assert!(StatusLevel::Operational < StatusLevel::Unknown);
        assert_eq!(StatusLevel::Unknown.priority(), 5);
        assert!(StatusLevel::Critical.is_more_severe_than(StatusLevel::Degraded));
        assert!(!StatusLevel::Critical.is_more_severe_than(StatusLevel::Critical));
    }

    #[test]
    fn test_alert_key() {
        let component = HealthEvent::component("antenna_1", "#00FF00", 95.0);
        assert_eq!(component.alert_key(), "antenna_1");
        assert_eq!(component.display_name(), "antenna_1");

        let sub = HealthEvent::subsystem("antenna_1", "Transmitter", "#FF0000", 10.0);
        assert_eq!(sub.alert_key(), "antenna_1/Transmitter");
        assert_eq!(sub.display_name(), "Transmitter");
    }

    #[test]
    fn test_utterance_rounds_health() {
        let entry = AlertEntry::new("a1", "Antenna", StatusLevel::Critical, 44.6);
        assert_eq!(entry.utterance(), "Antenna, System Status Critical, 45 percent");
        assert_eq!(entry.priority, 0);

        let entry = AlertEntry::new("a1", "Antenna", StatusLevel::Degraded, 12.5);
        assert_eq!(entry.utterance(), "Antenna, System Status Degraded, 13 percent");
    }

    #[test]
    fn test_telemetry_event_is_not_health_update() {
        let event = HealthEvent::telemetry("antenna_1", serde_json::json!({"unit": "APCU"}));
        assert!(!event.is_health_update());
        assert!(HealthEvent::component("x", "red", 1.0).is_health_update());
    }
}
