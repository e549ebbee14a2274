//! Alert admission policy: per-level toggles and per-entity cooldown.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use voxwatch_core::{AlertConfig, CooldownRecord, LevelToggles, StatusLevel};

/// Result of evaluating one health update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Enqueue an alert. The cooldown record was updated.
    Admit,
    /// The status level is not alertable.
    LevelDisabled,
    /// Same or lower severity inside the cooldown window.
    CoolingDown { remaining: Duration },
}

/// Decides which health updates become alerts.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    cooldown: Duration,
    levels: LevelToggles,
    records: HashMap<String, CooldownRecord>,
}

impl AlertPolicy {
    pub fn new(cooldown: Duration, levels: LevelToggles) -> Self {
        Self {
            cooldown,
            levels,
            records: HashMap::new(),
        }
    }

    pub fn from_config(config: &AlertConfig) -> Self {
        Self::new(config.cooldown(), config.levels)
    }

    /// Whether `status` is enabled for alerting. Operational and Unknown never are.
    pub fn should_alert(&self, status: StatusLevel) -> bool {
        self.levels.is_enabled(status)
    }

    /// Apply the cooldown rule and record the alert if admitted.
    ///
    /// An entity seen for the first time is always admitted. After that, an
    /// alert is admitted once the window has elapsed, or immediately if the
    /// new status is strictly more severe than the last alerted one.
    pub fn admit(&mut self, entity_id: &str, status: StatusLevel, now: Instant) -> bool {
        self.check_cooldown(entity_id, status, now).is_none()
    }

    /// Level gate followed by the cooldown rule.
    pub fn evaluate(&mut self, entity_id: &str, status: StatusLevel, now: Instant) -> PolicyDecision {
        if !self.should_alert(status) {
            return PolicyDecision::LevelDisabled;
        }
        match self.check_cooldown(entity_id, status, now) {
            None => PolicyDecision::Admit,
            Some(remaining) => PolicyDecision::CoolingDown { remaining },
        }
    }

    /// Returns the remaining cooldown if suppressed, otherwise records the alert.
    fn check_cooldown(&mut self, entity_id: &str, status: StatusLevel, now: Instant) -> Option<Duration> {
        if let Some(record) = self.records.get_mut(entity_id) {
            let elapsed = now.saturating_duration_since(record.last_alert_at);
            let escalated = status.is_more_severe_than(record.last_status);
            if !escalated && elapsed < self.cooldown {
                return Some(self.cooldown - elapsed);
            }
            record.last_alert_at = now;
            record.last_status = status;
            return None;
        }

        self.records.insert(
            entity_id.to_string(),
            CooldownRecord {
                entity_id: entity_id.to_string(),
                last_alert_at: now,
                last_status: status,
            },
        );
        None
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    pub fn levels(&self) -> &LevelToggles {
        &self.levels
    }

    /// Enable or disable one level. Returns false for levels that cannot be toggled.
    pub fn set_level(&mut self, status: StatusLevel, enabled: bool) -> bool {
        self.levels.set(status, enabled)
    }

    pub fn record(&self, entity_id: &str) -> Option<&CooldownRecord> {
        self.records.get(entity_id)
    }

    /// Number of entities with a cooldown record.
    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    /// Drop every cooldown record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
