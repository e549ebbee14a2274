//! Pending alerts, one per entity, most severe first.

use std::collections::VecDeque;

use voxwatch_core::AlertEntry;

/// Priority-ordered alert queue.
///
/// Entries are ordered by ascending priority. Entries of equal priority keep
/// arrival order.
#[derive(Debug, Clone, Default)]
pub struct AlertQueue {
    entries: VecDeque<AlertEntry>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `entry`, replacing any pending entry for the same entity.
    pub fn insert(&mut self, entry: AlertEntry) {
        let mut index = self
            .entries
            .iter()
            .position(|e| e.priority > entry.priority)
            .unwrap_or(self.entries.len());

        if let Some(stale) = self.entries.iter().position(|e| e.entity_id == entry.entity_id) {
            self.entries.remove(stale);
            if stale < index {
                index -= 1;
            }
        }

        self.entries.insert(index, entry);
    }

    /// Remove and return the most urgent entry.
    pub fn pop_highest_priority(&mut self) -> Option<AlertEntry> {
        self.entries.pop_front()
    }

    pub fn peek(&self) -> Option<&AlertEntry> {
        self.entries.front()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entries.iter().any(|e| e.entity_id == entity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxwatch_core::StatusLevel;

    fn entry(id: &str, status: StatusLevel) -> AlertEntry {
        AlertEntry::new(id, id, status, 50.0)
    }

    fn ids(queue: &AlertQueue) -> Vec<&str> {
        queue.iter().map(|e| e.entity_id.as_str()).collect()
    }

    #[test]
    fn test_equal_priority_keeps_arrival_order() {
        let mut queue = AlertQueue::new();
        queue.insert(entry("B", StatusLevel::Critical));
        queue.insert(entry("A", StatusLevel::Critical));

        assert_eq!(queue.pop_highest_priority().unwrap().entity_id, "B");
        assert_eq!(queue.pop_highest_priority().unwrap().entity_id, "A");
        assert!(queue.pop_highest_priority().is_none());
    }

    #[test]
    fn test_orders_by_severity() {
        let mut queue = AlertQueue::new();
        queue.insert(entry("deg", StatusLevel::Degraded));
        queue.insert(entry("off", StatusLevel::Offline));
        queue.insert(entry("crit", StatusLevel::Critical));
        queue.insert(entry("warn", StatusLevel::Warning));

        assert_eq!(ids(&queue), ["crit", "off", "deg", "warn"]);
    }

    #[test]
    fn test_reinsert_replaces_stale_entry() {
        let mut queue = AlertQueue::new();
        queue.insert(entry("A", StatusLevel::Degraded));
        queue.insert(entry("B", StatusLevel::Degraded));
        queue.insert(entry("A", StatusLevel::Critical));

        assert_eq!(queue.len(), 2);
        assert_eq!(ids(&queue), ["A", "B"]);
        assert_eq!(queue.peek().unwrap().status, StatusLevel::Critical);
    }

    #[test]
    fn test_reinsert_same_priority_moves_to_back() {
        let mut queue = AlertQueue::new();
        queue.insert(entry("A", StatusLevel::Critical));
        queue.insert(entry("B", StatusLevel::Critical));
        queue.insert(entry("C", StatusLevel::Degraded));
        queue.insert(entry("A", StatusLevel::Critical));

        assert_eq!(ids(&queue), ["B", "A", "C"]);
    }

    #[test]
    fn test_never_more_than_one_entry_per_entity() {
        let mut queue = AlertQueue::new();
        let statuses = [
            StatusLevel::Warning,
            StatusLevel::Critical,
            StatusLevel::Offline,
            StatusLevel::Degraded,
            StatusLevel::Critical,
        ];
        for (i, status) in statuses.into_iter().enumerate() {
            queue.insert(entry("A", status));
            queue.insert(entry(if i % 2 == 0 { "B" } else { "C" }, status));
            assert_eq!(queue.iter().filter(|e| e.entity_id == "A").count(), 1);
        }
        assert_eq!(queue.len(), 3);
        assert!(queue.contains("B"));
        assert!(queue.contains("C"));
    }

    #[test]
    fn test_clear() {
        let mut queue = AlertQueue::new();
        queue.insert(entry("A", StatusLevel::Critical));
        queue.clear();
        assert!(queue.is_empty());
    }
}
