use std::collections::BTreeSet;

/// Compact set of enabled numeric event ids.
///
/// Backed by a flat bitmap indexed by event id. Ids handed out by the
/// catalog are small and dense, so membership and enable/disable are O(1)
/// and enumerating the set is a linear scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    enabled: Vec<bool>,
}

impl EventFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an event id as enabled.
    pub fn add_enabled_event(&mut self, id: usize) {
        if id >= self.enabled.len() {
            self.enabled.resize(id + 1, false);
        }
        self.enabled[id] = true;
    }

    /// Mark an event id as disabled. Unknown ids are ignored.
    pub fn disable_event(&mut self, id: usize) {
        if let Some(slot) = self.enabled.get_mut(id) {
            *slot = false;
        }
    }

    /// Returns true if the id is enabled in this filter.
    pub fn is_event_enabled(&self, id: usize) -> bool {
        self.enabled.get(id).copied().unwrap_or(false)
    }

    /// All enabled ids in ascending order.
    pub fn enabled_events(&self) -> BTreeSet<usize> {
        self.enabled
            .iter()
            .enumerate()
            .filter_map(|(id, on)| on.then_some(id))
            .collect()
    }

    /// Union every id enabled in `other` into this filter.
    pub fn enable_events_from(&mut self, other: &EventFilter) {
        if other.enabled.len() > self.enabled.len() {
            self.enabled.resize(other.enabled.len(), false);
        }
        for (slot, on) in self.enabled.iter_mut().zip(&other.enabled) {
            *slot |= *on;
        }
    }

    /// Number of enabled ids.
    pub fn len(&self) -> usize {
        self.enabled.iter().filter(|on| **on).count()
    }

    /// Returns true if no id is enabled.
    pub fn is_empty(&self) -> bool {
        !self.enabled.iter().any(|on| *on)
    }
}

impl FromIterator<usize> for EventFilter {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut filter = Self::new();
        for id in iter {
            filter.add_enabled_event(id);
        }
        filter
    }
}
