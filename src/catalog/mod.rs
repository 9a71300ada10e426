use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};

/// A kernel trace event addressed by its group and name (e.g. `sched/sched_switch`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupAndName {
    group: String,
    name: String,
}

impl GroupAndName {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether both parts address a single event directory in tracefs.
    pub fn is_valid(&self) -> bool {
        is_valid_component(&self.group) && is_valid_component(&self.name)
    }
}

/// A group or event name must be exactly one tracefs path component.
pub fn is_valid_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains('/')
}

impl fmt::Display for GroupAndName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

impl FromStr for GroupAndName {
    type Err = anyhow::Error;

    /// Parses the `group/name` form used in vendor event tables.
    fn from_str(s: &str) -> Result<Self> {
        let Some((group, name)) = s.split_once('/') else {
            bail!("event {s:?} is not of the form group/name");
        };
        let event = Self::new(group, name);
        if !event.is_valid() {
            bail!("event {s:?} is not of the form group/name");
        }
        Ok(event)
    }
}

/// Immutable descriptor of one known trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: usize,
    pub group: String,
    pub name: String,
}

impl Event {
    pub fn group_and_name(&self) -> GroupAndName {
        GroupAndName::new(self.group.clone(), self.name.clone())
    }
}

/// Layout descriptor for the compact scheduling encoding.
///
/// The compact encoding can only be produced when both scheduler events it
/// folds are known to the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactSchedFormat {
    pub format_valid: bool,
    pub sched_switch_id: Option<usize>,
    pub sched_waking_id: Option<usize>,
}

/// Lookup of trace events by name, group and numeric id.
pub trait EventCatalog {
    /// Find an event by its bare name, regardless of group.
    fn event_by_name(&self, name: &str) -> Option<&Event>;

    /// All known events of a group, or `None` if the group is unknown.
    fn events_by_group(&self, group: &str) -> Option<Vec<&Event>>;

    /// Find an event, registering it as a generic event if it is not yet known.
    fn get_or_create_event(&mut self, event: &GroupAndName) -> Option<&Event>;

    /// Find an event by numeric id.
    fn event_by_id(&self, id: usize) -> Option<&Event>;

    /// Descriptor of the compact scheduling encoding.
    fn compact_sched_format(&self) -> CompactSchedFormat;
}

/// In-memory event catalog.
///
/// Events registered with [`TableCatalog::insert`] keep their given ids.
/// Events created on demand through [`EventCatalog::get_or_create_event`]
/// receive ids past the highest id seen so far.
#[derive(Debug, Clone)]
pub struct TableCatalog {
    by_id: BTreeMap<usize, Event>,
    by_key: HashMap<GroupAndName, usize>,
    by_name: HashMap<String, usize>,
    by_group: BTreeMap<String, Vec<usize>>,
    generic_events: bool,
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TableCatalog {
    /// Create an empty catalog that creates generic events on demand.
    pub fn new() -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_key: HashMap::new(),
            by_name: HashMap::new(),
            by_group: BTreeMap::new(),
            generic_events: true,
        }
    }

    /// Control whether unknown events may be created on demand.
    pub fn with_generic_events(mut self, enabled: bool) -> Self {
        self.generic_events = enabled;
        self
    }

    /// Register an event under a fixed id.
    ///
    /// Fails if the id or the group/name pair is already registered.
    pub fn insert(&mut self, group: &str, name: &str, id: usize) -> Result<()> {
        let key = GroupAndName::new(group, name);
        if !key.is_valid() {
            bail!("event {key:?} is not a single group/name pair");
        }
        if self.by_key.contains_key(&key) {
            bail!("event {key} registered twice");
        }
        if self.by_id.contains_key(&id) {
            bail!("event id {id} registered twice");
        }
        self.register(key, id);
        Ok(())
    }

    /// Number of known events.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn next_id(&self) -> usize {
        self.by_id.keys().next_back().map_or(1, |max| max + 1)
    }

    fn register(&mut self, key: GroupAndName, id: usize) {
        self.by_name.entry(key.name.clone()).or_insert(id);
        self.by_group.entry(key.group.clone()).or_default().push(id);
        self.by_id.insert(
            id,
            Event {
                id,
                group: key.group.clone(),
                name: key.name.clone(),
            },
        );
        self.by_key.insert(key, id);
    }

    fn id_of(&self, group: &str, name: &str) -> Option<usize> {
        self.by_key.get(&GroupAndName::new(group, name)).copied()
    }
}

impl EventCatalog for TableCatalog {
    fn event_by_name(&self, name: &str) -> Option<&Event> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    fn events_by_group(&self, group: &str) -> Option<Vec<&Event>> {
        let ids = self.by_group.get(group)?;
        Some(ids.iter().filter_map(|id| self.by_id.get(id)).collect())
    }

    fn get_or_create_event(&mut self, event: &GroupAndName) -> Option<&Event> {
        let id = match self.by_key.get(event) {
            Some(id) => *id,
            None => {
                if !self.generic_events || !event.is_valid() {
                    return None;
                }
                let id = self.next_id();
                self.register(event.clone(), id);
                id
            }
        };
        self.by_id.get(&id)
    }

    fn event_by_id(&self, id: usize) -> Option<&Event> {
        self.by_id.get(&id)
    }

    fn compact_sched_format(&self) -> CompactSchedFormat {
        let sched_switch_id = self.id_of("sched", "sched_switch");
        let sched_waking_id = self.id_of("sched", "sched_waking");
        CompactSchedFormat {
            format_valid: sched_switch_id.is_some() && sched_waking_id.is_some(),
            sched_switch_id,
            sched_waking_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TableCatalog {
        let mut catalog = TableCatalog::new();
        catalog.insert("sched", "sched_switch", 10).unwrap();
        catalog.insert("sched", "sched_waking", 11).unwrap();
        catalog.insert("power", "cpu_idle", 20).unwrap();
        catalog
    }

    #[test]
    fn test_group_and_name_parse() {
        let gn: GroupAndName = "sched/sched_switch".parse().unwrap();
        assert_eq!(gn.group(), "sched");
        assert_eq!(gn.name(), "sched_switch");
        assert_eq!(gn.to_string(), "sched/sched_switch");

        assert!("sched_switch".parse::<GroupAndName>().is_err());
        assert!("/sched_switch".parse::<GroupAndName>().is_err());
        assert!("sched/".parse::<GroupAndName>().is_err());
        assert!("a/b/c".parse::<GroupAndName>().is_err());
        assert!("sched/.".parse::<GroupAndName>().is_err());
        assert!("../enable".parse::<GroupAndName>().is_err());
    }

    #[test]
    fn test_path_components() {
        assert!(is_valid_component("sched_switch"));
        assert!(is_valid_component("0"));
        assert!(!is_valid_component(""));
        assert!(!is_valid_component("."));
        assert!(!is_valid_component(".."));
        assert!(!is_valid_component("a/b"));
    }

    #[test]
    fn test_get_or_create_refuses_path_tricks() {
        let mut catalog = catalog();
        for (group, name) in [("sched", "."), ("sched", ".."), ("..", "enable"), ("sched", "")] {
            assert!(
                catalog
                    .get_or_create_event(&GroupAndName::new(group, name))
                    .is_none(),
                "{group}/{name}"
            );
        }
        assert_eq!(catalog.len(), 3);
        assert!(catalog.insert("sched", ".", 99).is_err());
    }

    #[test]
    fn test_lookups() {
        let catalog = catalog();

        assert_eq!(catalog.event_by_name("cpu_idle").map(|e| e.id), Some(20));
        assert_eq!(
            catalog.event_by_id(10).map(Event::group_and_name),
            Some(GroupAndName::new("sched", "sched_switch"))
        );
        assert!(catalog.event_by_name("nope").is_none());

        let sched: Vec<usize> = catalog
            .events_by_group("sched")
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(sched, vec![10, 11]);
        assert!(catalog.events_by_group("mdss").is_none());
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut catalog = catalog();
        assert!(catalog.insert("sched", "sched_switch", 99).is_err());
        assert!(catalog.insert("sched", "other", 10).is_err());
    }

    #[test]
    fn test_get_or_create_assigns_fresh_ids() {
        let mut catalog = catalog();

        let existing = catalog
            .get_or_create_event(&GroupAndName::new("power", "cpu_idle"))
            .map(|e| e.id);
        assert_eq!(existing, Some(20));

        let created = catalog
            .get_or_create_event(&GroupAndName::new("vendor", "gpu_work"))
            .map(|e| e.id);
        assert_eq!(created, Some(21));

        let again = catalog
            .get_or_create_event(&GroupAndName::new("vendor", "gpu_work"))
            .map(|e| e.id);
        assert_eq!(again, Some(21));
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_get_or_create_without_generic_events() {
        let mut catalog = catalog().with_generic_events(false);
        assert!(catalog
            .get_or_create_event(&GroupAndName::new("vendor", "gpu_work"))
            .is_none());
        assert!(catalog
            .get_or_create_event(&GroupAndName::new("power", "cpu_idle"))
            .is_some());
    }

    #[test]
    fn test_compact_sched_format() {
        let format = catalog().compact_sched_format();
        assert!(format.format_valid);
        assert_eq!(format.sched_switch_id, Some(10));
        assert_eq!(format.sched_waking_id, Some(11));

        assert!(!TableCatalog::new().compact_sched_format().format_valid);
    }
}
