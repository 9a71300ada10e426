pub mod categories;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use self::categories::{CategoryEvent, ATRACE_MARKER_EVENT};
use crate::catalog::{is_valid_component, EventCatalog, GroupAndName};
use crate::ftrace::FtraceSurface;
use crate::request::FtraceConfig;

/// Vendor-supplied extra events per category, merged into the built-in table.
pub type VendorEvents = BTreeMap<String, Vec<GroupAndName>>;

/// Split a raw event spec into its group (possibly empty) and name.
fn split_event_spec(spec: &str) -> (&str, &str) {
    match spec.split_once('/') {
        Some((group, name)) => (group, name),
        None => ("", spec),
    }
}

fn add_event_group<C>(catalog: &C, group: &str, to: &mut BTreeSet<GroupAndName>)
where
    C: EventCatalog + ?Sized,
{
    if let Some(events) = catalog.events_by_group(group) {
        to.extend(events.into_iter().map(|e| GroupAndName::new(group, e.name.as_str())));
    }
}

/// Resolve a request into the deduplicated set of kernel events it needs.
///
/// Unknown bare event names and unknown categories are skipped. `group/*`
/// is expanded from the events the kernel exposes right now, since the set
/// of groups differs between devices. Explicit `group/name` specs are kept
/// as-is even if the catalog has never seen them.
pub fn resolve_events<C, F>(
    request: &FtraceConfig,
    catalog: &C,
    ftrace: &F,
    vendor_events: &VendorEvents,
) -> BTreeSet<GroupAndName>
where
    C: EventCatalog + ?Sized,
    F: FtraceSurface + ?Sized,
{
    let mut events = BTreeSet::new();

    for spec in &request.ftrace_events {
        let (group, name) = split_event_spec(spec);

        if name == "*" {
            if !is_valid_component(group) {
                debug!(spec = %spec, "wildcard without a usable group, skipping");
                continue;
            }
            events.extend(
                ftrace
                    .event_names_for_group(group)
                    .into_iter()
                    .map(|name| GroupAndName::new(group, name)),
            );
        } else if group.is_empty() {
            match catalog.event_by_name(name) {
                Some(event) => {
                    events.insert(GroupAndName::new(event.group.as_str(), event.name.as_str()));
                }
                None => {
                    debug!(
                        event = %name,
                        "unknown event, include the group to record it as a generic event"
                    );
                }
            }
        } else {
            let event = GroupAndName::new(group, name);
            if !event.is_valid() {
                debug!(spec = %spec, "malformed event, skipping");
                continue;
            }
            events.insert(event);
        }
    }

    if request.requires_atrace() {
        let (group, name) = ATRACE_MARKER_EVENT;
        events.insert(GroupAndName::new(group, name));

        for category in &request.atrace_categories {
            let Some(category) = categories::lookup(category) else {
                continue;
            };
            for entry in category.events {
                match *entry {
                    CategoryEvent::Group(group) => add_event_group(catalog, group, &mut events),
                    CategoryEvent::Event(group, name) => {
                        events.insert(GroupAndName::new(group, name));
                    }
                }
            }
        }
    }

    for category in &request.atrace_categories {
        if let Some(extra) = vendor_events.get(category) {
            events.extend(extra.iter().cloned());
        }
    }

    events
}
