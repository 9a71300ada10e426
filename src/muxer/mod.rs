//! Multiplexes concurrent tracing sessions onto the single kernel ftrace
//! instance.
//!
//! Each admitted session gets a snapshot of the events it depends on. The
//! kernel-side state is the union of those snapshots: an event is enabled
//! when the first session needs it and disabled once no remaining session
//! does. Buffer size and clock are configured by the first admission and
//! torn down with the last removal. The global `tracing_on` switch follows
//! the set of activated sessions.
//!
//! The muxer is not synchronized. All calls must be serialized by the
//! caller, and any of them may block on tracefs I/O or on the userspace
//! helper subprocess.

pub mod buffer;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::atrace::{self, AtraceRunner};
use crate::catalog::{CompactSchedFormat, EventCatalog};
use crate::filter::EventFilter;
use crate::ftrace::FtraceSurface;
use crate::request::FtraceConfig;
use crate::resolver::{self, VendorEvents};

pub use self::buffer::compute_cpu_buffer_size_in_pages;

/// Session handle. 0 is never handed out and signals a rejected admission.
pub type FtraceConfigId = u64;

/// Trace clocks in preference order.
const CLOCK_PREFERENCE: &[&str] = &["boot", "global", "local"];

/// Events of this group are always on and have no enable switch.
const IMPLICIT_GROUP: &str = "ftrace";

/// Clock the kernel ended up on after setup.
///
/// `boot` is what decoders assume by default, so it is reported as
/// `Unspecified`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FtraceClock {
    #[default]
    Unspecified,
    Global,
    Local,
    Unknown,
}

impl FtraceClock {
    fn from_name(name: &str) -> Self {
        match name {
            "boot" => Self::Unspecified,
            "global" => Self::Global,
            "local" => Self::Local,
            _ => Self::Unknown,
        }
    }
}

/// Per-session switch for the compact scheduling encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactSchedConfig {
    pub enabled: bool,
}

/// Decide whether a session gets the compact scheduling encoding.
pub fn create_compact_sched_config(
    request: &FtraceConfig,
    format: &CompactSchedFormat,
) -> CompactSchedConfig {
    CompactSchedConfig {
        enabled: request.compact_sched.enabled && format.format_valid,
    }
}

/// What the muxer keeps for each admitted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtraceDataSourceConfig {
    /// Events this session asked for that were confirmed enabled.
    pub event_filter: EventFilter,
    pub compact_sched: CompactSchedConfig,
    /// The session's own helper apps, sorted and deduplicated.
    pub atrace_apps: Vec<String>,
    /// The session's own helper categories, sorted and deduplicated.
    pub atrace_categories: Vec<String>,
    pub symbolize_ksyms: bool,
}

/// Reasons an admission or activation is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MuxError {
    #[error("ftrace is already in use by another tracer")]
    TracingInUse,

    #[error("ftrace was disabled by another tracer")]
    TracingDisabledExternally,

    #[error("concurrent atrace sessions are not supported in legacy mode")]
    ConcurrentLegacyAtrace,

    #[error("failed to enable ftrace")]
    EnableTracingFailed,

    #[error("unknown config id {0}")]
    UnknownConfig(FtraceConfigId),
}

/// Kernel and helper state as last applied by the muxer.
#[derive(Debug, Default)]
struct FtraceState {
    cpu_buffer_size_pages: usize,
    ftrace_clock: FtraceClock,
    ftrace_events: EventFilter,
    atrace_apps: Vec<String>,
    atrace_categories: Vec<String>,
    atrace_on: bool,
}

/// Reconciles session requests against the shared ftrace instance.
pub struct FtraceConfigMuxer<F, C, A> {
    ftrace: F,
    catalog: C,
    atrace: A,
    vendor_events: VendorEvents,
    atrace_binary: String,
    legacy_atrace: bool,
    current_state: FtraceState,
    ds_configs: BTreeMap<FtraceConfigId, FtraceDataSourceConfig>,
    active_configs: BTreeSet<FtraceConfigId>,
    last_id: FtraceConfigId,
}

impl<F, C, A> FtraceConfigMuxer<F, C, A>
where
    F: FtraceSurface,
    C: EventCatalog,
    A: AtraceRunner,
{
    pub fn new(ftrace: F, catalog: C, atrace: A, vendor_events: VendorEvents) -> Self {
        Self {
            ftrace,
            catalog,
            atrace,
            vendor_events,
            atrace_binary: "atrace".to_string(),
            legacy_atrace: false,
            current_state: FtraceState::default(),
            ds_configs: BTreeMap::new(),
            active_configs: BTreeSet::new(),
            last_id: 0,
        }
    }

    /// Path or name of the helper binary used as argv[0].
    pub fn with_atrace_binary(mut self, binary: impl Into<String>) -> Self {
        self.atrace_binary = binary.into();
        self
    }

    /// Legacy-compatibility mode: tracing_on is not trusted as a contention
    /// signal, the helper also drives kernel events, and only one helper
    /// session may exist.
    pub fn with_legacy_atrace(mut self, legacy: bool) -> Self {
        self.legacy_atrace = legacy;
        self
    }

    /// Admit a session. Returns its id, or 0 if the request was refused.
    pub fn setup_config(&mut self, request: &FtraceConfig) -> FtraceConfigId {
        match self.try_setup_config(request) {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "rejecting ftrace config");
                0
            }
        }
    }

    fn try_setup_config(&mut self, request: &FtraceConfig) -> Result<FtraceConfigId, MuxError> {
        let is_ftrace_enabled = self.ftrace.is_tracing_enabled();

        if self.ds_configs.is_empty() {
            debug_assert!(self.active_configs.is_empty());

            if is_ftrace_enabled && !self.legacy_atrace {
                return Err(MuxError::TracingInUse);
            }

            // Buffers can take hundreds of ms to resize; tracing stays off.
            self.setup_clock();
            self.setup_buffer_size(request);
        } else if !self.active_configs.is_empty() && !is_ftrace_enabled && !self.legacy_atrace {
            return Err(MuxError::TracingDisabledExternally);
        }

        let events =
            resolver::resolve_events(request, &self.catalog, &self.ftrace, &self.vendor_events);

        if request.requires_atrace() {
            if self.legacy_atrace && !self.ds_configs.is_empty() {
                return Err(MuxError::ConcurrentLegacyAtrace);
            }
            self.update_atrace(request);
        }

        let mut filter = EventFilter::new();
        for group_and_name in &events {
            let Some(event) = self.catalog.get_or_create_event(group_and_name) else {
                debug!(event = %group_and_name, "can't enable event, not known");
                continue;
            };
            let (id, implicit) = (event.id, event.group == IMPLICIT_GROUP);

            if implicit || self.current_state.ftrace_events.is_event_enabled(id) {
                filter.add_enabled_event(id);
                continue;
            }

            if self
                .ftrace
                .enable_event(group_and_name.group(), group_and_name.name())
            {
                self.current_state.ftrace_events.add_enabled_event(id);
                filter.add_enabled_event(id);
            } else {
                warn!(event = %group_and_name, "failed to enable event");
            }
        }

        let compact_sched =
            create_compact_sched_config(request, &self.catalog.compact_sched_format());

        self.last_id += 1;
        let id = self.last_id;
        self.ds_configs.insert(
            id,
            FtraceDataSourceConfig {
                event_filter: filter,
                compact_sched,
                atrace_apps: sorted_unique(&request.atrace_apps),
                atrace_categories: sorted_unique(&request.atrace_categories),
                symbolize_ksyms: request.symbolize_ksyms,
            },
        );

        info!(
            id,
            events = events.len(),
            buffer_pages = self.current_state.cpu_buffer_size_pages,
            "ftrace config admitted",
        );
        Ok(id)
    }

    /// Start tracing for an admitted session. Idempotent per id.
    pub fn activate_config(&mut self, id: FtraceConfigId) -> bool {
        match self.try_activate_config(id) {
            Ok(()) => true,
            Err(e) => {
                error!(id, error = %e, "failed to activate ftrace config");
                false
            }
        }
    }

    fn try_activate_config(&mut self, id: FtraceConfigId) -> Result<(), MuxError> {
        if id == 0 || !self.ds_configs.contains_key(&id) {
            return Err(MuxError::UnknownConfig(id));
        }

        if self.active_configs.is_empty() {
            if self.ftrace.is_tracing_enabled() && !self.legacy_atrace {
                return Err(MuxError::TracingInUse);
            }
            if !self.ftrace.enable_tracing() {
                return Err(MuxError::EnableTracingFailed);
            }
            info!("ftrace enabled");
        }

        self.active_configs.insert(id);
        Ok(())
    }

    /// Drop a session and shrink kernel and helper state to what the
    /// remaining sessions need. Returns false for unknown ids.
    pub fn remove_config(&mut self, id: FtraceConfigId) -> bool {
        if id == 0 || self.ds_configs.remove(&id).is_none() {
            return false;
        }

        let mut expected_events = EventFilter::new();
        let mut expected_apps = BTreeSet::new();
        let mut expected_categories = BTreeSet::new();
        for config in self.ds_configs.values() {
            expected_events.enable_events_from(&config.event_filter);
            expected_apps.extend(config.atrace_apps.iter().cloned());
            expected_categories.extend(config.atrace_categories.iter().cloned());
        }

        // The helper may not have granted everything that was asked of it,
        // so only aim for what is both still wanted and currently on.
        let expected_apps = intersect(&self.current_state.atrace_apps, &expected_apps);
        let expected_categories =
            intersect(&self.current_state.atrace_categories, &expected_categories);
        // Both are subsets of the current state, so sizes tell them apart.
        let atrace_changed = self.current_state.atrace_apps.len() != expected_apps.len()
            || self.current_state.atrace_categories.len() != expected_categories.len();

        for event_id in self.current_state.ftrace_events.enabled_events() {
            if expected_events.is_event_enabled(event_id) {
                continue;
            }
            let Some(event) = self.catalog.event_by_id(event_id) else {
                warn!(event_id, "enabled event missing from catalog");
                continue;
            };
            if self.ftrace.disable_event(&event.group, &event.name) {
                self.current_state.ftrace_events.disable_event(event_id);
            } else {
                warn!(group = %event.group, name = %event.name, "failed to disable event");
            }
        }

        if self.active_configs.remove(&id) && self.active_configs.is_empty() {
            if self.ftrace.disable_tracing() {
                info!("ftrace disabled");
            } else {
                error!("failed to disable ftrace");
            }
        }

        // Idle configs still hold the buffer and clock; only the last
        // removal tears them down.
        if self.ds_configs.is_empty() {
            if self.ftrace.set_cpu_buffer_size_in_pages(1) {
                self.current_state.cpu_buffer_size_pages = 1;
            }
            self.ftrace.disable_all_events();
            self.current_state.ftrace_events = EventFilter::new();
            self.ftrace.clear_trace();
            info!("ftrace torn down");
        }

        if self.current_state.atrace_on {
            if expected_apps.is_empty() && expected_categories.is_empty() {
                self.disable_atrace();
            } else if atrace_changed {
                // Categories that only enable kernel events can't be turned
                // off here; they go away with the last config.
                if self.start_atrace(&expected_apps, &expected_categories) {
                    self.current_state.atrace_apps = expected_apps;
                    self.current_state.atrace_categories = expected_categories;
                }
            }
        }

        info!(id, remaining = self.ds_configs.len(), "ftrace config removed");
        true
    }

    /// Snapshot stored for an admitted session.
    pub fn data_source_config(&self, id: FtraceConfigId) -> Option<&FtraceDataSourceConfig> {
        self.ds_configs.get(&id)
    }

    /// Per-CPU buffer size currently applied, in pages.
    pub fn per_cpu_buffer_size_pages(&self) -> usize {
        self.current_state.cpu_buffer_size_pages
    }

    /// Clock selected during setup.
    pub fn ftrace_clock(&self) -> FtraceClock {
        self.current_state.ftrace_clock
    }

    /// Events this muxer currently holds enabled at the kernel.
    pub fn enabled_events(&self) -> &EventFilter {
        &self.current_state.ftrace_events
    }

    pub fn config_count(&self) -> usize {
        self.ds_configs.len()
    }

    pub fn active_config_count(&self) -> usize {
        self.active_configs.len()
    }

    pub fn is_atrace_on(&self) -> bool {
        self.current_state.atrace_on
    }

    /// Helper categories last granted by a successful helper run.
    pub fn atrace_categories(&self) -> &[String] {
        &self.current_state.atrace_categories
    }

    /// Helper apps last granted by a successful helper run.
    pub fn atrace_apps(&self) -> &[String] {
        &self.current_state.atrace_apps
    }

    pub fn ftrace(&self) -> &F {
        &self.ftrace
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn atrace(&self) -> &A {
        &self.atrace
    }

    fn setup_clock(&mut self) {
        let mut current_clock = self.ftrace.clock();
        let clocks = self.ftrace.available_clocks();

        if let Some(clock) = CLOCK_PREFERENCE.iter().find(|c| clocks.contains(**c)) {
            if current_clock != *clock {
                if self.ftrace.set_clock(clock) {
                    current_clock = clock.to_string();
                } else {
                    warn!(clock, "failed to set trace clock");
                }
            }
        }

        self.current_state.ftrace_clock = FtraceClock::from_name(&current_clock);
        debug!(clock = %current_clock, "trace clock selected");
    }

    fn setup_buffer_size(&mut self, request: &FtraceConfig) {
        let pages = compute_cpu_buffer_size_in_pages(request.buffer_size_kb);
        if !self.ftrace.set_cpu_buffer_size_in_pages(pages) {
            warn!(pages, "failed to set ftrace buffer size");
        }
        self.current_state.cpu_buffer_size_pages = pages;
    }

    /// Widen the helper to cover this request on top of what is already on.
    ///
    /// The union is only recorded once the helper accepts it, so a request
    /// the helper rejects can't poison the state later removals rely on.
    fn update_atrace(&mut self, request: &FtraceConfig) {
        let combined_categories =
            union(&self.current_state.atrace_categories, &request.atrace_categories);
        let combined_apps = union(&self.current_state.atrace_apps, &request.atrace_apps);

        if self.current_state.atrace_on
            && combined_apps.len() == self.current_state.atrace_apps.len()
            && combined_categories.len() == self.current_state.atrace_categories.len()
        {
            return;
        }

        if self.start_atrace(&combined_apps, &combined_categories) {
            self.current_state.atrace_categories = combined_categories;
            self.current_state.atrace_apps = combined_apps;
            self.current_state.atrace_on = true;
        }
    }

    fn start_atrace(&mut self, apps: &[String], categories: &[String]) -> bool {
        let args = atrace::start_args(&self.atrace_binary, self.legacy_atrace, apps, categories);
        let ok = self.atrace.run(&args);
        if ok {
            info!(?categories, ?apps, "atrace started");
        } else {
            warn!(?categories, ?apps, "failed to start atrace");
        }
        ok
    }

    fn disable_atrace(&mut self) {
        debug_assert!(self.current_state.atrace_on);

        let args = atrace::stop_args(&self.atrace_binary, self.legacy_atrace);
        if self.atrace.run(&args) {
            self.current_state.atrace_categories.clear();
            self.current_state.atrace_apps.clear();
            self.current_state.atrace_on = false;
            info!("atrace stopped");
        } else {
            warn!("failed to stop atrace");
        }
    }
}

fn sorted_unique(items: &[String]) -> Vec<String> {
    items
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    a.iter()
        .chain(b)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn intersect(a: &[String], b: &BTreeSet<String>) -> Vec<String> {
    a.iter()
        .filter(|item| b.contains(*item))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
