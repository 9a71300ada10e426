#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracemux::atrace::AtraceRunner;
use tracemux::catalog::TableCatalog;
use tracemux::ftrace::FtraceSurface;
use tracemux::muxer::FtraceConfigMuxer;
use tracemux::request::FtraceConfig;
use tracemux::resolver::VendorEvents;

/// A mutating call made against the fake kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    EnableTracing,
    DisableTracing,
    EnableEvent(String, String),
    DisableEvent(String, String),
    DisableAllEvents,
    ClearTrace,
    SetClock(String),
    SetBufferPages(usize),
}

/// Observable state of the fake kernel.
#[derive(Debug)]
pub struct KernelState {
    pub tracing_on: bool,
    pub clock: String,
    pub clocks: BTreeSet<String>,
    pub enabled: BTreeSet<(String, String)>,
    pub fail_enable: BTreeSet<(String, String)>,
    pub fail_disable: BTreeSet<(String, String)>,
    pub groups: BTreeMap<String, BTreeSet<String>>,
    pub buffer_pages: usize,
    pub calls: Vec<Call>,
}

impl Default for KernelState {
    fn default() -> Self {
        Self {
            tracing_on: false,
            clock: "local".to_string(),
            clocks: ["local", "global", "boot"].iter().map(|c| c.to_string()).collect(),
            enabled: BTreeSet::new(),
            fail_enable: BTreeSet::new(),
            fail_disable: BTreeSet::new(),
            groups: BTreeMap::new(),
            buffer_pages: 1,
            calls: Vec::new(),
        }
    }
}

fn key(group: &str, name: &str) -> (String, String) {
    (group.to_string(), name.to_string())
}

/// Fake kernel tracing surface; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct FakeFtrace {
    pub state: Rc<RefCell<KernelState>>,
}

impl FakeFtrace {
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn is_enabled(&self, group: &str, name: &str) -> bool {
        self.state.borrow().enabled.contains(&key(group, name))
    }

    pub fn set_tracing_on(&self, on: bool) {
        self.state.borrow_mut().tracing_on = on;
    }

    pub fn fail_enable(&self, group: &str, name: &str) {
        self.state.borrow_mut().fail_enable.insert(key(group, name));
    }

    pub fn fail_disable(&self, group: &str, name: &str) {
        self.state.borrow_mut().fail_disable.insert(key(group, name));
    }

    pub fn add_group(&self, group: &str, names: &[&str]) {
        self.state.borrow_mut().groups.insert(
            group.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
    }

    pub fn count(&self, call: &Call) -> usize {
        self.state.borrow().calls.iter().filter(|c| *c == call).count()
    }
}

impl FtraceSurface for FakeFtrace {
    fn is_tracing_enabled(&self) -> bool {
        self.state.borrow().tracing_on
    }

    fn enable_tracing(&mut self) -> bool {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::EnableTracing);
        s.tracing_on = true;
        true
    }

    fn disable_tracing(&mut self) -> bool {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::DisableTracing);
        s.tracing_on = false;
        true
    }

    fn enable_event(&mut self, group: &str, name: &str) -> bool {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::EnableEvent(group.to_string(), name.to_string()));
        if s.fail_enable.contains(&key(group, name)) {
            return false;
        }
        s.enabled.insert(key(group, name));
        true
    }

    fn disable_event(&mut self, group: &str, name: &str) -> bool {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::DisableEvent(group.to_string(), name.to_string()));
        if s.fail_disable.contains(&key(group, name)) {
            return false;
        }
        s.enabled.remove(&key(group, name));
        true
    }

    fn disable_all_events(&mut self) -> bool {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::DisableAllEvents);
        s.enabled.clear();
        true
    }

    fn clear_trace(&mut self) -> bool {
        self.state.borrow_mut().calls.push(Call::ClearTrace);
        true
    }

    fn clock(&self) -> String {
        self.state.borrow().clock.clone()
    }

    fn available_clocks(&self) -> BTreeSet<String> {
        self.state.borrow().clocks.clone()
    }

    fn set_clock(&mut self, clock: &str) -> bool {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::SetClock(clock.to_string()));
        s.clock = clock.to_string();
        true
    }

    fn set_cpu_buffer_size_in_pages(&mut self, pages: usize) -> bool {
        let mut s = self.state.borrow_mut();
        s.calls.push(Call::SetBufferPages(pages));
        s.buffer_pages = pages;
        true
    }

    fn event_names_for_group(&self, group: &str) -> BTreeSet<String> {
        self.state
            .borrow()
            .groups
            .get(group)
            .cloned()
            .unwrap_or_default()
    }
}

/// Fake userspace helper recording each argument vector.
#[derive(Debug, Clone, Default)]
pub struct FakeAtrace {
    pub runs: Rc<RefCell<Vec<Vec<String>>>>,
    pub fail: Rc<RefCell<bool>>,
}

impl FakeAtrace {
    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.borrow().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.borrow_mut() = fail;
    }
}

impl AtraceRunner for FakeAtrace {
    fn run(&mut self, args: &[String]) -> bool {
        self.runs.borrow_mut().push(args.to_vec());
        !*self.fail.borrow()
    }
}

pub type TestMuxer = FtraceConfigMuxer<FakeFtrace, TableCatalog, FakeAtrace>;

/// Catalog with a handful of real-looking events.
pub fn catalog() -> TableCatalog {
    let mut catalog = TableCatalog::new();
    for (group, name, id) in [
        ("ftrace", "print", 5),
        ("sched", "sched_switch", 10),
        ("sched", "sched_waking", 11),
        ("sched", "sched_wakeup", 12),
        ("power", "cpu_idle", 20),
        ("power", "cpu_frequency", 21),
        ("kmem", "rss_stat", 30),
    ] {
        catalog.insert(group, name, id).unwrap();
    }
    catalog
}

pub struct Harness {
    pub muxer: TestMuxer,
    pub ftrace: FakeFtrace,
    pub atrace: FakeAtrace,
}

pub fn harness() -> Harness {
    harness_with(VendorEvents::new(), false)
}

pub fn harness_with(vendor_events: VendorEvents, legacy: bool) -> Harness {
    let ftrace = FakeFtrace::default();
    let atrace = FakeAtrace::default();
    let muxer = FtraceConfigMuxer::new(ftrace.clone(), catalog(), atrace.clone(), vendor_events)
        .with_legacy_atrace(legacy);
    Harness {
        muxer,
        ftrace,
        atrace,
    }
}

pub fn events(specs: &[&str]) -> FtraceConfig {
    FtraceConfig {
        ftrace_events: specs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn categories(categories: &[&str]) -> FtraceConfig {
    FtraceConfig {
        atrace_categories: categories.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
