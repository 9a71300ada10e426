pub mod tracefs;

use std::collections::BTreeSet;

/// Size of a kernel page as seen by the per-CPU ring buffer.
pub const PAGE_SIZE_BYTES: usize = 4096;

/// Primitive operations on the kernel's single, shared ftrace instance.
///
/// Every mutating call reports success as a bool rather than an error: the
/// caller decides whether a failure is fatal. Implementations must not cache
/// state that another process could change underneath them.
pub trait FtraceSurface {
    /// Whether the global `tracing_on` switch is set.
    fn is_tracing_enabled(&self) -> bool;

    /// Set the global `tracing_on` switch.
    fn enable_tracing(&mut self) -> bool;

    /// Clear the global `tracing_on` switch.
    fn disable_tracing(&mut self) -> bool;

    /// Enable one event.
    fn enable_event(&mut self, group: &str, name: &str) -> bool;

    /// Disable one event.
    fn disable_event(&mut self, group: &str, name: &str) -> bool;

    /// Disable every event in every group.
    fn disable_all_events(&mut self) -> bool;

    /// Discard all buffered trace data.
    fn clear_trace(&mut self) -> bool;

    /// The currently selected trace clock.
    fn clock(&self) -> String;

    /// All trace clocks the kernel advertises.
    fn available_clocks(&self) -> BTreeSet<String>;

    /// Select a trace clock.
    fn set_clock(&mut self, clock: &str) -> bool;

    /// Resize every per-CPU ring buffer.
    fn set_cpu_buffer_size_in_pages(&mut self, pages: usize) -> bool;

    /// Names of the events the kernel currently exposes for a group.
    fn event_names_for_group(&self, group: &str) -> BTreeSet<String>;
}
