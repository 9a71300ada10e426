use serde::Deserialize;

/// One tracing session's request for kernel and userspace instrumentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FtraceConfig {
    /// Raw event specs: `group/name`, bare `name`, or `group/*`.
    #[serde(default)]
    pub ftrace_events: Vec<String>,

    /// Named high-level categories (e.g. "sched", "gfx").
    #[serde(default)]
    pub atrace_categories: Vec<String>,

    /// Apps the userspace helper should enable annotations for.
    #[serde(default)]
    pub atrace_apps: Vec<String>,

    /// Requested per-CPU buffer size in KB. 0 selects the default.
    #[serde(default)]
    pub buffer_size_kb: usize,

    /// Resolve kernel symbol addresses when decoding.
    #[serde(default)]
    pub symbolize_ksyms: bool,

    /// Compact scheduling encoding sub-config.
    #[serde(default)]
    pub compact_sched: CompactSchedRequest,
}

/// Request for the compact scheduling event encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CompactSchedRequest {
    #[serde(default)]
    pub enabled: bool,
}

impl FtraceConfig {
    /// Whether this request needs the userspace category helper.
    pub fn requires_atrace(&self) -> bool {
        !self.atrace_categories.is_empty() || !self.atrace_apps.is_empty()
    }
}
