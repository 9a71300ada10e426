use tracing::warn;

use crate::ftrace::PAGE_SIZE_BYTES;

/// Per-CPU buffer size used when a request leaves it at 0.
pub const DEFAULT_PER_CPU_BUFFER_SIZE_KB: usize = 2 * 1024;

/// Largest per-CPU buffer size a request may ask for.
pub const MAX_PER_CPU_BUFFER_SIZE_KB: usize = 64 * 1024;

/// Translate a requested per-CPU buffer size in KB into ring buffer pages.
///
/// 0 selects [`DEFAULT_PER_CPU_BUFFER_SIZE_KB`], requests above
/// [`MAX_PER_CPU_BUFFER_SIZE_KB`] are capped, and the result is never below
/// one page.
pub fn compute_cpu_buffer_size_in_pages(requested_kb: usize) -> usize {
    let mut kb = requested_kb;
    if kb == 0 {
        kb = DEFAULT_PER_CPU_BUFFER_SIZE_KB;
    }
    if kb > MAX_PER_CPU_BUFFER_SIZE_KB {
        warn!(
            requested_kb = kb,
            max_kb = MAX_PER_CPU_BUFFER_SIZE_KB,
            "requested ftrace buffer size too big, capping",
        );
        kb = MAX_PER_CPU_BUFFER_SIZE_KB;
    }

    let pages = kb / (PAGE_SIZE_BYTES / 1024);
    pages.max(1)
}
