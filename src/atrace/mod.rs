//! Coordination with the userspace category helper (`atrace`).
//!
//! The helper is a black box: it is launched with a category/app argument
//! list and either succeeds or fails. It cannot be queried for its state.

use std::io::Read;
use std::process::{ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Poll interval while waiting for the helper to exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest stderr excerpt carried into a failure log.
const MAX_STDERR_BYTES: usize = 4096;

/// Runs the helper with a full argument vector (argv[0] included).
pub trait AtraceRunner {
    /// Returns true if the helper ran and reported success.
    fn run(&mut self, args: &[String]) -> bool;
}

/// Build the argument vector that starts the helper for the given
/// categories and apps.
pub fn start_args(binary: &str, legacy: bool, apps: &[String], categories: &[String]) -> Vec<String> {
    let mut args = vec![binary.to_string(), "--async_start".to_string()];
    if !legacy {
        args.push("--only_userspace".to_string());
    }

    args.extend(categories.iter().cloned());

    if !apps.is_empty() {
        args.push("-a".to_string());
        args.push(apps.join(","));
    }

    args
}

/// Build the argument vector that stops the helper.
pub fn stop_args(binary: &str, legacy: bool) -> Vec<String> {
    let mut args = vec![binary.to_string(), "--async_stop".to_string()];
    if !legacy {
        args.push("--only_userspace".to_string());
    }
    args
}

/// Launches the helper as a subprocess.
#[derive(Debug, Clone)]
pub struct AtraceCommand {
    timeout: Duration,
}

impl AtraceCommand {
    /// Create a runner that kills the helper if it runs longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl AtraceRunner for AtraceCommand {
    fn run(&mut self, args: &[String]) -> bool {
        let Some((program, rest)) = args.split_first() else {
            warn!("atrace invoked without a program");
            return false;
        };

        debug!(?args, "running atrace");

        let mut child = match Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(program = %program, error = %e, "failed to spawn atrace");
                return false;
            }
        };

        // Drained on its own thread so a chatty helper can't block on a full pipe.
        let stderr = child.stderr.take().map(drain_stderr);

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        let stderr = collect_stderr(stderr);
                        warn!(%status, stderr = %stderr.trim(), "atrace exited with failure");
                    }
                    return status.success();
                }
                Ok(None) if Instant::now() >= deadline => {
                    warn!(timeout = ?self.timeout, "atrace timed out, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    return false;
                }
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(e) => {
                    warn!(error = %e, "failed waiting for atrace");
                    return false;
                }
            }
        }
    }
}

fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut raw = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut raw) {
            debug!(error = %e, "failed reading atrace stderr");
        }
        raw.truncate(MAX_STDERR_BYTES);
        String::from_utf8_lossy(&raw).into_owned()
    })
}

fn collect_stderr(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
