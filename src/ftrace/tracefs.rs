use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use super::{FtraceSurface, PAGE_SIZE_BYTES};
use crate::catalog::{is_valid_component, TableCatalog};

/// Well-known tracefs mount points, tried when /proc/mounts has no entry.
const WELL_KNOWN_PATHS: &[&str] = &["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// Kernel tracing surface backed by the tracefs pseudo filesystem.
#[derive(Debug, Clone)]
pub struct TraceFs {
    root: PathBuf,
}

impl TraceFs {
    /// Opens the first mounted tracefs, falling back to well-known paths.
    pub fn open() -> Result<Self> {
        if let Some(path) = find_tracefs_mount()? {
            info!(path = %path.display(), "tracefs found in /proc/mounts");
            return Self::open_at(&path);
        }

        for path in WELL_KNOWN_PATHS {
            let path = Path::new(path);
            if path.join("tracing_on").exists() {
                return Self::open_at(path);
            }
        }

        bail!(
            "tracefs does not appear to be mounted; mount it with \
             `mount -t tracefs nodev /sys/kernel/tracing`"
        )
    }

    /// Opens tracefs rooted at the given path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let tracing_on = path.join("tracing_on");
        fs::metadata(&tracing_on).with_context(|| format!("accessing {}", tracing_on.display()))?;

        info!(path = %path.display(), "tracefs opened");
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Root directory of this tracefs instance.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build an event catalog from the `events/<group>/<name>/id` files.
    pub fn load_catalog(&self) -> Result<TableCatalog> {
        let events_dir = self.root.join("events");
        let groups = fs::read_dir(&events_dir)
            .with_context(|| format!("reading {}", events_dir.display()))?;

        let mut catalog = TableCatalog::new();

        for group in groups {
            let group = match group {
                Ok(g) => g,
                Err(_) => continue,
            };
            if !group.path().is_dir() {
                continue;
            }
            let group_name = group.file_name().to_string_lossy().into_owned();

            let events = match fs::read_dir(group.path()) {
                Ok(e) => e,
                Err(e) => {
                    warn!(group = %group_name, error = %e, "failed to list event group");
                    continue;
                }
            };

            for event in events {
                let event = match event {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                let id_path = event.path().join("id");
                let id = match fs::read_to_string(&id_path) {
                    // The kernel stores event types as u16 in every record.
                    Ok(raw) => match raw.trim().parse::<u16>() {
                        Ok(id) => usize::from(id),
                        Err(e) => {
                            warn!(path = %id_path.display(), error = %e, "invalid event id");
                            continue;
                        }
                    },
                    Err(_) => continue,
                };
                let event_name = event.file_name().to_string_lossy().into_owned();

                if let Err(e) = catalog.insert(&group_name, &event_name, id) {
                    warn!(error = %e, "skipping event");
                }
            }
        }

        info!(events = catalog.len(), "event catalog loaded from tracefs");
        Ok(catalog)
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn write_file(&self, relative: &str, value: &str) -> Result<()> {
        let path = self.path(relative);
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(value.as_bytes())
            .with_context(|| format!("writing {}", path.display()))
    }

    fn read_file(&self, relative: &str) -> Result<String> {
        let path = self.path(relative);
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
    }

    /// Write one event's `enable` file. Names that would escape the event's
    /// own directory are refused.
    fn write_event_enable(&self, group: &str, name: &str, value: &str) -> bool {
        if !is_valid_component(group) || !is_valid_component(name) {
            warn!(group, name, "refusing malformed event path");
            return false;
        }
        self.write_logged(&format!("events/{group}/{name}/enable"), value)
    }

    fn write_logged(&self, relative: &str, value: &str) -> bool {
        match self.write_file(relative, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(file = relative, value, error = %e, "tracefs write failed");
                false
            }
        }
    }
}

/// Scan /proc/mounts for a tracefs entry.
fn find_tracefs_mount() -> Result<Option<PathBuf>> {
    let mounts = match File::open("/proc/mounts") {
        Ok(f) => f,
        Err(e) => {
            debug!(error = %e, "cannot read /proc/mounts");
            return Ok(None);
        }
    };

    for line in BufReader::new(mounts).lines() {
        let line = line.context("reading /proc/mounts")?;
        // Format: fsspec path vfstype ...
        let mut parts = line.split_whitespace();
        if let (Some(path), Some("tracefs")) = (parts.nth(1), parts.next()) {
            return Ok(Some(PathBuf::from(path)));
        }
    }

    Ok(None)
}

/// Extract the bracketed entry from a `trace_clock` listing.
fn parse_current_clock(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw[start..].find(']')?;
    Some(&raw[start + 1..start + end])
}

fn parse_clocks(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace()
        .map(|c| c.trim_start_matches('[').trim_end_matches(']'))
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

impl FtraceSurface for TraceFs {
    fn is_tracing_enabled(&self) -> bool {
        match self.read_file("tracing_on") {
            Ok(raw) => raw.trim() == "1",
            Err(e) => {
                warn!(error = %e, "failed to read tracing_on");
                false
            }
        }
    }

    fn enable_tracing(&mut self) -> bool {
        self.write_logged("tracing_on", "1")
    }

    fn disable_tracing(&mut self) -> bool {
        self.write_logged("tracing_on", "0")
    }

    fn enable_event(&mut self, group: &str, name: &str) -> bool {
        self.write_event_enable(group, name, "1")
    }

    fn disable_event(&mut self, group: &str, name: &str) -> bool {
        self.write_event_enable(group, name, "0")
    }

    fn disable_all_events(&mut self) -> bool {
        self.write_logged("events/enable", "0")
    }

    fn clear_trace(&mut self) -> bool {
        self.write_logged("trace", "")
    }

    fn clock(&self) -> String {
        match self.read_file("trace_clock") {
            Ok(raw) => parse_current_clock(&raw).unwrap_or_default().to_string(),
            Err(e) => {
                warn!(error = %e, "failed to read trace_clock");
                String::new()
            }
        }
    }

    fn available_clocks(&self) -> BTreeSet<String> {
        match self.read_file("trace_clock") {
            Ok(raw) => parse_clocks(&raw),
            Err(e) => {
                warn!(error = %e, "failed to read trace_clock");
                BTreeSet::new()
            }
        }
    }

    fn set_clock(&mut self, clock: &str) -> bool {
        self.write_logged("trace_clock", clock)
    }

    fn set_cpu_buffer_size_in_pages(&mut self, pages: usize) -> bool {
        let kb = pages * (PAGE_SIZE_BYTES / 1024);
        self.write_logged("buffer_size_kb", &kb.to_string())
    }

    fn event_names_for_group(&self, group: &str) -> BTreeSet<String> {
        if !is_valid_component(group) {
            return BTreeSet::new();
        }
        let dir = self.root.join("events").join(group);
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                debug!(group, error = %e, "event group not present");
                return BTreeSet::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect()
    }
}
