use std::fs;
use std::path::Path;
use std::time::Duration;

use tracemux::atrace::AtraceCommand;
use tracemux::config::{AtraceConfig, Config, HealthConfig, SessionConfig, TraceFsConfig};
use tracemux::daemon::Daemon;
use tracemux::ftrace::tracefs::TraceFs;
use tracemux::muxer::FtraceConfigMuxer;
use tracemux::request::FtraceConfig;
use tracemux::resolver::VendorEvents;

fn write(root: &Path, relative: &str, value: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, value).expect("write tracefs file");
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative))
        .expect("read tracefs file")
        .trim()
        .to_string()
}

/// Lay out the subset of tracefs the daemon touches.
fn fake_tracefs(root: &Path) {
    write(root, "tracing_on", "0");
    write(root, "trace_clock", "[local] global boot");
    write(root, "buffer_size_kb", "1408");
    write(root, "trace", "");
    write(root, "events/enable", "0");
    write(root, "events/sched/enable", "0");
    for (group, name, id) in [
        ("ftrace", "print", 5),
        ("sched", "sched_switch", 10),
        ("sched", "sched_waking", 11),
        ("power", "cpu_idle", 20),
    ] {
        write(root, &format!("events/{group}/{name}/id"), &id.to_string());
        write(root, &format!("events/{group}/{name}/enable"), "0");
    }
}

fn config(root: &Path, sessions: Vec<SessionConfig>) -> Config {
    Config {
        tracefs: TraceFsConfig {
            path: Some(root.to_path_buf()),
        },
        atrace: AtraceConfig {
            binary: "true".to_string(),
            ..Default::default()
        },
        sessions,
        health: HealthConfig {
            addr: "127.0.0.1:0".to_string(),
        },
        ..Default::default()
    }
}

fn session(name: &str, events: &[&str]) -> SessionConfig {
    SessionConfig {
        name: name.to_string(),
        request: FtraceConfig {
            ftrace_events: events.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn daemon_drives_tracefs_through_session_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    fake_tracefs(root);

    let cfg = config(
        root,
        vec![
            session("system", &["sched/sched_switch", "cpu_idle"]),
            session("sched", &["sched/*"]),
        ],
    );

    let mut daemon = Daemon::new(cfg).expect("create daemon");
    daemon.start().await.expect("start daemon");

    assert_eq!(daemon.sessions().len(), 2);
    assert_eq!(read(root, "tracing_on"), "1");
    assert_eq!(read(root, "trace_clock"), "boot");
    // Default 2048 KB per CPU.
    assert_eq!(read(root, "buffer_size_kb"), "2048");
    assert_eq!(read(root, "events/sched/sched_switch/enable"), "1");
    assert_eq!(read(root, "events/sched/sched_waking/enable"), "1");
    assert_eq!(read(root, "events/power/cpu_idle/enable"), "1");

    let metrics = daemon.health().encode().expect("encode metrics");
    assert!(metrics.contains("tracemux_sessions_active 2"));
    assert!(metrics.contains("tracemux_events_enabled 3"));

    daemon.stop().await.expect("stop daemon");

    assert!(daemon.sessions().is_empty());
    assert_eq!(read(root, "tracing_on"), "0");
    assert_eq!(read(root, "buffer_size_kb"), "4");
    assert_eq!(read(root, "events/sched/sched_switch/enable"), "0");
    assert_eq!(read(root, "events/power/cpu_idle/enable"), "0");

    let metrics = daemon.health().encode().expect("encode metrics");
    assert!(metrics.contains("tracemux_sessions_admitted 0"));
}

#[tokio::test]
async fn daemon_refuses_when_ftrace_already_in_use() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    fake_tracefs(root);
    write(root, "tracing_on", "1");

    let cfg = config(root, vec![session("system", &["sched/sched_switch"])]);

    let mut daemon = Daemon::new(cfg).expect("create daemon");
    let err = daemon.start().await.expect_err("start must fail");
    assert!(err.to_string().contains("no session could be started"));

    let metrics = daemon.health().encode().expect("encode metrics");
    assert!(metrics.contains("tracemux_setup_rejections_total 1"));
    assert_eq!(read(root, "events/sched/sched_switch/enable"), "0");

    daemon.stop().await.expect("stop daemon");
}

#[tokio::test]
async fn daemon_fails_without_tracefs() {
    let dir = tempfile::tempdir().expect("tempdir");

    let cfg = config(dir.path(), vec![session("system", &["sched/sched_switch"])]);

    let mut daemon = Daemon::new(cfg).expect("create daemon");
    let err = daemon.start().await.expect_err("start must fail");
    assert!(format!("{err:#}").contains("opening tracefs"));

    daemon.stop().await.expect("stop daemon");
}

#[test]
fn malformed_session_leaves_group_switch_alone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    fake_tracefs(root);

    let tracefs = TraceFs::open_at(root).expect("open tracefs");
    let catalog = tracefs.load_catalog().expect("load catalog");
    let mut muxer = FtraceConfigMuxer::new(
        tracefs,
        catalog,
        AtraceCommand::new(Duration::from_secs(1)),
        VendorEvents::new(),
    );

    let a = muxer.setup_config(&session("a", &["sched/sched_switch"]).request);
    let b = muxer.setup_config(&session("b", &["sched/."]).request);
    assert_ne!(a, 0);
    assert_ne!(b, 0);
    assert_eq!(read(root, "events/sched/enable"), "0");

    assert!(muxer.remove_config(b));
    assert_eq!(read(root, "events/sched/enable"), "0");
    assert_eq!(read(root, "events/sched/sched_switch/enable"), "1");
}
