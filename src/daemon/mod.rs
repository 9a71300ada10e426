use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::atrace::AtraceCommand;
use crate::catalog::TableCatalog;
use crate::config::Config;
use crate::export::health::HealthMetrics;
use crate::ftrace::tracefs::TraceFs;
use crate::muxer::{FtraceConfigId, FtraceConfigMuxer};

/// Muxer over the real kernel collaborators.
pub type SystemMuxer = FtraceConfigMuxer<TraceFs, TableCatalog, AtraceCommand>;

/// A session the daemon admitted and activated.
#[derive(Debug, Clone)]
pub struct RunningSession {
    pub name: String,
    pub id: FtraceConfigId,
}

/// Daemon owns the muxer and drives the configured sessions through it.
///
/// Muxer calls block on tracefs and on the helper subprocess, so they run
/// on the blocking pool, one at a time behind the mutex.
pub struct Daemon {
    cfg: Config,
    health: Arc<HealthMetrics>,
    muxer: Option<Arc<Mutex<SystemMuxer>>>,
    sessions: Vec<RunningSession>,
}

impl Daemon {
    /// Creates a new Daemon, initializing health metrics.
    pub fn new(cfg: Config) -> Result<Self> {
        let health =
            Arc::new(HealthMetrics::new(&cfg.health.addr).context("creating health metrics")?);

        Ok(Self {
            cfg,
            health,
            muxer: None,
            sessions: Vec::new(),
        })
    }

    /// Health metrics shared with the HTTP server.
    pub fn health(&self) -> &Arc<HealthMetrics> {
        &self.health
    }

    /// Sessions currently running.
    pub fn sessions(&self) -> &[RunningSession] {
        &self.sessions
    }

    /// Open the kernel collaborators, then admit and activate every session.
    pub async fn start(&mut self) -> Result<()> {
        self.health
            .start()
            .await
            .context("starting health metrics server")?;

        let tracefs = match &self.cfg.tracefs.path {
            Some(path) => TraceFs::open_at(path),
            None => TraceFs::open(),
        }
        .context("opening tracefs")?;

        let catalog = tracefs.load_catalog().context("loading event catalog")?;
        let vendor_events = self.cfg.vendor_events()?;

        let muxer = FtraceConfigMuxer::new(
            tracefs,
            catalog,
            AtraceCommand::new(self.cfg.atrace.timeout),
            vendor_events,
        )
        .with_atrace_binary(self.cfg.atrace.binary.clone())
        .with_legacy_atrace(self.cfg.atrace.legacy);
        let muxer = Arc::new(Mutex::new(muxer));
        self.muxer = Some(Arc::clone(&muxer));

        for session in &self.cfg.sessions {
            let request = session.request.clone();
            let id = run_blocking(&muxer, move |m| m.setup_config(&request)).await?;
            if id == 0 {
                self.health.setup_rejections.inc();
                warn!(session = %session.name, "session rejected");
                continue;
            }

            if !run_blocking(&muxer, move |m| m.activate_config(id)).await? {
                self.health.activation_failures.inc();
                warn!(session = %session.name, id, "session failed to activate");
                run_blocking(&muxer, move |m| m.remove_config(id)).await?;
                continue;
            }

            info!(session = %session.name, id, "session started");
            self.sessions.push(RunningSession {
                name: session.name.clone(),
                id,
            });
        }

        self.update_metrics();

        if self.sessions.is_empty() {
            bail!("no session could be started");
        }

        Ok(())
    }

    /// Remove every running session, which tears ftrace down, then stop
    /// the health server.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(muxer) = self.muxer.clone() {
            while let Some(session) = self.sessions.pop() {
                let id = session.id;
                if !run_blocking(&muxer, move |m| m.remove_config(id)).await? {
                    warn!(session = %session.name, id, "session was not known to the muxer");
                }
                info!(session = %session.name, id, "session stopped");
            }
            self.update_metrics();
        }

        self.health.stop().await?;

        Ok(())
    }

    fn update_metrics(&self) {
        let Some(muxer) = &self.muxer else {
            return;
        };
        let m = muxer.lock();
        self.health.sessions_admitted.set(m.config_count() as f64);
        self.health.sessions_active.set(m.active_config_count() as f64);
        self.health.events_enabled.set(m.enabled_events().len() as f64);
        self.health
            .buffer_size_pages
            .set(m.per_cpu_buffer_size_pages() as f64);
    }
}

/// Run one muxer operation on the blocking pool.
async fn run_blocking<T, Op>(muxer: &Arc<Mutex<SystemMuxer>>, op: Op) -> Result<T>
where
    T: Send + 'static,
    Op: FnOnce(&mut SystemMuxer) -> T + Send + 'static,
{
    let muxer = Arc::clone(muxer);
    tokio::task::spawn_blocking(move || op(&mut *muxer.lock()))
        .await
        .context("muxer task panicked")
}
