use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use tracemux::config;
use tracemux::daemon::Daemon;

/// Kernel ftrace session multiplexer.
#[derive(Parser)]
#[command(name = "tracemux", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity (trace, debug, info, warn, error). Overrides
    /// `log_level` from the config file.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("tracemux {VERSION}");
        return Ok(());
    }

    let config_path = cli
        .config
        .context("--config is required (use --help for usage)")?;

    let cfg = config::Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let log_level = effective_log_level(cli.log_level.as_deref(), &cfg);
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level: {log_level}"))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = VERSION,
        log_level,
        sessions = cfg.sessions.len(),
        "starting tracemux",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

/// The command line wins over the config file.
fn effective_log_level<'a>(flag: Option<&'a str>, cfg: &'a config::Config) -> &'a str {
    flag.unwrap_or(&cfg.log_level)
}

async fn run(cfg: config::Config) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    let mut daemon = Daemon::new(cfg)?;
    if let Err(e) = daemon.start().await {
        // Undo whatever part of the setup succeeded before bailing.
        daemon.stop().await?;
        return Err(e);
    }

    let _ = shutdown_rx.await;

    daemon.stop().await?;

    tracing::info!("tracemux stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_flag_overrides_config() {
        let cfg = config::Config {
            log_level: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(effective_log_level(None, &cfg), "warn");
        assert_eq!(effective_log_level(Some("debug"), &cfg), "debug");
        assert_eq!(effective_log_level(None, &config::Config::default()), "info");
    }

    #[test]
    fn test_cli_log_level_is_optional() {
        let cli = Cli::parse_from(["tracemux", "--config", "tracemux.yaml"]);
        assert!(cli.log_level.is_none());

        let cli = Cli::parse_from(["tracemux", "--log-level", "debug"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
