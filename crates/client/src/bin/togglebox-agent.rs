//! togglebox-agent: runs a toggle client and periodically reports what it sees.
//!
//! Useful for checking connectivity and toggle state from a shell:
//! `togglebox-agent --flag checkout-v2 --flag dark-mode --report-secs 10`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use togglebox_client::{ClientError, ClientSettings, SchedulerError, ToggleClient};

// ── CLI ─────────────────────────────────────────────────────────────

/// Toggle client agent: polls the toggle service and logs toggle state.
#[derive(Parser, Debug)]
#[command(name = "togglebox-agent", version, about)]
struct Cli {
    /// TOML settings file. Environment variables are used when absent.
    #[arg(long, env = "TOGGLEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Override the toggle poll interval in seconds.
    #[arg(long, env = "TOGGLEBOX_AGENT_FETCH_SECS")]
    fetch_secs: Option<u64>,

    /// Override the metrics interval in seconds (0 disables metrics).
    #[arg(long, env = "TOGGLEBOX_AGENT_METRICS_SECS")]
    metrics_secs: Option<u64>,

    /// How often to log the toggle summary, in seconds.
    #[arg(long, env = "TOGGLEBOX_AGENT_REPORT_SECS", default_value_t = 30)]
    report_secs: u64,

    /// Toggle names to evaluate on every report. Repeatable.
    #[arg(long = "flag")]
    flags: Vec<String>,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<ClientSettings> {
        let mut settings = match &self.config {
            Some(path) => ClientSettings::from_file(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => ClientSettings::from_env(),
        };
        if let Some(secs) = self.fetch_secs {
            settings.fetch_interval_secs = secs;
        }
        if let Some(secs) = self.metrics_secs {
            settings.metrics_interval_secs = Some(secs);
        }
        Ok(settings)
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    togglebox_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;
    settings.log_summary();

    let client = ToggleClient::builder(settings)
        .start()
        .await
        .context("failed to start toggle client")?;

    let mut report = tokio::time::interval(Duration::from_secs(cli.report_secs.max(1)));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = report.tick() => log_report(&client, &cli.flags),
        }
    }

    info!("togglebox-agent shutting down");
    match client.stop().await {
        Ok(()) => {
            info!("togglebox-agent exited cleanly");
            Ok(())
        }
        Err(ClientError::Scheduler(SchedulerError::ShutdownTimeout { task, grace })) => {
            error!(task = %task, ?grace, "background task did not stop in time");
            anyhow::bail!("task '{task}' did not stop within {grace:?}")
        }
        Err(e) => Err(e.into()),
    }
}

fn log_report(client: &ToggleClient, flags: &[String]) {
    match client.toggles() {
        Ok(set) => {
            let mut names: Vec<&str> = set.names().collect();
            names.sort_unstable();
            info!(count = set.len(), toggles = ?names, "current toggle set");
        }
        Err(e) => warn!(error = %e, "toggle set unavailable"),
    }
    for flag in flags {
        info!(toggle = %flag, enabled = client.is_enabled(flag), "evaluated");
    }
    for (task, stats) in client.task_stats() {
        info!(
            task = %task,
            succeeded = stats.succeeded,
            failed = stats.failed,
            avg_ms = stats.avg_duration.as_millis() as u64,
            "task stats"
        );
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => {
                warn!("failed to register signal handlers, falling back to ctrl_c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
