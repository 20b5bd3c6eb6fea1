//! The client handle: startup, evaluation and shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use togglebox_core::{ClientRegistration, ClientSettings, EvaluationContext, FlagSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{FileCache, LocalCache};
use crate::context::{ContextProvider, StaticContextProvider};
use crate::error::ClientError;
use crate::remote::{HttpRemoteClient, RemoteClient};
use crate::scheduler::{TaskScheduler, TaskStats, DEFAULT_SHUTDOWN_GRACE};
use crate::state::{MetricsRecorder, ToggleStore};
use crate::strategy::{Strategy, StrategyRegistry};
use crate::tasks::{FetchTogglesTask, RegisterClientTask, SendMetricsTask};

/// Reported to the toggle service at registration.
pub const SDK_VERSION: &str = concat!("togglebox-rust:", env!("CARGO_PKG_VERSION"));

/// A running feature toggle client.
///
/// Evaluations read the current toggle set without blocking. Background
/// tasks keep the set fresh and report usage until [`stop`](Self::stop).
pub struct ToggleClient {
    settings: ClientSettings,
    cancel: CancellationToken,
    toggles: Arc<ToggleStore>,
    /// `None` when metrics are disabled.
    metrics: Option<Arc<MetricsRecorder>>,
    scheduler: TaskScheduler,
    strategies: StrategyRegistry,
    context: Arc<dyn ContextProvider>,
    /// Set once the first evaluation after `stop` has been logged.
    stopped_use_logged: AtomicBool,
}

impl ToggleClient {
    pub fn builder(settings: ClientSettings) -> ToggleClientBuilder {
        ToggleClientBuilder::new(settings)
    }

    // ── Evaluation ──────────────────────────────────────────────

    /// Whether `toggle` is on for the ambient context. Unknown toggles are off.
    pub fn is_enabled(&self, toggle: &str) -> bool {
        self.is_enabled_or(toggle, false)
    }

    /// Like [`is_enabled`](Self::is_enabled) with an explicit fallback for
    /// unknown toggles.
    pub fn is_enabled_or(&self, toggle: &str, default: bool) -> bool {
        self.evaluate(toggle, &self.context.context(), default)
    }

    /// Evaluate against the ambient context extended with `properties`.
    /// Properties overwrite ambient ones with the same key.
    pub fn is_enabled_with(
        &self,
        toggle: &str,
        properties: &HashMap<String, String>,
        default: bool,
    ) -> bool {
        let mut context = self.context.context();
        context.append_properties(properties);
        self.evaluate(toggle, &context, default)
    }

    /// Evaluate against an explicit context, ignoring the ambient one.
    pub fn is_enabled_for(&self, toggle: &str, context: &EvaluationContext, default: bool) -> bool {
        self.evaluate(toggle, context, default)
    }

    fn evaluate(&self, toggle: &str, context: &EvaluationContext, default: bool) -> bool {
        let flags = match self.toggles.current() {
            Ok(flags) => flags,
            Err(e) => {
                if self.stopped_use_logged.swap(true, Ordering::Relaxed) {
                    debug!(toggle, error = %e, "toggle evaluated on a stopped client");
                } else {
                    error!(toggle, error = %e, "toggle evaluated on a stopped client");
                }
                return default;
            }
        };
        let Some(definition) = flags.get(toggle) else {
            return default;
        };

        let enabled = self.strategies.evaluate(definition, context);
        if let Some(metrics) = &self.metrics {
            metrics.record(toggle, enabled);
        }
        enabled
    }

    // ── Introspection ──────────────────────────────────────────

    /// Snapshot of the active toggle set.
    pub fn toggles(&self) -> Result<Arc<FlagSet>, ClientError> {
        Ok(self.toggles.current()?)
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn task_stats(&self) -> HashMap<String, TaskStats> {
        self.scheduler.stats_snapshot()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ── Shutdown ───────────────────────────────────────────────

    /// Cancel background work, wait for it to stop, then release the toggle
    /// set. Later evaluations return their default.
    ///
    /// The toggle set is released even when a task misses the shutdown
    /// grace period; that case is reported as
    /// [`SchedulerError::ShutdownTimeout`](crate::SchedulerError::ShutdownTimeout).
    /// Calling this again is a no-op.
    pub async fn stop(&self) -> Result<(), ClientError> {
        if !self.cancel.is_cancelled() {
            info!(app = %self.settings.app_name, "stopping toggle client");
        }
        self.cancel.cancel();
        let disposed = self.scheduler.dispose().await;
        self.toggles.dispose();
        disposed?;
        Ok(())
    }
}

impl Drop for ToggleClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ToggleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleClient")
            .field("app_name", &self.settings.app_name)
            .field("instance", &self.settings.instance_tag)
            .field("tasks", &self.scheduler.task_names())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

// ── Builder ────────────────────────────────────────────────────

/// Configures and starts a [`ToggleClient`].
pub struct ToggleClientBuilder {
    settings: ClientSettings,
    remote: Option<Arc<dyn RemoteClient>>,
    cache: Option<Arc<dyn LocalCache>>,
    context: Option<Arc<dyn ContextProvider>>,
    strategies: StrategyRegistry,
    shutdown_grace: Duration,
}

impl ToggleClientBuilder {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            remote: None,
            cache: None,
            context: None,
            strategies: StrategyRegistry::with_builtins(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Use `remote` instead of the HTTP client. Its first response always
    /// seeds the toggle set, whatever `load_toggles_immediately` says.
    pub fn remote_client(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Use `cache` instead of the file backup under the settings' cache dir.
    pub fn local_cache(mut self, cache: Arc<dyn LocalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    /// Add a custom strategy, replacing any built-in of the same name.
    pub fn strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.register(strategy);
        self
    }

    /// How long `stop` waits for each background task.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Load the backup, fetch once if configured, then start the
    /// background tasks. Must be called inside a tokio runtime.
    pub async fn start(self) -> Result<ToggleClient, ClientError> {
        let settings = self.settings;
        settings.validate()?;

        let injected = self.remote.is_some();
        let remote: Arc<dyn RemoteClient> = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpRemoteClient::new(&settings)?),
        };
        let cache: Arc<dyn LocalCache> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(FileCache::from_settings(&settings)),
        };

        let cached = cache.load().await;
        let toggles = Arc::new(ToggleStore::new(cached.flags.unwrap_or_default()));
        if let Ok(seed) = toggles.current() {
            info!(toggles = seed.len(), "seeded toggles from local backup");
        }

        let cancel = CancellationToken::new();
        let fetcher = Arc::new(FetchTogglesTask::new(
            Arc::clone(&remote),
            cache,
            Arc::clone(&toggles),
            cached.change_token,
        ));
        if settings.load_toggles_immediately || injected {
            if let Err(e) = fetcher.fetch_once(&cancel).await {
                warn!(error = %e, "initial toggle fetch failed, continuing with backup");
            }
        }

        let scheduler = TaskScheduler::with_grace(cancel.clone(), self.shutdown_grace);
        scheduler.register(fetcher, settings.fetch_toggles_interval(), true)?;

        let metrics = match settings.send_metrics_interval() {
            Some(interval) => {
                let metrics = Arc::new(MetricsRecorder::new());
                let registration = ClientRegistration {
                    app_name: settings.app_name.clone(),
                    instance_id: settings.instance_tag.clone(),
                    sdk_version: SDK_VERSION.to_string(),
                    strategies: self.strategies.names(),
                    started: Utc::now(),
                    interval: interval.as_millis() as u64,
                };
                scheduler.register(
                    Arc::new(RegisterClientTask::new(Arc::clone(&remote), registration)),
                    Duration::ZERO,
                    true,
                )?;
                scheduler.register(
                    Arc::new(SendMetricsTask::new(
                        remote,
                        Arc::clone(&metrics),
                        settings.app_name.clone(),
                        settings.instance_tag.clone(),
                    )),
                    interval,
                    false,
                )?;
                Some(metrics)
            }
            None => None,
        };

        info!(
            app = %settings.app_name,
            instance = %settings.instance_tag,
            tasks = ?scheduler.task_names(),
            "toggle client started"
        );

        Ok(ToggleClient {
            settings,
            cancel,
            toggles,
            metrics,
            scheduler,
            strategies: self.strategies,
            context: self
                .context
                .unwrap_or_else(|| Arc::new(StaticContextProvider::default())),
            stopped_use_logged: AtomicBool::new(false),
        })
    }
}
