//! Continuous reconciliation loop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use discord_reconciler::{Context, ObjectMeta, RoleSpec};
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::driver::{Controller, PassOutcome};
use crate::error::{Error, Result};
use crate::provider::ProviderConnector;
use crate::store::StoredRecord;

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Interval between reconciliation ticks.
    pub interval: Duration,
    /// Maximum consecutive failed ticks before stopping.
    pub max_errors: usize,
    /// Records reconciled at the same time.
    pub max_concurrent: usize,
    /// Deadline for one record's pass.
    pub operation_timeout: Duration,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&ControllerConfig::default())
    }
}

impl From<&ControllerConfig> for LoopConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_errors: config.max_consecutive_errors,
            max_concurrent: config.max_concurrent.max(1),
            operation_timeout: config.operation_timeout,
            backoff_base_ms: config.backoff_base_ms,
            backoff_max_ms: config.backoff_max_ms,
        }
    }
}

/// Calculate exponential backoff duration.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(backoff.min(max_ms))
}

/// Retry bookkeeping for one record file.
#[derive(Debug, Clone)]
struct Backoff {
    attempts: u32,
    not_before: Instant,
    /// Set after a terminal error: skip until the record's desired state changes.
    parked: Option<(ObjectMeta, RoleSpec)>,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Records reconciled this tick.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records skipped because their backoff has not elapsed.
    pub deferred: usize,
    /// Records skipped after a terminal error.
    pub parked: usize,
}

impl TickSummary {
    /// Every record was reconciled and nothing failed.
    pub const fn converged(&self) -> bool {
        self.failed == 0 && self.deferred == 0 && self.parked == 0
    }
}

/// Continuous reconciliation loop.
///
/// Every tick loads all manifests, reconciles the records whose backoff has
/// elapsed (bounded by `max_concurrent`) and writes them back. Ticks run one
/// after another, so a record never has two passes in flight.
pub struct ReconciliationLoop {
    controller: Arc<Controller>,
    config: LoopConfig,
    backoff: Mutex<HashMap<PathBuf, Backoff>>,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    pub fn new(controller: Arc<Controller>, config: LoopConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            controller,
            config,
            backoff: Mutex::new(HashMap::new()),
            stop_rx,
            stop_tx,
        }
    }

    /// Run the reconciliation loop.
    ///
    /// This runs until stopped or max errors reached.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            interval_ms = self.config.interval.as_millis(),
            max_concurrent = self.config.max_concurrent,
            "Starting reconciliation loop"
        );

        let mut consecutive_errors = 0usize;
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.reconcile_once().await {
                        Ok(summary) => {
                            consecutive_errors = 0;
                            if summary.converged() {
                                debug!(records = summary.attempted, "All records converged");
                            }
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            error!(
                                error = %e,
                                consecutive = consecutive_errors,
                                "Reconciliation error"
                            );

                            if consecutive_errors >= self.config.max_errors {
                                error!("Max errors reached, stopping loop");
                                return Err(Error::LoopFailed {
                                    reason: format!(
                                        "{consecutive_errors} consecutive failed ticks, last: {e}"
                                    ),
                                });
                            }
                        }
                    }
                }
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        info!("Reconciliation loop stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run a single reconciliation tick.
    ///
    /// Fails only when the manifest directory cannot be loaded. Per-record
    /// failures are counted in the summary and retried with backoff.
    pub async fn reconcile_once(&self) -> Result<TickSummary> {
        let snapshot = self.controller.store().load().await?;
        let connector = self.controller.connector(&snapshot);
        let mut summary = TickSummary::default();

        let due = {
            let now = Instant::now();
            let mut backoff = self.backoff.lock().await;
            backoff.retain(|path, _| snapshot.records.iter().any(|r| &r.path == path));

            let mut due = Vec::new();
            for record in snapshot.records {
                match backoff.get(&record.path) {
                    Some(state) if state.parked.is_some() => {
                        if state.parked == desired_state(&record) {
                            summary.parked += 1;
                            continue;
                        }
                        debug!(path = %record.path.display(), "Parked record changed, retrying");
                    }
                    Some(state) if state.not_before > now => {
                        summary.deferred += 1;
                        continue;
                    }
                    _ => {}
                }
                due.push(record);
            }
            due
        };

        summary.attempted = due.len();
        let results: Vec<_> = stream::iter(due)
            .map(|record| self.process(&connector, record))
            .buffer_unordered(self.config.max_concurrent)
            .collect()
            .await;

        let mut backoff = self.backoff.lock().await;
        for (path, parked, result) in results {
            match result {
                Ok(_) => {
                    summary.succeeded += 1;
                    backoff.remove(&path);
                }
                Err(e) if e.is_terminal() => {
                    summary.failed += 1;
                    warn!(path = %path.display(), error = %e, "Terminal error, not retrying until the record changes");
                    backoff.insert(
                        path,
                        Backoff {
                            attempts: 0,
                            not_before: Instant::now(),
                            parked,
                        },
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    let attempts = backoff.get(&path).map_or(0, |state| state.attempts);
                    let delay = calculate_backoff(
                        attempts,
                        self.config.backoff_base_ms,
                        self.config.backoff_max_ms,
                    );
                    warn!(
                        path = %path.display(),
                        error = %e,
                        attempt = attempts + 1,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconcile failed, backing off"
                    );
                    backoff.insert(
                        path,
                        Backoff {
                            attempts: attempts.saturating_add(1),
                            not_before: Instant::now() + delay,
                            parked: None,
                        },
                    );
                }
            }
        }

        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            deferred = summary.deferred,
            parked = summary.parked,
            "Reconciliation tick complete"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        connector: &ProviderConnector,
        record: StoredRecord,
    ) -> (PathBuf, Option<(ObjectMeta, RoleSpec)>, Result<PassOutcome>) {
        let path = record.path.clone();
        let desired = desired_state(&record);
        let ctx = Context::background()
            .with_cancellation(self.stop_rx.clone())
            .with_timeout(self.config.operation_timeout);

        let result = self.controller.sync(&ctx, connector, record).await;
        (path, desired, result)
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

fn desired_state(record: &StoredRecord) -> Option<(ObjectMeta, RoleSpec)> {
    record
        .object
        .as_role()
        .map(|role| (role.metadata.clone(), role.spec.clone()))
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop. Passes in flight are cancelled.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ClientFactory;
    use crate::store::{ManifestStore, controller_registry};
    use discord_reconciler::memory::CallKind;
    use discord_reconciler::{InMemoryRoleClient, Role, RoleClient, RoleParameters};
    use std::path::Path;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    const GUILD: &str = "100";

    const PROVIDER: &str = r"
apiVersion: discord.crossplane.io/v1alpha1
kind: ProviderConfig
metadata:
  name: default
spec:
  credentials:
    source: Environment
    env:
      name: DISCORD_TOKEN
";

    fn fast_config() -> LoopConfig {
        LoopConfig {
            interval: Duration::from_millis(10),
            max_errors: 2,
            max_concurrent: 2,
            operation_timeout: Duration::from_secs(5),
            backoff_base_ms: 60_000,
            backoff_max_ms: 600_000,
        }
    }

    fn setup(dir: &Path, client: &Arc<InMemoryRoleClient>) -> ReconciliationLoop {
        let client: Arc<dyn RoleClient> = client.clone();
        let factory: Arc<dyn ClientFactory> =
            Arc::new(move |_: &str| Ok::<_, String>(client.clone()));
        let controller = Controller::new(ManifestStore::new(dir, controller_registry()), factory)
            .with_env_lookup(Arc::new(|key: &str| {
                (key == "DISCORD_TOKEN").then(|| "abc".to_string())
            }));
        ReconciliationLoop::new(Arc::new(controller), fast_config())
    }

    fn write_role(dir: &Path, file: &str, role: &Role) -> TestResult {
        std::fs::write(dir.join(file), serde_yaml::to_string(role)?)?;
        Ok(())
    }

    // ===== Behavior-Driven Tests =====

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(calculate_backoff(0, 100, 1_000), Duration::from_millis(100));
        assert_eq!(calculate_backoff(3, 100, 1_000), Duration::from_millis(800));
        assert_eq!(calculate_backoff(4, 100, 1_000), Duration::from_millis(1_000));
        assert_eq!(calculate_backoff(u32::MAX, 100, 1_000), Duration::from_millis(1_000));
    }

    /// Given three new roles and max_concurrent of two
    /// When two ticks run
    /// Then all roles are created on the first and nothing changes on the second
    #[tokio::test]
    async fn ticks_converge_all_records() -> TestResult {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("provider.yaml"), PROVIDER)?;
        for name in ["admin", "mods", "bots"] {
            write_role(
                dir.path(),
                &format!("{name}.yaml"),
                &Role::new(name, RoleParameters::new(GUILD, name)),
            )?;
        }
        let client = Arc::new(InMemoryRoleClient::new());
        let runner = setup(dir.path(), &client);

        let first = runner.reconcile_once().await?;
        let second = runner.reconcile_once().await?;

        assert_eq!(first.attempted, 3);
        assert_eq!(first.succeeded, 3);
        assert!(second.converged());
        assert_eq!(client.count(CallKind::Create).await, 3);
        assert_eq!(client.roles(GUILD).await.len(), 3);
        Ok(())
    }

    /// Given a record whose pass fails with a retryable error
    /// When the next tick runs before the backoff elapses
    /// Then the record is deferred and no remote call is made
    #[tokio::test]
    async fn failed_record_is_deferred() -> TestResult {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("provider.yaml"), PROVIDER)?;
        let client = Arc::new(InMemoryRoleClient::new());
        let id = client.seed(GUILD, "Admin", |_| {}).await;
        write_role(
            dir.path(),
            "admin.yaml",
            &Role::new("admin", RoleParameters::new(GUILD, "Admin")).with_external_name(id),
        )?;
        client.fail(CallKind::Get, "502 Bad Gateway").await;
        let runner = setup(dir.path(), &client);

        let first = runner.reconcile_once().await?;
        let second = runner.reconcile_once().await?;

        assert_eq!(first.failed, 1);
        assert_eq!(second.deferred, 1);
        assert_eq!(second.attempted, 0);
        assert_eq!(client.count(CallKind::Get).await, 1);
        Ok(())
    }

    /// Given a record with an invalid spec
    /// When ticks run
    /// Then it is parked until the manifest changes
    #[tokio::test]
    async fn terminal_errors_park_until_record_changes() -> TestResult {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("provider.yaml"), PROVIDER)?;
        write_role(
            dir.path(),
            "admin.yaml",
            &Role::new(
                "admin",
                RoleParameters::new(GUILD, "Admin").with_permissions("ADMINISTRATOR"),
            ),
        )?;
        let client = Arc::new(InMemoryRoleClient::new());
        let runner = setup(dir.path(), &client);

        let first = runner.reconcile_once().await?;
        let second = runner.reconcile_once().await?;
        write_role(
            dir.path(),
            "admin.yaml",
            &Role::new("admin", RoleParameters::new(GUILD, "Admin").with_permissions("8")),
        )?;
        let third = runner.reconcile_once().await?;

        assert_eq!(first.failed, 1);
        assert_eq!(second.parked, 1);
        assert_eq!(third.succeeded, 1);
        assert_eq!(client.count(CallKind::Create).await, 1);
        Ok(())
    }

    /// Given a loop that is running
    /// When stop() is called
    /// Then the loop should exit gracefully
    #[tokio::test]
    async fn stop_signal_terminates_loop() -> TestResult {
        let dir = tempfile::tempdir()?;
        let client = Arc::new(InMemoryRoleClient::new());
        let mut runner = setup(dir.path(), &client);
        let stopper = runner.stopper();

        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await?;
        assert!(matches!(result, Ok(Ok(()))));
        Ok(())
    }

    /// Given a manifest directory that does not exist
    /// When the loop runs
    /// Then it gives up after max_errors failed ticks
    #[tokio::test]
    async fn missing_directory_stops_after_max_errors() -> TestResult {
        let client = Arc::new(InMemoryRoleClient::new());
        let mut runner = setup(Path::new("/nonexistent/manifests"), &client);

        let result = tokio::time::timeout(Duration::from_secs(2), runner.run()).await?;

        assert!(matches!(result, Err(Error::LoopFailed { .. })));
        Ok(())
    }
}
