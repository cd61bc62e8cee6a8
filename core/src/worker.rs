use crate::FileWatcher;
use crate::PassSummary;
use crate::Reconciler;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

/// Long-running schedule around a [`Reconciler`]: drain leftovers on start,
/// then poll the drop directory and the queue every `poll_interval`.
pub struct ReconcileWorker {
    reconciler: Reconciler,
    watcher: FileWatcher,
    poll_interval: Duration,
}

impl ReconcileWorker {
    pub fn new(reconciler: Reconciler, watcher: FileWatcher, poll_interval: Duration) -> Self {
        Self {
            reconciler,
            watcher,
            poll_interval,
        }
    }

    /// Run on a background task. Cancel through the returned handle.
    pub fn spawn(self) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move { self.run(task_cancel).await });
        WorkerHandle { cancel, join }
    }

    /// Loop until `cancel` fires. Returns early only on a store error.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        self.watcher.ensure_dir().await?;
        let store = self.reconciler.store();
        if store.is_initialized().await? {
            info!(
                db = %store.db_path().display(),
                "checking for pending items left by a previous run"
            );
            self.reconciler.run_pass(&cancel).await?;
        }

        info!(
            watch_dir = %self.watcher.watch_dir().display(),
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "reconcile worker started"
        );
        while !cancel.is_cancelled() {
            self.poll_once(&cancel).await?;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("reconcile worker stopped");
        Ok(())
    }

    /// One cycle: queue at most one dropped file, then work the queue.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> anyhow::Result<PassSummary> {
        let store = self.reconciler.store();
        self.watcher.ingest_next(store).await?;
        let summary = self.reconciler.run_pass(cancel).await?;
        if summary.attempted() > 0 {
            let counts = store.counts().await?;
            info!(
                pending = counts.pending,
                linked = counts.linked,
                already_linked = counts.already_linked,
                failed = counts.failed,
                "queue status"
            );
        }
        Ok(summary)
    }
}

/// Owner side of a spawned [`ReconcileWorker`].
pub struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<anyhow::Result<()>>,
}

impl WorkerHandle {
    /// Ask the worker to stop after the item in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the worker task to end. Call at most once.
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        match (&mut self.join).await {
            Ok(result) => result,
            Err(err) => {
                warn!("reconcile worker task failed: {err}");
                Err(anyhow::anyhow!("reconcile worker task failed: {err}"))
            }
        }
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.cancel();
        self.wait().await
    }
}
