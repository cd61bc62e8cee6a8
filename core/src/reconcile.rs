use backlink_catalog::CatalogGateway;
use backlink_catalog::EditionRecord;
use backlink_state::WorkItem;
use backlink_state::WorkItemStatus;
use backlink_state::WorkItemStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

/// What to do with a fetched edition for a given archive id.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkDecision {
    /// The edition already points at a different archive item. Leave it.
    Conflict { existing: String },
    /// Already linked to this archive item with the annotation in place.
    UpToDate,
    /// Write this record back.
    Write(EditionRecord),
}

/// Decide whether `record` may be linked to `archive_id`, and apply the
/// link and the source annotation to the record when it may.
pub fn decide(mut record: EditionRecord, archive_id: &str) -> LinkDecision {
    let existing = record.linked_archive().map(str::to_string);
    match existing {
        Some(existing) if existing != archive_id => LinkDecision::Conflict { existing },
        Some(_) => {
            if record.add_annotation_for(archive_id) {
                LinkDecision::Write(record)
            } else {
                LinkDecision::UpToDate
            }
        }
        None => {
            record.archive_link = Some(archive_id.to_string());
            record.add_annotation_for(archive_id);
            LinkDecision::Write(record)
        }
    }
}

/// Outcome counts for one pass over the pending items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub linked: usize,
    pub already_linked: usize,
    pub failed: usize,
    /// Items left pending because shutdown was requested.
    pub skipped: usize,
}

impl PassSummary {
    pub fn attempted(&self) -> usize {
        self.linked + self.already_linked + self.failed
    }

    fn record(&mut self, status: WorkItemStatus) {
        match status {
            WorkItemStatus::Linked => self.linked += 1,
            WorkItemStatus::AlreadyLinked => self.already_linked += 1,
            WorkItemStatus::Failed => self.failed += 1,
            WorkItemStatus::Pending => {}
        }
    }
}

/// Drives pending items to a terminal status, strictly one at a time.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<WorkItemStore>,
    gateway: Arc<dyn CatalogGateway>,
    item_delay: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<WorkItemStore>,
        gateway: Arc<dyn CatalogGateway>,
        item_delay: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            item_delay,
        }
    }

    pub fn store(&self) -> &Arc<WorkItemStore> {
        &self.store
    }

    /// Attempt one item and commit its terminal status.
    ///
    /// Catalog failures end up in the status; only store errors are returned.
    pub async fn reconcile_item(&self, item: &WorkItem) -> anyhow::Result<WorkItemStatus> {
        let status = self.attempt(item).await;
        if !self.store.set_status(item.id, status).await? {
            warn!(
                item_id = item.id,
                status = %status,
                "item already left pending; stored status kept"
            );
        }
        Ok(status)
    }

    async fn attempt(&self, item: &WorkItem) -> WorkItemStatus {
        let record = match self.gateway.fetch(&item.edition_id).await {
            Ok(record) => record,
            Err(err) if err.is_not_found() => {
                info!(
                    item_id = item.id,
                    edition_id = %item.edition_id,
                    "edition does not exist in the catalog"
                );
                return WorkItemStatus::Failed;
            }
            Err(err) => {
                warn!(
                    item_id = item.id,
                    edition_id = %item.edition_id,
                    "failed to fetch edition: {err}"
                );
                return WorkItemStatus::Failed;
            }
        };

        match decide(record, &item.archive_id) {
            LinkDecision::Conflict { existing } => {
                info!(
                    item_id = item.id,
                    edition_id = %item.edition_id,
                    archive_id = %item.archive_id,
                    existing = %existing,
                    "edition already linked to another archive item"
                );
                WorkItemStatus::AlreadyLinked
            }
            LinkDecision::UpToDate => {
                info!(
                    item_id = item.id,
                    edition_id = %item.edition_id,
                    archive_id = %item.archive_id,
                    "edition already carries this link"
                );
                WorkItemStatus::Linked
            }
            LinkDecision::Write(record) => match self.gateway.persist(&record).await {
                Ok(()) => {
                    info!(
                        item_id = item.id,
                        edition_id = %item.edition_id,
                        archive_id = %item.archive_id,
                        "linked edition"
                    );
                    WorkItemStatus::Linked
                }
                Err(err) => {
                    warn!(
                        item_id = item.id,
                        edition_id = %item.edition_id,
                        "failed to save edition: {err}"
                    );
                    WorkItemStatus::Failed
                }
            },
        }
    }

    /// Take a snapshot of the pending items and attempt each in order,
    /// pausing `item_delay` between attempts.
    ///
    /// Cancellation is honoured between items only; an attempt that has
    /// started always records its status.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> anyhow::Result<PassSummary> {
        let items = self.store.pending().await?;
        let mut summary = PassSummary::default();
        for (index, item) in items.iter().enumerate() {
            let proceed = if index == 0 {
                !cancel.is_cancelled()
            } else {
                self.pace(cancel).await
            };
            if !proceed {
                summary.skipped = items.len() - index;
                info!(
                    remaining = summary.skipped,
                    "shutdown requested; leaving remaining items pending"
                );
                break;
            }
            let status = self.reconcile_item(item).await?;
            summary.record(status);
        }
        if summary.attempted() > 0 {
            info!(
                linked = summary.linked,
                already_linked = summary.already_linked,
                failed = summary.failed,
                "reconciliation pass finished"
            );
        }
        Ok(summary)
    }

    /// Sleep for the inter-item delay. Returns `false` if cancelled first.
    async fn pace(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if self.item_delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.item_delay) => true,
        }
    }
}
