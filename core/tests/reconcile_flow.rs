use async_trait::async_trait;
use backlink_catalog::CatalogError;
use backlink_catalog::CatalogGateway;
use backlink_catalog::EditionRecord;
use backlink_core::FileWatcher;
use backlink_core::LinkRequest;
use backlink_core::PassSummary;
use backlink_core::ReconcileWorker;
use backlink_core::Reconciler;
use backlink_core::ingest;
use backlink_state::WorkItem;
use backlink_state::WorkItemStatus;
use backlink_state::WorkItemStore;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// In-memory catalog that records every call.
#[derive(Default)]
struct FakeCatalog {
    editions: Mutex<HashMap<String, EditionRecord>>,
    unreachable: HashSet<String>,
    reject_writes: HashSet<String>,
    fetches: Mutex<Vec<String>>,
    fetched_at: Mutex<Vec<Instant>>,
    persisted: Mutex<Vec<EditionRecord>>,
    /// Cancelled as soon as the first fetch happens.
    cancel_on_fetch: Option<CancellationToken>,
}

impl FakeCatalog {
    fn with_edition(self, record: EditionRecord) -> Self {
        self.editions
            .lock()
            .unwrap()
            .insert(record.edition_id.clone(), record);
        self
    }

    fn edition(&self, edition_id: &str) -> EditionRecord {
        self.editions.lock().unwrap()[edition_id].clone()
    }

    fn persisted_ids(&self) -> Vec<String> {
        self.persisted
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.edition_id.clone())
            .collect()
    }
}

#[async_trait]
impl CatalogGateway for FakeCatalog {
    async fn fetch(&self, edition_id: &str) -> Result<EditionRecord, CatalogError> {
        self.fetches.lock().unwrap().push(edition_id.to_string());
        self.fetched_at.lock().unwrap().push(Instant::now());
        if let Some(cancel) = &self.cancel_on_fetch {
            cancel.cancel();
        }
        if self.unreachable.contains(edition_id) {
            return Err(CatalogError::Network("connection refused".to_string()));
        }
        self.editions
            .lock()
            .unwrap()
            .get(edition_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(edition_id.to_string()))
    }

    async fn persist(&self, record: &EditionRecord) -> Result<(), CatalogError> {
        if self.reject_writes.contains(&record.edition_id) {
            return Err(CatalogError::Unauthorized("read-only account".to_string()));
        }
        self.persisted.lock().unwrap().push(record.clone());
        self.editions
            .lock()
            .unwrap()
            .insert(record.edition_id.clone(), record.clone());
        Ok(())
    }
}

fn request(edition_id: &str, archive_id: &str) -> LinkRequest {
    LinkRequest::parse(edition_id, archive_id).expect("valid request")
}

async fn open_store(dir: &TempDir) -> Arc<WorkItemStore> {
    WorkItemStore::open(dir.path().join("files").join("backlinks.sqlite"))
        .await
        .expect("open store")
}

fn reconciler(store: &Arc<WorkItemStore>, catalog: &Arc<FakeCatalog>) -> Reconciler {
    Reconciler::new(store.clone(), catalog.clone(), Duration::ZERO)
}

async fn statuses(store: &WorkItemStore, ids: &[i64]) -> Vec<WorkItemStatus> {
    let mut statuses = Vec::new();
    for id in ids {
        let item = store.get(*id).await.expect("get item").expect("item exists");
        statuses.push(item.status);
    }
    statuses
}

#[tokio::test]
async fn cold_store_links_free_edition_and_skips_conflicting_one() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir).await;
    assert!(!store.is_initialized().await.expect("check init"));

    let ids = ingest(&store, &[request("E1", "A1"), request("E2", "A2")])
        .await
        .expect("ingest");
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(
        store.pending().await.expect("pending"),
        vec![
            WorkItem {
                id: 1,
                edition_id: "E1".to_string(),
                archive_id: "A1".to_string(),
                status: WorkItemStatus::Pending,
            },
            WorkItem {
                id: 2,
                edition_id: "E2".to_string(),
                archive_id: "A2".to_string(),
                status: WorkItemStatus::Pending,
            },
        ]
    );

    let catalog = Arc::new(
        FakeCatalog::default()
            .with_edition(EditionRecord::new("E1"))
            .with_edition(EditionRecord::new("E2").with_archive_link("OTHER")),
    );
    let summary = reconciler(&store, &catalog)
        .run_pass(&CancellationToken::new())
        .await
        .expect("run pass");

    assert_eq!(
        summary,
        PassSummary {
            linked: 1,
            already_linked: 1,
            failed: 0,
            skipped: 0,
        }
    );
    assert_eq!(
        statuses(&store, &ids).await,
        vec![WorkItemStatus::Linked, WorkItemStatus::AlreadyLinked]
    );
    assert_eq!(catalog.persisted_ids(), vec!["E1".to_string()]);
    let linked = catalog.edition("E1");
    assert_eq!(linked.archive_link.as_deref(), Some("A1"));
    assert_eq!(linked.source_annotations, Some(vec!["ia:A1".to_string()]));
    assert_eq!(catalog.edition("E2").archive_link.as_deref(), Some("OTHER"));
}

#[tokio::test]
async fn a_failed_lookup_does_not_block_the_next_item() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir).await;
    let ids = ingest(
        &store,
        &[
            request("UNREACHABLE", "A0"),
            request("MISSING", "A1"),
            request("READONLY", "A2"),
            request("E3", "A3"),
        ],
    )
    .await
    .expect("ingest");

    let catalog = Arc::new(FakeCatalog {
        unreachable: HashSet::from(["UNREACHABLE".to_string()]),
        reject_writes: HashSet::from(["READONLY".to_string()]),
        ..FakeCatalog::default()
    }
    .with_edition(EditionRecord::new("READONLY"))
    .with_edition(EditionRecord::new("E3").with_source_annotations(["ia:A3"])));

    let summary = reconciler(&store, &catalog)
        .run_pass(&CancellationToken::new())
        .await
        .expect("run pass");

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.linked, 1);
    assert_eq!(
        statuses(&store, &ids).await,
        vec![
            WorkItemStatus::Failed,
            WorkItemStatus::Failed,
            WorkItemStatus::Failed,
            WorkItemStatus::Linked,
        ]
    );
    // The annotation was already there, so it is not appended twice.
    assert_eq!(
        catalog.edition("E3").source_annotations,
        Some(vec!["ia:A3".to_string()])
    );
}

#[tokio::test]
async fn terminal_items_are_never_selected_again() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir).await;
    ingest(&store, &[request("E1", "A1"), request("MISSING", "A2")])
        .await
        .expect("ingest");
    let catalog = Arc::new(FakeCatalog::default().with_edition(EditionRecord::new("E1")));
    let reconciler = reconciler(&store, &catalog);

    reconciler
        .run_pass(&CancellationToken::new())
        .await
        .expect("first pass");
    // The edition shows up later; the failed item must stay failed.
    catalog
        .editions
        .lock()
        .unwrap()
        .insert("MISSING".to_string(), EditionRecord::new("MISSING"));
    let second = reconciler
        .run_pass(&CancellationToken::new())
        .await
        .expect("second pass");

    assert_eq!(second, PassSummary::default());
    assert_eq!(
        *catalog.fetches.lock().unwrap(),
        vec!["E1".to_string(), "MISSING".to_string()]
    );
    assert_eq!(catalog.persisted_ids(), vec!["E1".to_string()]);
}

#[tokio::test]
async fn duplicate_requests_are_both_reconciled_without_a_second_write() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir).await;
    let ids = ingest(&store, &[request("E1", "A1"), request("E1", "A1")])
        .await
        .expect("ingest");
    let catalog = Arc::new(FakeCatalog::default().with_edition(EditionRecord::new("E1")));

    reconciler(&store, &catalog)
        .run_pass(&CancellationToken::new())
        .await
        .expect("run pass");

    assert_eq!(
        statuses(&store, &ids).await,
        vec![WorkItemStatus::Linked, WorkItemStatus::Linked]
    );
    assert_eq!(catalog.persisted_ids(), vec!["E1".to_string()]);
}

#[tokio::test]
async fn cancellation_lets_the_item_in_flight_finish() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir).await;
    let ids = ingest(&store, &[request("E1", "A1"), request("E2", "A2")])
        .await
        .expect("ingest");
    let cancel = CancellationToken::new();
    let catalog = Arc::new(
        FakeCatalog {
            cancel_on_fetch: Some(cancel.clone()),
            ..FakeCatalog::default()
        }
        .with_edition(EditionRecord::new("E1"))
        .with_edition(EditionRecord::new("E2")),
    );

    let summary = Reconciler::new(store.clone(), catalog.clone(), Duration::from_secs(3600))
        .run_pass(&cancel)
        .await
        .expect("run pass");

    assert_eq!(summary.linked, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        statuses(&store, &ids).await,
        vec![WorkItemStatus::Linked, WorkItemStatus::Pending]
    );
}

#[tokio::test]
async fn items_are_paced_even_after_a_failed_lookup() {
    let delay = Duration::from_millis(300);
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir).await;
    ingest(
        &store,
        &[
            request("MISSING", "A0"),
            request("E1", "A1"),
            request("E2", "A2"),
        ],
    )
    .await
    .expect("ingest");
    let catalog = Arc::new(
        FakeCatalog::default()
            .with_edition(EditionRecord::new("E1"))
            .with_edition(EditionRecord::new("E2")),
    );

    let started = Instant::now();
    let summary = Reconciler::new(store.clone(), catalog.clone(), delay)
        .run_pass(&CancellationToken::new())
        .await
        .expect("run pass");
    let finished = Instant::now();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.linked, 2);
    let fetched_at = catalog.fetched_at.lock().unwrap().clone();
    assert_eq!(fetched_at.len(), 3);
    for pair in fetched_at.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= delay, "items {gap:?} apart, expected at least {delay:?}");
    }
    assert!(
        fetched_at[0] - started < delay,
        "first item should start without a pause"
    );
    assert!(
        finished - fetched_at[2] < delay,
        "pass should end without pausing after the last item"
    );
}

#[tokio::test]
async fn worker_drains_leftovers_then_picks_up_dropped_files() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir).await;
    ingest(&store, &[request("LEFTOVER", "A0")])
        .await
        .expect("seed leftover item");
    let watch_dir = dir.path().join("watch");

    let catalog = Arc::new(
        FakeCatalog::default()
            .with_edition(EditionRecord::new("LEFTOVER"))
            .with_edition(EditionRecord::new("OL1M"))
            .with_edition(EditionRecord::new("OL2M").with_archive_link("elsewhere")),
    );
    let worker = ReconcileWorker::new(
        reconciler(&store, &catalog),
        FileWatcher::new(watch_dir.clone()),
        Duration::from_millis(20),
    );
    let handle = worker.spawn();

    // The worker creates the drop directory on start.
    let mut attempts = 0;
    while !watch_dir.exists() {
        attempts += 1;
        assert!(attempts < 200, "watch dir never created");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let staged = dir.path().join("batch.partial");
    std::fs::write(&staged, "OL1M\ta1\nOL2M\ta2\n").expect("stage file");
    std::fs::rename(&staged, watch_dir.join("batch.tsv")).expect("drop file");

    let mut attempts = 0;
    loop {
        let counts = store.counts().await.expect("counts");
        if counts.total == 3 && counts.pending == 0 {
            assert_eq!(counts.linked, 2);
            assert_eq!(counts.already_linked, 1);
            break;
        }
        attempts += 1;
        assert!(attempts < 500, "worker never finished: {counts:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.shutdown().await.expect("worker stops cleanly");
    assert!(!watch_dir.join("batch.tsv").exists());
    assert_eq!(
        catalog.persisted_ids(),
        vec!["LEFTOVER".to_string(), "OL1M".to_string()]
    );
}
