use crate::QueueCounts;
use crate::WORK_ITEMS_TABLE;
use crate::WorkItem;
use crate::WorkItemStatus;
use crate::model::WorkItemRow;
use log::LevelFilter;
use sqlx::ConnectOptions;
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::sqlite::SqliteSynchronous;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

mod work_items;
// Insert, query and status transitions live in `runtime/work_items.rs`.

/// Durable queue of work items, shared by the HTTP path and the worker.
///
/// Cloning is cheap; all clones share the pool and the write lock, so every
/// mutation in the process is serialized through one place.
#[derive(Clone)]
pub struct WorkItemStore {
    db_path: PathBuf,
    pool: Arc<SqlitePool>,
    write_lock: Arc<Mutex<()>>,
    schema_ready: Arc<AtomicBool>,
}

impl WorkItemStore {
    /// Open (or create) the SQLite database at `db_path`.
    ///
    /// The `work_items` table is not created here; it appears on the first
    /// insert, which is what [`WorkItemStore::is_initialized`] reports on.
    pub async fn open(db_path: PathBuf) -> anyhow::Result<Arc<Self>> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let pool = match open_sqlite(&db_path).await {
            Ok(pool) => Arc::new(pool),
            Err(err) => {
                warn!("failed to open work item db at {}: {err}", db_path.display());
                return Err(err);
            }
        };
        let store = Arc::new(Self {
            db_path,
            pool,
            write_lock: Arc::new(Mutex::new(())),
            schema_ready: Arc::new(AtomicBool::new(false)),
        });
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Whether the backing table exists yet.
    ///
    /// A store that was never written to cannot hold pending work, so callers
    /// use this to skip the cold-start sweep.
    pub async fn is_initialized(&self) -> anyhow::Result<bool> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(true);
        }
        let tables: i64 = sqlx::query_scalar(
            r#"
SELECT COUNT(*)
FROM sqlite_master
WHERE type = 'table' AND name = ?
            "#,
        )
        .bind(WORK_ITEMS_TABLE)
        .fetch_one(self.pool.as_ref())
        .await?;
        let initialized = tables > 0;
        if initialized {
            self.schema_ready.store(true, Ordering::Release);
        }
        Ok(initialized)
    }

    /// Create the table and its indexes if they are missing.
    ///
    /// Must be called with the write lock held.
    async fn ensure_schema(&self) -> anyhow::Result<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
CREATE TABLE IF NOT EXISTS work_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    edition_id TEXT NOT NULL,
    archive_id TEXT NOT NULL,
    status INTEGER NOT NULL
)
            "#,
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_work_items_id ON work_items(id)")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.schema_ready.store(true, Ordering::Release);
        debug!(db = %self.db_path.display(), "work item schema ready");
        Ok(())
    }

    /// Per-status totals; all zero for an uninitialized store.
    pub async fn counts(&self) -> anyhow::Result<QueueCounts> {
        if !self.is_initialized().await? {
            return Ok(QueueCounts::default());
        }
        let row = sqlx::query(
            r#"
SELECT
    COUNT(*) AS total,
    SUM(CASE WHEN status = ? THEN 1 ELSE 0 END) AS pending,
    SUM(CASE WHEN status = ? THEN 1 ELSE 0 END) AS linked,
    SUM(CASE WHEN status = ? THEN 1 ELSE 0 END) AS already_linked,
    SUM(CASE WHEN status = ? THEN 1 ELSE 0 END) AS failed
FROM work_items
            "#,
        )
        .bind(WorkItemStatus::Pending.code())
        .bind(WorkItemStatus::Linked.code())
        .bind(WorkItemStatus::AlreadyLinked.code())
        .bind(WorkItemStatus::Failed.code())
        .fetch_one(self.pool.as_ref())
        .await?;

        let total: i64 = row.try_get("total")?;
        let pending: Option<i64> = row.try_get("pending")?;
        let linked: Option<i64> = row.try_get("linked")?;
        let already_linked: Option<i64> = row.try_get("already_linked")?;
        let failed: Option<i64> = row.try_get("failed")?;
        Ok(QueueCounts {
            total: u64::try_from(total).unwrap_or_default(),
            pending: u64::try_from(pending.unwrap_or_default()).unwrap_or_default(),
            linked: u64::try_from(linked.unwrap_or_default()).unwrap_or_default(),
            already_linked: u64::try_from(already_linked.unwrap_or_default())
                .unwrap_or_default(),
            failed: u64::try_from(failed.unwrap_or_default()).unwrap_or_default(),
        })
    }
}

async fn open_sqlite(path: &Path) -> anyhow::Result<SqlitePool> {
    // FULL so a status change survives power loss before the worker moves on.
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(60))
        .log_statements(LevelFilter::Off);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

fn items_from_rows(rows: Vec<WorkItemRow>) -> anyhow::Result<Vec<WorkItem>> {
    rows.into_iter().map(WorkItem::try_from).collect()
}
