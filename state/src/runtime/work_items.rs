use super::*;

impl WorkItemStore {
    /// Append a new pending item and return its id.
    ///
    /// Each call is its own transaction: a crash part way through a batch
    /// keeps every row inserted before it.
    pub async fn insert(&self, edition_id: &str, archive_id: &str) -> anyhow::Result<i64> {
        let _guard = self.write_lock.lock().await;
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
INSERT INTO work_items (edition_id, archive_id, status)
VALUES (?, ?, ?)
            "#,
        )
        .bind(edition_id)
        .bind(archive_id)
        .bind(WorkItemStatus::Pending.code())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    /// Snapshot of every pending item, oldest first.
    pub async fn pending(&self) -> anyhow::Result<Vec<WorkItem>> {
        if !self.is_initialized().await? {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, WorkItemRow>(
            r#"
SELECT id, edition_id, archive_id, status
FROM work_items
WHERE status = ?
ORDER BY id ASC
            "#,
        )
        .bind(WorkItemStatus::Pending.code())
        .fetch_all(self.pool.as_ref())
        .await?;
        items_from_rows(rows)
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<WorkItem>> {
        if !self.is_initialized().await? {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, WorkItemRow>(
            r#"
SELECT id, edition_id, archive_id, status
FROM work_items
WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;
        row.map(WorkItem::try_from).transpose()
    }

    /// Move a pending item to a terminal status.
    ///
    /// Returns `false` when the item does not exist or has already left
    /// `Pending`; terminal rows are never rewritten.
    pub async fn set_status(&self, id: i64, status: WorkItemStatus) -> anyhow::Result<bool> {
        if !status.is_terminal() {
            anyhow::bail!("work item {id} cannot be moved back to {status}");
        }
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
UPDATE work_items
SET status = ?
WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.code())
        .bind(id)
        .bind(WorkItemStatus::Pending.code())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
