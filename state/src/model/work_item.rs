use anyhow::Result;
use serde::Serialize;

/// Outcome of a work item. Only `Pending` is non-terminal.
///
/// The integer codes are the on-disk representation and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Waiting for a reconciliation attempt.
    Pending,
    /// The archive id was written to the edition by this service.
    Linked,
    /// The edition already pointed at a different archive id; nothing was written.
    AlreadyLinked,
    /// The edition could not be fetched or the write-back was rejected.
    Failed,
}

impl WorkItemStatus {
    pub const fn code(self) -> i64 {
        match self {
            WorkItemStatus::Pending => 0,
            WorkItemStatus::Linked => 1,
            WorkItemStatus::AlreadyLinked => 2,
            WorkItemStatus::Failed => 3,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Linked),
            2 => Ok(Self::AlreadyLinked),
            3 => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("invalid work item status code: {code}")),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::Linked => "linked",
            WorkItemStatus::AlreadyLinked => "already_linked",
            WorkItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, WorkItemStatus::Pending)
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: i64,
    pub edition_id: String,
    pub archive_id: String,
    pub status: WorkItemStatus,
}

/// Number of stored items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub total: u64,
    pub pending: u64,
    pub linked: u64,
    pub already_linked: u64,
    pub failed: u64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct WorkItemRow {
    pub(crate) id: i64,
    pub(crate) edition_id: String,
    pub(crate) archive_id: String,
    pub(crate) status: i64,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = anyhow::Error;

    fn try_from(value: WorkItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            edition_id: value.edition_id,
            archive_id: value.archive_id,
            status: WorkItemStatus::from_code(value.status)?,
        })
    }
}
