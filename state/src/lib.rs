//! SQLite-backed queue of edition/archive link requests.
//!
//! Every requested link becomes one row in `work_items`. Rows are only ever
//! appended; the status column moves once, from pending to one of the
//! terminal outcomes, and the row is kept afterwards as a record of what was
//! done.

mod model;
mod runtime;

pub use model::QueueCounts;
pub use model::WorkItem;
pub use model::WorkItemStatus;
/// Preferred entrypoint: owns the connection pool and the lazily created schema.
pub use runtime::WorkItemStore;

/// Name of the table holding the work items.
pub const WORK_ITEMS_TABLE: &str = "work_items";
