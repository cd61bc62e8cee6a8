mod work_item;

pub use work_item::QueueCounts;
pub use work_item::WorkItem;
pub use work_item::WorkItemStatus;

pub(crate) use work_item::WorkItemRow;
