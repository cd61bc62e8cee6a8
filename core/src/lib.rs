//! Queue-and-reconcile core of the backlink bot.
//!
//! Link requests arrive from dropped TSV files ([`FileWatcher`]) or the HTTP
//! endpoint, become pending rows through [`ingest`], and are driven to a
//! terminal status one at a time by the [`Reconciler`]. [`ReconcileWorker`]
//! owns the long-running schedule.

mod ingest;
mod reconcile;
mod watcher;
mod worker;

pub use ingest::IngestReport;
pub use ingest::InvalidLink;
pub use ingest::LinkRequest;
pub use ingest::RejectedRow;
pub use ingest::TsvBatch;
pub use ingest::ingest;
pub use ingest::parse_tsv;
pub use reconcile::LinkDecision;
pub use reconcile::PassSummary;
pub use reconcile::Reconciler;
pub use reconcile::decide;
pub use watcher::FileWatcher;
pub use watcher::INPUT_EXTENSION;
pub use worker::ReconcileWorker;
pub use worker::WorkerHandle;
