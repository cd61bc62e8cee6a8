use crate::IngestReport;
use crate::ingest::ingest_tsv;
use backlink_state::WorkItemStore;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

pub const INPUT_EXTENSION: &str = "tsv";

/// Polls a drop directory for `*.tsv` files, one file per call.
#[derive(Debug, Clone)]
pub struct FileWatcher {
    watch_dir: PathBuf,
}

impl FileWatcher {
    pub fn new(watch_dir: PathBuf) -> Self {
        Self { watch_dir }
    }

    pub fn watch_dir(&self) -> &Path {
        self.watch_dir.as_path()
    }

    pub async fn ensure_dir(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.watch_dir).await?;
        Ok(())
    }

    /// First `*.tsv` file in directory enumeration order, if any.
    pub async fn next_input_file(&self) -> anyhow::Result<Option<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.watch_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_input = path
                .extension()
                .is_some_and(|extension| extension == INPUT_EXTENSION);
            if is_input && entry.file_type().await?.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Queue the contents of the next dropped file, then delete it.
    ///
    /// A file that cannot be read is left in place and retried next poll. A
    /// file that was queued but cannot be deleted is an error: leaving it
    /// would queue the same rows again on every poll.
    pub async fn ingest_next(
        &self,
        store: &WorkItemStore,
    ) -> anyhow::Result<Option<IngestReport>> {
        let Some(path) = self.next_input_file().await? else {
            return Ok(None);
        };
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) => {
                warn!("failed to read input file {}: {err}", path.display());
                return Ok(None);
            }
        };
        let source = path.display().to_string();
        let report = ingest_tsv(store, &source, &content).await?;
        tokio::fs::remove_file(&path).await.map_err(|err| {
            anyhow::anyhow!("queued {source} but failed to delete it: {err}")
        })?;
        info!(
            source,
            inserted = report.inserted.len(),
            rejected = report.rejected.len(),
            "ingested input file"
        );
        Ok(Some(report))
    }
}
