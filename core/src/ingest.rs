use backlink_state::WorkItemStore;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing::warn;

/// A request to link one edition to one archive item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRequest {
    pub edition_id: String,
    pub archive_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidLink {
    #[error("edition_id is empty")]
    EmptyEditionId,
    #[error("archive_id is empty")]
    EmptyArchiveId,
    #[error("expected 2 tab-separated columns, found {0}")]
    MissingColumn(usize),
    #[error("unreadable row: {0}")]
    Unreadable(String),
}

impl LinkRequest {
    /// Trim both identifiers and reject blanks.
    pub fn parse(edition_id: &str, archive_id: &str) -> Result<Self, InvalidLink> {
        let edition_id = edition_id.trim();
        let archive_id = archive_id.trim();
        if edition_id.is_empty() {
            return Err(InvalidLink::EmptyEditionId);
        }
        if archive_id.is_empty() {
            return Err(InvalidLink::EmptyArchiveId);
        }
        Ok(Self {
            edition_id: edition_id.to_string(),
            archive_id: archive_id.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based line in the source file.
    pub line: u64,
    pub reason: InvalidLink,
}

/// Result of parsing one TSV drop: the usable rows in file order plus the
/// rows that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsvBatch {
    pub requests: Vec<LinkRequest>,
    pub rejected: Vec<RejectedRow>,
}

/// Parse `edition_id<TAB>archive_id` lines. There is no header row; columns
/// past the second are ignored.
pub fn parse_tsv(content: &[u8]) -> TsvBatch {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(content);

    let mut batch = TsvBatch::default();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let line = err
                    .position()
                    .map_or(index as u64 + 1, csv::Position::line);
                batch.rejected.push(RejectedRow {
                    line,
                    reason: InvalidLink::Unreadable(err.to_string()),
                });
                continue;
            }
        };
        let line = record
            .position()
            .map_or(index as u64 + 1, csv::Position::line);
        let mut fields: Vec<&str> = record.iter().map(str::trim).collect();
        if index == 0
            && let Some(first) = fields.first_mut()
        {
            *first = first.trim_start_matches('\u{feff}');
        }
        if fields.iter().all(|field| field.is_empty()) {
            continue;
        }
        let parsed = match fields.as_slice() {
            [edition_id, archive_id, ..] => LinkRequest::parse(edition_id, archive_id),
            other => Err(InvalidLink::MissingColumn(other.len())),
        };
        match parsed {
            Ok(request) => batch.requests.push(request),
            Err(reason) => batch.rejected.push(RejectedRow { line, reason }),
        }
    }
    batch
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Ids of the inserted items, in source order.
    pub inserted: Vec<i64>,
    pub rejected: Vec<RejectedRow>,
}

/// Insert one pending item per request, in order.
///
/// No deduplication: a pair that is already queued or already linked gets a
/// second row. Rows written before a store error stay written.
pub async fn ingest(
    store: &WorkItemStore,
    requests: &[LinkRequest],
) -> anyhow::Result<Vec<i64>> {
    let mut inserted = Vec::with_capacity(requests.len());
    for request in requests {
        let id = store
            .insert(&request.edition_id, &request.archive_id)
            .await?;
        inserted.push(id);
    }
    if !inserted.is_empty() {
        info!(count = inserted.len(), "queued link requests");
    }
    Ok(inserted)
}

/// Parse a TSV drop and queue its valid rows, logging every skipped row.
pub(crate) async fn ingest_tsv(
    store: &WorkItemStore,
    source: &str,
    content: &[u8],
) -> anyhow::Result<IngestReport> {
    let TsvBatch { requests, rejected } = parse_tsv(content);
    for row in &rejected {
        warn!(source, line = row.line, reason = %row.reason, "skipping malformed row");
    }
    let inserted = ingest(store, &requests).await?;
    Ok(IngestReport { inserted, rejected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlink_state::WorkItemStatus;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn request(edition_id: &str, archive_id: &str) -> LinkRequest {
        LinkRequest {
            edition_id: edition_id.to_string(),
            archive_id: archive_id.to_string(),
        }
    }

    #[test]
    fn parses_rows_and_reports_malformed_ones() {
        let content = b"\xef\xbb\xbfOL13517105M\taliceimspiegella00carrrich\n\
OL24173003M\n\
\n\
OL24755423M\todysseybookiv00home\textra\n\
\tcu31924013200609\n\
OL1M\t  \r\n";

        let batch = parse_tsv(content);

        assert_eq!(
            batch.requests,
            vec![
                request("OL13517105M", "aliceimspiegella00carrrich"),
                request("OL24755423M", "odysseybookiv00home"),
            ]
        );
        assert_eq!(
            batch.rejected,
            vec![
                RejectedRow {
                    line: 2,
                    reason: InvalidLink::MissingColumn(1),
                },
                RejectedRow {
                    line: 5,
                    reason: InvalidLink::EmptyEditionId,
                },
                RejectedRow {
                    line: 6,
                    reason: InvalidLink::EmptyArchiveId,
                },
            ]
        );
    }

    #[test]
    fn quotes_are_plain_characters() {
        let batch = parse_tsv(b"OL1M\t\"quoted\"\n");
        assert_eq!(batch.requests, vec![request("OL1M", "\"quoted\"")]);
    }

    #[tokio::test]
    async fn ingesting_the_same_pair_twice_creates_two_items() {
        let dir = TempDir::new().expect("tempdir");
        let store = WorkItemStore::open(dir.path().join("db.sqlite"))
            .await
            .expect("open store");
        let pair = [request("E1", "A1")];

        let first = ingest(&store, &pair).await.expect("first ingest");
        let second = ingest(&store, &pair).await.expect("second ingest");

        assert_eq!(first, vec![1]);
        assert_eq!(second, vec![2]);
        let pending = store.pending().await.expect("pending");
        assert_eq!(pending.len(), 2);
        assert!(
            pending
                .iter()
                .all(|item| item.status == WorkItemStatus::Pending && item.edition_id == "E1")
        );
    }
}
