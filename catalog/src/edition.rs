use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Source-record entry that points an edition at an archive item.
pub fn archive_annotation(archive_id: &str) -> String {
    format!("ia:{archive_id}")
}

/// An edition as stored by the catalog.
///
/// Only the two fields this service writes are typed; everything else is
/// carried through untouched so a write-back does not drop data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditionRecord {
    /// Edition identifier the record was fetched with; not part of the JSON.
    #[serde(skip)]
    pub edition_id: String,
    #[serde(rename = "ocaid", default, skip_serializing_if = "Option::is_none")]
    pub archive_link: Option<String>,
    #[serde(
        rename = "source_records",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_annotations: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EditionRecord {
    pub fn new(edition_id: impl Into<String>) -> Self {
        Self {
            edition_id: edition_id.into(),
            ..Self::default()
        }
    }

    pub fn with_archive_link(mut self, archive_id: impl Into<String>) -> Self {
        self.archive_link = Some(archive_id.into());
        self
    }

    pub fn with_source_annotations<I, S>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_annotations = Some(annotations.into_iter().map(Into::into).collect());
        self
    }

    /// The linked archive id, treating a blank value as unlinked.
    pub fn linked_archive(&self) -> Option<&str> {
        self.archive_link
            .as_deref()
            .map(str::trim)
            .filter(|archive_id| !archive_id.is_empty())
    }

    pub fn has_annotation_for(&self, archive_id: &str) -> bool {
        let wanted = archive_annotation(archive_id);
        self.source_annotations
            .as_ref()
            .is_some_and(|annotations| annotations.iter().any(|entry| entry == &wanted))
    }

    /// Append the archive annotation unless it is already present.
    ///
    /// Returns whether the record changed.
    pub fn add_annotation_for(&mut self, archive_id: &str) -> bool {
        if self.has_annotation_for(archive_id) {
            return false;
        }
        self.source_annotations
            .get_or_insert_with(Vec::new)
            .push(archive_annotation(archive_id));
        true
    }
}
