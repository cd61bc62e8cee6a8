use crate::CatalogError;
use crate::EditionRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// The only seam between the queue and the remote catalog.
///
/// Implementations own their retry and timeout policy; callers treat every
/// error as final for the attempt in hand.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn fetch(&self, edition_id: &str) -> Result<EditionRecord, CatalogError>;

    async fn persist(&self, record: &EditionRecord) -> Result<(), CatalogError>;
}

#[async_trait]
impl<G: CatalogGateway + ?Sized> CatalogGateway for Arc<G> {
    async fn fetch(&self, edition_id: &str) -> Result<EditionRecord, CatalogError> {
        (**self).fetch(edition_id).await
    }

    async fn persist(&self, record: &EditionRecord) -> Result<(), CatalogError> {
        (**self).persist(record).await
    }
}
