use crate::error::StoreError;
use crate::index::IndexRegistry;
use crate::models::{DocumentKind, Record, RecordSummary};
use crate::traits::RecordStore;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// False when the index was already gone or could not be removed.
    pub index_removed: bool,
}

/// Read access to stored records plus the record-then-index delete.
#[derive(Clone)]
pub struct Library {
    indexes: IndexRegistry,
    store: Arc<dyn RecordStore>,
}

impl Library {
    pub fn new(indexes: IndexRegistry, store: Arc<dyn RecordStore>) -> Self {
        Self { indexes, store }
    }

    pub async fn list(&self, kind: DocumentKind) -> Result<Vec<RecordSummary>, StoreError> {
        self.store.list(kind).await
    }

    pub async fn get(&self, kind: DocumentKind, id: &str) -> Result<Record, StoreError> {
        self.store
            .get(kind, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn title(&self, kind: DocumentKind, id: &str) -> Result<String, StoreError> {
        self.store
            .title(kind, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Removes the record, then tries to remove its index.
    ///
    /// The record removal is authoritative. An index that cannot be removed
    /// stays on disk as an orphan and is reported through `index_removed`
    /// and a warning; the record is not restored.
    pub async fn delete(&self, kind: DocumentKind, id: &str) -> Result<DeleteOutcome, StoreError> {
        if !self.store.delete(kind, id).await? {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let index_removed = match self.indexes.for_kind(kind).delete(id).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(%kind, document_id = id, "record deleted but no index was on disk");
                false
            }
            Err(error) => {
                warn!(%kind, document_id = id, %error, "record deleted but index removal failed");
                false
            }
        };

        info!(%kind, document_id = id, index_removed, "document deleted");
        Ok(DeleteOutcome { index_removed })
    }
}
