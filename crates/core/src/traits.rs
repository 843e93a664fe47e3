use crate::error::{ModelError, StoreError};
use crate::models::{DocumentKind, QaEntry, Record, RecordSummary};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

/// Records keyed by `(kind, id)`. Every kind shares this contract; only the
/// [`crate::models::RecordSource`] payload differs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: &Record) -> Result<(), StoreError>;

    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Record>, StoreError>;

    /// Most recently active first.
    async fn list(&self, kind: DocumentKind) -> Result<Vec<RecordSummary>, StoreError>;

    async fn title(&self, kind: DocumentKind, id: &str) -> Result<Option<String>, StoreError>;

    /// Appends to the Q&A history and bumps `last_activity` as one atomic
    /// push; concurrent appends must never lose an entry.
    async fn append_question(
        &self,
        kind: DocumentKind,
        id: &str,
        entry: &QaEntry,
    ) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<bool, StoreError>;
}
