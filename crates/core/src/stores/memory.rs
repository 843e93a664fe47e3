use crate::error::StoreError;
use crate::models::{DocumentKind, QaEntry, Record, RecordSummary};
use crate::stores::validate_record;
use crate::traits::RecordStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local record store. Used by tests and by the CLI when no database
/// is wanted; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<(DocumentKind, String), Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: &Record) -> Result<(), StoreError> {
        validate_record(record)?;

        let key = (record.kind(), record.id.clone());
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(StoreError::Rejected(format!(
                "{} record {} already exists",
                key.0, key.1
            )));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Record>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&(kind, id.to_string())).cloned())
    }

    async fn list(&self, kind: DocumentKind) -> Result<Vec<RecordSummary>, StoreError> {
        let records = self.records.read().await;
        let mut summaries = records
            .values()
            .filter(|record| record.kind() == kind)
            .map(RecordSummary::from)
            .collect::<Vec<_>>();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }

    async fn title(&self, kind: DocumentKind, id: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(kind, id.to_string()))
            .map(|record| record.name.clone()))
    }

    async fn append_question(
        &self,
        kind: DocumentKind,
        id: &str,
        entry: &QaEntry,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        record.questions.push(entry.clone());
        record.last_activity = record.last_activity.max(entry.timestamp);
        Ok(())
    }

    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        Ok(records.remove(&(kind, id.to_string())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::contract;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_then_read() {
        contract::create_then_read(&MemoryRecordStore::new()).await;
    }

    #[tokio::test]
    async fn rejects_invalid_and_duplicate() {
        contract::rejects_invalid_and_duplicate(&MemoryRecordStore::new()).await;
    }

    #[tokio::test]
    async fn history_is_append_only() {
        contract::history_is_append_only(&MemoryRecordStore::new()).await;
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        contract::concurrent_appends_are_not_lost(Arc::new(MemoryRecordStore::new())).await;
    }

    #[tokio::test]
    async fn list_orders_by_activity() {
        contract::list_orders_by_activity(&MemoryRecordStore::new()).await;
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        contract::delete_reports_presence(&MemoryRecordStore::new()).await;
    }
}
