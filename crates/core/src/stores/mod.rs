pub mod memory;
pub mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::{connect, CollectionNames, SqliteRecordStore};

use crate::error::StoreError;
use crate::index::is_valid_document_id;
use crate::models::{Record, RecordSource};

/// Required-field checks shared by every store before a record is written.
pub(crate) fn validate_record(record: &Record) -> Result<(), StoreError> {
    if !is_valid_document_id(&record.id) {
        return Err(StoreError::Rejected(format!(
            "invalid record id: {:?}",
            record.id
        )));
    }

    match &record.source {
        RecordSource::Pdf { file_name, .. } if file_name.trim().is_empty() => Err(
            StoreError::Rejected("pdf record requires a file name".to_string()),
        ),
        RecordSource::Url { url } if url.trim().is_empty() => Err(StoreError::Rejected(
            "url record requires a url".to_string(),
        )),
        _ => Ok(()),
    }
}
