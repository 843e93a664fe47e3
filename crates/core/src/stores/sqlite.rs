//! SQLite-backed [`RecordStore`].
//!
//! Both document kinds share one `records` table, partitioned by a collection
//! name; Q&A history lives in `record_questions` so an append is a single
//! insert instead of a read-modify-write of the whole record.

use crate::error::StoreError;
use crate::models::{DocumentKind, QaEntry, Record, RecordSource, RecordStatus, RecordSummary};
use crate::stores::validate_record;
use crate::traits::RecordStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_PDF_COLLECTION: &str = "chats";
pub const DEFAULT_URL_COLLECTION: &str = "url_chats";

/// Collection name per document kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub pdf: String,
    pub url: String,
}

impl CollectionNames {
    pub fn new(pdf: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            pdf: pdf.into(),
            url: url.into(),
        }
    }

    pub fn for_kind(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Pdf => &self.pdf,
            DocumentKind::Url => &self.url,
        }
    }
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self::new(DEFAULT_PDF_COLLECTION, DEFAULT_URL_COLLECTION)
    }
}

pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub struct SqliteRecordStore {
    pool: SqlitePool,
    collections: CollectionNames,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool, collections: CollectionNames) -> Self {
        Self { pool, collections }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                status TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                keywords_json TEXT NOT NULL,
                source_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS record_questions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                record_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                asked_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_activity ON records (collection, last_activity)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_record_questions_record ON record_questions (collection, record_id, seq)",
        )
        .execute(&self.pool)
        .await?;

        debug!(
            pdf = %self.collections.pdf,
            url = %self.collections.url,
            "record store schema ready"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, record: &Record) -> Result<(), StoreError> {
        validate_record(record)?;
        let collection = self.collections.for_kind(record.kind());

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO records (collection, id, status, name, description,
                                 keywords_json, source_json, created_at, last_activity)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(&record.id)
        .bind(record.status.as_str())
        .bind(&record.name)
        .bind(&record.description)
        .bind(serde_json::to_string(&record.keywords)?)
        .bind(serde_json::to_string(&record.source)?)
        .bind(record.created_at.timestamp_millis())
        .bind(record.last_activity.timestamp_millis())
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            return Err(match error {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Rejected(
                    format!("{} record {} already exists", collection, record.id),
                ),
                other => StoreError::Database(other),
            });
        }

        for entry in &record.questions {
            insert_question(&mut tx, collection, &record.id, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Record>, StoreError> {
        let collection = self.collections.for_kind(kind);

        let row = sqlx::query(
            r#"
            SELECT id, status, name, description, keywords_json, source_json,
                   created_at, last_activity
            FROM records
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let question_rows = sqlx::query(
            r#"
            SELECT question, answer, asked_at
            FROM record_questions
            WHERE collection = ? AND record_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let questions = question_rows
            .iter()
            .map(|row| -> Result<QaEntry, StoreError> {
                Ok(QaEntry {
                    question: row.try_get("question")?,
                    answer: row.try_get("answer")?,
                    timestamp: millis_to_datetime(row.try_get("asked_at")?)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let summary = summary_from_row(&row)?;
        let status: String = row.try_get("status")?;
        Ok(Some(Record {
            id: summary.id,
            source: summary.source,
            status: RecordStatus::from_str(&status).map_err(StoreError::Corrupt)?,
            name: summary.name,
            description: summary.description,
            keywords: summary.keywords,
            questions,
            created_at: millis_to_datetime(row.try_get("created_at")?)?,
            last_activity: summary.last_activity,
        }))
    }

    async fn list(&self, kind: DocumentKind) -> Result<Vec<RecordSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, keywords_json, source_json, last_activity
            FROM records
            WHERE collection = ?
            ORDER BY last_activity DESC, id ASC
            "#,
        )
        .bind(self.collections.for_kind(kind))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn title(&self, kind: DocumentKind, id: &str) -> Result<Option<String>, StoreError> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT name FROM records WHERE collection = ? AND id = ?",
        )
        .bind(self.collections.for_kind(kind))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }

    async fn append_question(
        &self,
        kind: DocumentKind,
        id: &str,
        entry: &QaEntry,
    ) -> Result<(), StoreError> {
        let collection = self.collections.for_kind(kind);
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction takes the write lock up front.
        let touched = sqlx::query(
            r#"
            UPDATE records
            SET last_activity = MAX(last_activity, ?)
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(entry.timestamp.timestamp_millis())
        .bind(collection)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if touched.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        insert_question(&mut tx, collection, id, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<bool, StoreError> {
        let collection = self.collections.for_kind(kind);
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM record_questions WHERE collection = ? AND record_id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(removed.rows_affected() > 0)
    }
}

async fn insert_question(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    collection: &str,
    record_id: &str,
    entry: &QaEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO record_questions (collection, record_id, question, answer, asked_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(collection)
    .bind(record_id)
    .bind(&entry.question)
    .bind(&entry.answer)
    .bind(entry.timestamp.timestamp_millis())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn summary_from_row(row: &SqliteRow) -> Result<RecordSummary, StoreError> {
    let keywords_json: String = row.try_get("keywords_json")?;
    let source_json: String = row.try_get("source_json")?;
    let source: RecordSource = serde_json::from_str(&source_json)?;

    Ok(RecordSummary {
        id: row.try_get("id")?,
        source,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        keywords: serde_json::from_str(&keywords_json)?,
        last_activity: millis_to_datetime(row.try_get("last_activity")?)?,
    })
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {millis}")))
}
