use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Url,
}

impl DocumentKind {
    /// Directory under the index root that holds this kind's indexes.
    pub fn namespace(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Url => "url",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "url" => Ok(DocumentKind::Url),
            other => Err(format!("unknown document kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Processed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Processed => "processed",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "processed" => Ok(RecordStatus::Processed),
            other => Err(format!("unknown record status: {other}")),
        }
    }
}

/// Kind-specific part of a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordSource {
    Pdf { file_name: String, file_size: u64 },
    Url { url: String },
}

impl RecordSource {
    pub fn kind(&self) -> DocumentKind {
        match self {
            RecordSource::Pdf { .. } => DocumentKind::Pdf,
            RecordSource::Url { .. } => DocumentKind::Url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl QaEntry {
    pub fn now(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub source: RecordSource,
    pub status: RecordStatus,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub questions: Vec<QaEntry>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Record {
    pub fn kind(&self) -> DocumentKind {
        self.source.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordSummary {
    pub id: String,
    pub source: RecordSource,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub last_activity: DateTime<Utc>,
}

impl From<&Record> for RecordSummary {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            source: record.source.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            keywords: record.keywords.clone(),
            last_activity: record.last_activity,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratedMetadata {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub summary_chunk_count: usize,
    pub summary_char_budget: usize,
}

impl IngestionOptions {
    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Pdf => Self {
                chunk_max_chars: 100_000,
                chunk_overlap_chars: 1_000,
                ..Self::default()
            },
            DocumentKind::Url => Self::default(),
        }
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 10_000,
            chunk_overlap_chars: 1_000,
            summary_chunk_count: 3,
            summary_char_budget: 3_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("PDF".parse::<DocumentKind>(), Ok(DocumentKind::Pdf));
        assert_eq!(" url ".parse::<DocumentKind>(), Ok(DocumentKind::Url));
        assert!("docx".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn namespaces_do_not_collide() {
        assert_ne!(
            DocumentKind::Pdf.namespace(),
            DocumentKind::Url.namespace()
        );
    }

    #[test]
    fn pdf_options_use_larger_chunks() {
        let pdf = IngestionOptions::for_kind(DocumentKind::Pdf);
        let url = IngestionOptions::for_kind(DocumentKind::Url);
        assert!(pdf.chunk_max_chars > url.chunk_max_chars);
        assert_eq!(pdf.summary_char_budget, 3_000);
    }
}
