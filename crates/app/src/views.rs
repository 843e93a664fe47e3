//! JSON shapes served by the HTTP API.

use chrono::{DateTime, Utc};
use docchat_core::{QaEntry, Record, RecordSource, RecordSummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AskPdfRequest {
    pub chat_id: Option<String>,
    pub question: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessUrlRequest {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskUrlRequest {
    pub url_id: Option<String>,
    pub question: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskAiRequest {
    pub question: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub chat_id: String,
    pub file_info: FileInfo,
}

#[derive(Debug, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessUrlResponse {
    pub message: &'static str,
    pub url_id: String,
    pub url_info: UrlInfo,
}

#[derive(Debug, Serialize)]
pub struct UrlInfo {
    pub url: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct AskAiResponse {
    pub error: bool,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct TitleResponse {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    pub index_removed: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PdfChat {
    pub chat_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub upload_date: DateTime<Utc>,
    pub status: &'static str,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub questions: Vec<QaEntry>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UrlChat {
    pub url_id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: &'static str,
    pub name: String,
    pub description: String,
    pub questions: Vec<QaEntry>,
}

#[derive(Debug, Serialize)]
pub struct PdfChatSummary {
    pub chat_id: String,
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UrlChatSummary {
    pub url_id: String,
    pub url: String,
    pub name: String,
    pub description: String,
    pub last_activity: DateTime<Utc>,
}

/// A stored record rendered for its kind.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatView {
    Pdf(PdfChat),
    Url(UrlChat),
}

impl From<Record> for ChatView {
    fn from(record: Record) -> Self {
        let status = record.status.as_str();
        match record.source {
            RecordSource::Pdf {
                file_name,
                file_size,
            } => ChatView::Pdf(PdfChat {
                chat_id: record.id,
                file_name,
                file_size,
                upload_date: record.created_at,
                status,
                name: record.name,
                description: record.description,
                keywords: record.keywords,
                questions: record.questions,
                last_activity: record.last_activity,
            }),
            RecordSource::Url { url } => ChatView::Url(UrlChat {
                url_id: record.id,
                url,
                created_at: record.created_at,
                last_activity: record.last_activity,
                status,
                name: record.name,
                description: record.description,
                questions: record.questions,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ChatSummaryView {
    Pdf(PdfChatSummary),
    Url(UrlChatSummary),
}

impl From<RecordSummary> for ChatSummaryView {
    fn from(summary: RecordSummary) -> Self {
        match summary.source {
            RecordSource::Pdf { .. } => ChatSummaryView::Pdf(PdfChatSummary {
                chat_id: summary.id,
                name: summary.name,
                description: summary.description,
                keywords: summary.keywords,
                last_activity: summary.last_activity,
            }),
            RecordSource::Url { url } => ChatSummaryView::Url(UrlChatSummary {
                url_id: summary.id,
                url,
                name: summary.name,
                description: summary.description,
                last_activity: summary.last_activity,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::RecordStatus;
    use serde_json::json;

    fn record(source: RecordSource) -> Record {
        let at = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");
        Record {
            id: "abc".to_string(),
            source,
            status: RecordStatus::Processed,
            name: "Title".to_string(),
            description: "About".to_string(),
            keywords: vec!["k".to_string()],
            questions: Vec::new(),
            created_at: at,
            last_activity: at,
        }
    }

    #[test]
    fn pdf_records_use_chat_field_names() {
        let view = ChatView::from(record(RecordSource::Pdf {
            file_name: "a.pdf".to_string(),
            file_size: 12,
        }));
        let value = serde_json::to_value(view).expect("serializes");

        assert_eq!(value["chat_id"], json!("abc"));
        assert_eq!(value["file_name"], json!("a.pdf"));
        assert_eq!(value["status"], json!("processed"));
        assert_eq!(value["upload_date"], json!("2023-11-14T22:13:20Z"));
        assert!(value.get("url_id").is_none());
    }

    #[test]
    fn url_summaries_carry_the_url() {
        let summary = RecordSummary::from(&record(RecordSource::Url {
            url: "https://example.com".to_string(),
        }));
        let value = serde_json::to_value(ChatSummaryView::from(summary)).expect("serializes");

        assert_eq!(value["url_id"], json!("abc"));
        assert_eq!(value["url"], json!("https://example.com"));
        assert!(value.get("keywords").is_none());
    }
}
