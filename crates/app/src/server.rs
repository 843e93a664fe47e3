//! HTTP surface: one route per operation, JSON in and out.
//!
//! | Route | Operation |
//! |-------|-----------|
//! | `POST /upload` | ingest a PDF (multipart field `pdf`) |
//! | `POST /ask` | question about a PDF chat |
//! | `POST /process_url` | ingest a web page |
//! | `POST /ask_question` | question about a URL chat |
//! | `POST /askai` | question against the legal corpus |
//! | `GET/DELETE /api/chats/...` | PDF chat records |
//! | `GET/DELETE /api/url-chat/...`, `GET /api/urls` | URL chat records |
//! | `GET /health` | liveness |
//!
//! Every failure is answered with `{"error": "..."}`.

use crate::views::{
    AnswerResponse, AskAiRequest, AskAiResponse, AskPdfRequest, AskUrlRequest, ChatSummaryView,
    ChatView, DeleteResponse, FileInfo, HealthResponse, ProcessUrlRequest, ProcessUrlResponse,
    TitleResponse, UploadResponse, UrlInfo,
};
use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docchat_core::{
    AnswerComposer, CorpusError, CorpusQa, DocumentKind, IndexRegistry, IngestError,
    IngestionService, LanguageModel, Library, QaAnswer, QaError, QaService, RecordSource,
    RecordStore, StoreError, WebExtractor,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Default request body cap; larger uploads are answered with 413.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const NO_RELEVANT_CONTENT: &str = "No relevant content found";

/// Services shared by every request. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    ingestion: Arc<IngestionService>,
    qa: Arc<QaService>,
    library: Arc<Library>,
    corpus: Option<Arc<CorpusQa>>,
    upload_limit: usize,
}

impl AppState {
    pub fn new(ingestion: IngestionService, qa: QaService, library: Library) -> Self {
        Self {
            ingestion: Arc::new(ingestion),
            qa: Arc::new(qa),
            library: Arc::new(library),
            corpus: None,
            upload_limit: MAX_UPLOAD_BYTES,
        }
    }

    /// Wires the services around one index registry, model and store.
    pub fn assemble(
        indexes: IndexRegistry,
        web: WebExtractor,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn RecordStore>,
        top_k: usize,
    ) -> Self {
        let composer = AnswerComposer::new(model);
        Self::new(
            IngestionService::new(web, indexes.clone(), composer.clone(), store.clone()),
            QaService::new(indexes.clone(), composer, store.clone()).with_top_k(top_k),
            Library::new(indexes, store),
        )
    }

    pub fn with_corpus(mut self, corpus: CorpusQa) -> Self {
        self.corpus = Some(Arc::new(corpus));
        self
    }

    pub fn with_upload_limit(mut self, bytes: usize) -> Self {
        self.upload_limit = bytes;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let upload_limit = state.upload_limit;

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/ask", post(handle_ask_pdf))
        .route("/process_url", post(handle_process_url))
        .route("/ask_question", post(handle_ask_url))
        .route("/askai", post(handle_ask_ai))
        .route("/api/chats", get(handle_list_pdf))
        .route(
            "/api/chats/{id}",
            get(handle_get_pdf).delete(handle_delete_pdf),
        )
        .route("/api/chats/{id}/title", get(handle_title_pdf))
        .route("/api/urls", get(handle_list_url))
        .route(
            "/api/url-chat/{id}",
            get(handle_get_url).delete(handle_delete_url),
        )
        .route("/api/url-chat/{id}/title", get(handle_title_url))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves until ctrl-c.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!(%address, "docchat listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!(%error, "failed to listen for shutdown signal");
            }
        })
        .await
}

// ============ Errors ============

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        AppError {
            status: error.status(),
            message: error.body_text(),
        }
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    let message = message.into();
    error!(%message, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message,
    }
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: message.into(),
    }
}

fn not_found_message(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Pdf => "Chat not found",
        DocumentKind::Url => "URL chat not found",
    }
}

fn classify_ingest_error(error: IngestError) -> AppError {
    match error {
        IngestError::Extraction(_) | IngestError::EmptyContent | IngestError::InvalidArgument(_) => {
            bad_request(error.to_string())
        }
        other => internal(other.to_string()),
    }
}

fn classify_qa_error(kind: DocumentKind, error: QaError) -> AppError {
    match error {
        QaError::IndexNotFound(_) | QaError::Store(StoreError::NotFound(_)) => {
            not_found(not_found_message(kind))
        }
        QaError::EmptyQuestion => bad_request(error.to_string()),
        other => internal(other.to_string()),
    }
}

fn classify_store_error(kind: DocumentKind, error: StoreError) -> AppError {
    match error {
        StoreError::NotFound(_) => not_found(not_found_message(kind)),
        other => internal(other.to_string()),
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// ============ Ingestion ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("pdf") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(bad_request("No file uploaded"));
    };
    if file_name.trim().is_empty() {
        return Err(bad_request("No file selected"));
    }

    let outcome = state
        .ingestion
        .ingest_pdf(&file_name, &bytes)
        .await
        .map_err(classify_ingest_error)?;

    let record = outcome.record;
    let (name, size) = match record.source {
        RecordSource::Pdf {
            file_name,
            file_size,
        } => (file_name, file_size),
        RecordSource::Url { url } => (url, 0),
    };

    Ok(Json(UploadResponse {
        message: "PDF processed successfully",
        chat_id: record.id,
        file_info: FileInfo {
            name,
            size,
            title: record.name,
            description: record.description,
            keywords: record.keywords,
        },
    }))
}

async fn handle_process_url(
    State(state): State<AppState>,
    payload: Result<Json<ProcessUrlRequest>, JsonRejection>,
) -> Result<Json<ProcessUrlResponse>, AppError> {
    let request = json_body(payload)?;
    let url = required(request.url).ok_or_else(|| bad_request("Missing url"))?;

    let outcome = state
        .ingestion
        .ingest_url(&url)
        .await
        .map_err(classify_ingest_error)?;

    let record = outcome.record;
    Ok(Json(ProcessUrlResponse {
        message: "URL processed successfully",
        url_id: record.id,
        url_info: UrlInfo {
            url,
            title: record.name,
            description: record.description,
        },
    }))
}

// ============ Question answering ============

async fn answer(
    state: &AppState,
    kind: DocumentKind,
    document_id: &str,
    question: &str,
) -> Result<Response, AppError> {
    let answer = state
        .qa
        .answer(kind, document_id, question)
        .await
        .map_err(|error| classify_qa_error(kind, error))?;

    Ok(match answer {
        QaAnswer::Answered(answer) => Json(AnswerResponse { answer }).into_response(),
        QaAnswer::NoRelevantContent => {
            (StatusCode::OK, Json(json!({ "error": NO_RELEVANT_CONTENT }))).into_response()
        }
    })
}

async fn handle_ask_pdf(
    State(state): State<AppState>,
    payload: Result<Json<AskPdfRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let (Some(chat_id), Some(question)) = (required(request.chat_id), required(request.question))
    else {
        return Err(bad_request("Missing chat_id or question"));
    };
    answer(&state, DocumentKind::Pdf, &chat_id, &question).await
}

async fn handle_ask_url(
    State(state): State<AppState>,
    payload: Result<Json<AskUrlRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;
    let (Some(url_id), Some(question)) = (required(request.url_id), required(request.question))
    else {
        return Err(bad_request("Missing url_id or question"));
    };
    answer(&state, DocumentKind::Url, &url_id, &question).await
}

async fn handle_ask_ai(
    State(state): State<AppState>,
    payload: Result<Json<AskAiRequest>, JsonRejection>,
) -> Result<Json<AskAiResponse>, AppError> {
    let request = json_body(payload)?;
    let question = required(request.question).ok_or_else(|| bad_request("Missing question"))?;
    let corpus = state
        .corpus
        .as_ref()
        .ok_or_else(|| unavailable("Legal corpus is not configured"))?;

    let data = corpus.answer(&question).await.map_err(|error| match error {
        CorpusError::EmptyQuestion => bad_request(error.to_string()),
        other => internal(other.to_string()),
    })?;

    Ok(Json(AskAiResponse { error: false, data }))
}

// ============ Records ============

async fn list(state: &AppState, kind: DocumentKind) -> Result<Json<Vec<ChatSummaryView>>, AppError> {
    let summaries = state
        .library
        .list(kind)
        .await
        .map_err(|error| classify_store_error(kind, error))?;
    Ok(Json(summaries.into_iter().map(ChatSummaryView::from).collect()))
}

async fn get_record(state: &AppState, kind: DocumentKind, id: &str) -> Result<Json<ChatView>, AppError> {
    let record = state
        .library
        .get(kind, id)
        .await
        .map_err(|error| classify_store_error(kind, error))?;
    Ok(Json(ChatView::from(record)))
}

async fn title(state: &AppState, kind: DocumentKind, id: &str) -> Result<Json<TitleResponse>, AppError> {
    let name = state
        .library
        .title(kind, id)
        .await
        .map_err(|error| classify_store_error(kind, error))?;
    Ok(Json(TitleResponse { name }))
}

async fn delete(state: &AppState, kind: DocumentKind, id: &str) -> Result<Json<DeleteResponse>, AppError> {
    let outcome = state
        .library
        .delete(kind, id)
        .await
        .map_err(|error| classify_store_error(kind, error))?;
    Ok(Json(DeleteResponse {
        message: "Chat deleted successfully",
        index_removed: outcome.index_removed,
    }))
}

async fn handle_list_pdf(State(state): State<AppState>) -> Result<Json<Vec<ChatSummaryView>>, AppError> {
    list(&state, DocumentKind::Pdf).await
}

async fn handle_list_url(State(state): State<AppState>) -> Result<Json<Vec<ChatSummaryView>>, AppError> {
    list(&state, DocumentKind::Url).await
}

async fn handle_get_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatView>, AppError> {
    get_record(&state, DocumentKind::Pdf, &id).await
}

async fn handle_get_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatView>, AppError> {
    get_record(&state, DocumentKind::Url, &id).await
}

async fn handle_title_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TitleResponse>, AppError> {
    title(&state, DocumentKind::Pdf, &id).await
}

async fn handle_title_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TitleResponse>, AppError> {
    title(&state, DocumentKind::Url, &id).await
}

async fn handle_delete_pdf(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    delete(&state, DocumentKind::Pdf, &id).await
}

async fn handle_delete_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    delete(&state, DocumentKind::Url, &id).await
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
