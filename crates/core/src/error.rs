use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch of {url} returned {status}")]
    FetchStatus { url: String, status: u16 },

    #[error("extraction task failed: {0}")]
    Task(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model returned no usable content")]
    EmptyResponse,

    #[error("embedding count {returned} doesn't match input count {expected}")]
    CountMismatch { expected: usize, returned: usize },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index build failed: {0}")]
    Build(String),

    #[error("no index for document {0}")]
    NotFound(String),

    #[error("index for document {document_id} is corrupt: {details}")]
    Corrupt {
        document_id: String,
        details: String,
    },

    #[error("index for document {document_id} was built with {built_with}, configured embedder is {configured}")]
    ModelMismatch {
        document_id: String,
        built_with: String,
        configured: String,
    },

    #[error("embedding error: {0}")]
    Embedding(#[from] ModelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("generative model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("generative model returned an empty answer")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record rejected: {0}")]
    Rejected(String),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("source produced no text to index")]
    EmptyContent,

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("index build failed: {0}")]
    IndexBuild(#[source] IndexError),

    #[error("record persistence failed: {0}")]
    Persistence(#[source] StoreError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error("no indexed document {0}")]
    IndexNotFound(String),

    #[error("question is empty")]
    EmptyQuestion,

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("answer composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("record update failed: {0}")]
    Store(#[from] StoreError),
}

impl From<IndexError> for QaError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::NotFound(document_id) => QaError::IndexNotFound(document_id),
            other => QaError::Index(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus directory {0} holds no passages")]
    Empty(String),

    #[error("corpus file {path} is invalid: {details}")]
    InvalidPassage { path: String, details: String },

    #[error("question is empty")]
    EmptyQuestion,

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walkdir error: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
