pub mod chunking;
pub mod composer;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod index;
pub mod ingest;
pub mod library;
pub mod models;
pub mod qa;
pub mod stores;
pub mod traits;

pub use chunking::{split_text, summary_excerpt, ChunkingConfig};
pub use composer::{render_prompt, AnswerComposer, ANSWER_NOT_AVAILABLE};
pub use corpus::{CorpusPassage, CorpusQa};
pub use embeddings::{cosine_similarity, CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    CompositionError, CorpusError, ExtractionError, IndexError, IngestError, ModelError, QaError,
    StoreError,
};
pub use extractor::{HtmlStripper, PageText, PdfExtractor, TextExtractor, WebExtractor};
pub use gemini::{GeminiChatModel, GeminiClient, GeminiEmbedder};
pub use index::{EmbeddingIndex, IndexManifest, IndexRegistry, LoadedIndex};
pub use ingest::{IngestionOutcome, IngestionService, IngestionStage};
pub use library::{DeleteOutcome, Library};
pub use models::{
    DocumentKind, GeneratedMetadata, IngestionOptions, QaEntry, Record, RecordSource,
    RecordStatus, RecordSummary, RetrievedChunk,
};
pub use qa::{QaAnswer, QaService, DEFAULT_TOP_K};
pub use stores::{CollectionNames, MemoryRecordStore, SqliteRecordStore};
pub use traits::{Embedder, LanguageModel, RecordStore};
