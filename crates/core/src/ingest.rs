use crate::chunking::{split_text, summary_excerpt, ChunkingConfig};
use crate::composer::AnswerComposer;
use crate::error::{IngestError, Result};
use crate::extractor::{parse_http_url, PdfExtractor, TextExtractor, WebExtractor};
use crate::index::IndexRegistry;
use crate::models::{
    DocumentKind, GeneratedMetadata, IngestionOptions, Record, RecordSource, RecordStatus,
};
use crate::traits::RecordStore;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Steps an ingestion walks through, strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionStage {
    Received,
    Extracted,
    Chunked,
    Indexed,
    Summarized,
    Persisted,
}

impl IngestionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestionStage::Received => "received",
            IngestionStage::Extracted => "extracted",
            IngestionStage::Chunked => "chunked",
            IngestionStage::Indexed => "indexed",
            IngestionStage::Summarized => "summarized",
            IngestionStage::Persisted => "persisted",
        }
    }
}

impl fmt::Display for IngestionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub record: Record,
    pub chunk_count: usize,
}

impl IngestionOutcome {
    pub fn document_id(&self) -> &str {
        &self.record.id
    }
}

/// Drives one source from raw bytes or a URL to an indexed, persisted record.
#[derive(Clone)]
pub struct IngestionService {
    pdf: PdfExtractor,
    web: WebExtractor,
    indexes: IndexRegistry,
    composer: AnswerComposer,
    store: Arc<dyn RecordStore>,
    pdf_options: IngestionOptions,
    url_options: IngestionOptions,
}

impl IngestionService {
    pub fn new(
        web: WebExtractor,
        indexes: IndexRegistry,
        composer: AnswerComposer,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            pdf: PdfExtractor,
            web,
            indexes,
            composer,
            store,
            pdf_options: IngestionOptions::for_kind(DocumentKind::Pdf),
            url_options: IngestionOptions::for_kind(DocumentKind::Url),
        }
    }

    fn options(&self, kind: DocumentKind) -> &IngestionOptions {
        match kind {
            DocumentKind::Pdf => &self.pdf_options,
            DocumentKind::Url => &self.url_options,
        }
    }

    pub async fn ingest_pdf(&self, file_name: &str, bytes: &[u8]) -> Result<IngestionOutcome> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(IngestError::InvalidArgument(
                "pdf upload needs a file name".to_string(),
            ));
        }

        let run = Run::start(DocumentKind::Pdf);
        info!(document_id = %run.document_id, file_name, bytes = bytes.len(), "pdf received");

        let text = self
            .pdf
            .extract(bytes)
            .await
            .map_err(|error| run.failed(IngestionStage::Extracted, error.into()))?;
        run.reached(IngestionStage::Extracted);

        let source = RecordSource::Pdf {
            file_name: file_name.to_string(),
            file_size: bytes.len() as u64,
        };
        self.index_and_persist(run, source, &text, file_name).await
    }

    pub async fn ingest_url(&self, url: &str) -> Result<IngestionOutcome> {
        let url = url.trim();
        let run = Run::start(DocumentKind::Url);
        info!(document_id = %run.document_id, url, "url received");

        let text = self
            .web
            .extract(url)
            .await
            .map_err(|error| run.failed(IngestionStage::Extracted, error.into()))?;
        run.reached(IngestionStage::Extracted);

        let fallback_name = parse_http_url(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        let source = RecordSource::Url {
            url: url.to_string(),
        };
        self.index_and_persist(run, source, &text, &fallback_name).await
    }

    async fn index_and_persist(
        &self,
        run: Run,
        source: RecordSource,
        text: &str,
        fallback_name: &str,
    ) -> Result<IngestionOutcome> {
        let options = self.options(run.kind);
        let config = ChunkingConfig::try_from(options)
            .map_err(|error| run.failed(IngestionStage::Chunked, error))?;

        if text.trim().is_empty() {
            return Err(run.failed(IngestionStage::Chunked, IngestError::EmptyContent));
        }
        let chunks = split_text(text, config);
        if chunks.is_empty() {
            return Err(run.failed(IngestionStage::Chunked, IngestError::EmptyContent));
        }
        debug!(document_id = %run.document_id, chunk_count = chunks.len(), "text chunked");
        run.reached(IngestionStage::Chunked);

        let manifest = self
            .indexes
            .for_kind(run.kind)
            .build(&chunks, &run.document_id)
            .await
            .map_err(|error| run.failed(IngestionStage::Indexed, IngestError::IndexBuild(error)))?;
        run.reached(IngestionStage::Indexed);

        let excerpt = summary_excerpt(
            &chunks,
            options.summary_chunk_count,
            options.summary_char_budget,
        );
        let metadata = self.summarize(&run, &excerpt, fallback_name).await;
        run.reached(IngestionStage::Summarized);

        let now = Utc::now();
        let record = Record {
            id: run.document_id.clone(),
            source,
            status: RecordStatus::Processed,
            name: metadata.name,
            description: metadata.description,
            keywords: metadata.keywords,
            questions: Vec::new(),
            created_at: now,
            last_activity: now,
        };

        if let Err(store_error) = self.store.create(&record).await {
            error!(
                document_id = %run.document_id,
                kind = %run.kind,
                index = %self.indexes.for_kind(run.kind).index_path(&run.document_id).display(),
                "record not persisted, index left on disk"
            );
            return Err(run.failed(
                IngestionStage::Persisted,
                IngestError::Persistence(store_error),
            ));
        }
        run.reached(IngestionStage::Persisted);

        Ok(IngestionOutcome {
            record,
            chunk_count: manifest.chunk_count,
        })
    }

    /// Metadata is best effort; a failed prompt falls back instead of aborting.
    async fn summarize(&self, run: &Run, excerpt: &str, fallback_name: &str) -> GeneratedMetadata {
        let subject = match run.kind {
            DocumentKind::Pdf => ("PDF", "the document"),
            DocumentKind::Url => ("URL content", "the URL content"),
        };

        let name = self
            .describe(
                run,
                "name",
                &format!("Generate a short and meaningful name for this {}.", subject.0),
                excerpt,
            )
            .await
            .map(|name| clean_title(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fallback_name.to_string());

        let description = self
            .describe(
                run,
                "description",
                &format!(
                    "Write a 20-25 word description summarizing {}.",
                    subject.1
                ),
                excerpt,
            )
            .await
            .unwrap_or_default();

        let keywords = match run.kind {
            DocumentKind::Pdf => self
                .describe(
                    run,
                    "keywords",
                    "Give 3-4 important keywords or phrases relevant to the document, separated by commas.",
                    excerpt,
                )
                .await
                .map(|raw| parse_keywords(&raw))
                .unwrap_or_default(),
            DocumentKind::Url => Vec::new(),
        };

        GeneratedMetadata {
            name,
            description,
            keywords,
        }
    }

    async fn describe(
        &self,
        run: &Run,
        field: &str,
        instruction: &str,
        excerpt: &str,
    ) -> Option<String> {
        match self.composer.describe(instruction, excerpt).await {
            Ok(text) => Some(text),
            Err(error) => {
                warn!(document_id = %run.document_id, field, %error, "metadata generation failed, using fallback");
                None
            }
        }
    }
}

/// Identity of one ingestion attempt, minted when the source is received.
struct Run {
    kind: DocumentKind,
    document_id: String,
}

impl Run {
    fn start(kind: DocumentKind) -> Self {
        let run = Self {
            kind,
            document_id: Uuid::new_v4().to_string(),
        };
        run.reached(IngestionStage::Received);
        run
    }

    fn reached(&self, stage: IngestionStage) {
        info!(document_id = %self.document_id, kind = %self.kind, %stage, "ingestion stage reached");
    }

    fn failed(&self, stage: IngestionStage, error: IngestError) -> IngestError {
        error!(document_id = %self.document_id, kind = %self.kind, %stage, %error, "ingestion failed");
        error
    }
}

fn clean_title(raw: &str) -> String {
    raw.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .trim_matches(|c: char| c == '"' || c == '*' || c == '#' || c == '\'')
        .trim()
        .to_string()
}

/// Comma separated model output into trimmed, non-empty keywords.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{ExtractionError, ModelError, StoreError};
    use crate::extractor::tests::pdf_with_pages;
    use crate::models::{QaEntry, RecordSummary};
    use crate::stores::MemoryRecordStore;
    use crate::traits::LanguageModel;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Answers metadata prompts by instruction and counts calls.
    #[derive(Default)]
    struct ScriptedModel {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError> {
            *self.calls.lock().unwrap() += 1;
            let reply = if prompt.contains("meaningful name") {
                "\"Capitals of Europe\""
            } else if prompt.contains("description") {
                "A short note on European capital cities."
            } else if prompt.contains("keywords") {
                "capital, France , , Paris"
            } else {
                "unexpected"
            };
            Ok(reply.to_string())
        }
    }

    struct DownModel;

    #[async_trait]
    impl LanguageModel for DownModel {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, ModelError> {
            Err(ModelError::EmptyResponse)
        }
    }

    struct RejectingStore;

    #[async_trait]
    impl RecordStore for RejectingStore {
        async fn create(&self, record: &Record) -> std::result::Result<(), StoreError> {
            Err(StoreError::Rejected(format!("{} refused", record.id)))
        }

        async fn get(
            &self,
            _kind: DocumentKind,
            _id: &str,
        ) -> std::result::Result<Option<Record>, StoreError> {
            Ok(None)
        }

        async fn list(
            &self,
            _kind: DocumentKind,
        ) -> std::result::Result<Vec<RecordSummary>, StoreError> {
            Ok(Vec::new())
        }

        async fn title(
            &self,
            _kind: DocumentKind,
            _id: &str,
        ) -> std::result::Result<Option<String>, StoreError> {
            Ok(None)
        }

        async fn append_question(
            &self,
            _kind: DocumentKind,
            id: &str,
            _entry: &QaEntry,
        ) -> std::result::Result<(), StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }

        async fn delete(&self, _kind: DocumentKind, _id: &str) -> std::result::Result<bool, StoreError> {
            Ok(false)
        }
    }

    fn service(
        root: &Path,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn RecordStore>,
    ) -> IngestionService {
        let web = WebExtractor::new(Duration::from_secs(2)).expect("client builds");
        let indexes = IndexRegistry::new(root, Arc::new(CharacterNgramEmbedder::default()));
        IngestionService::new(web, indexes, AnswerComposer::new(model), store)
    }

    fn namespace_is_empty(root: &Path, kind: DocumentKind) -> bool {
        std::fs::read_dir(root.join(kind.namespace()))
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn pdf_is_indexed_summarized_and_persisted() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let model = Arc::new(ScriptedModel::default());
        let store = Arc::new(MemoryRecordStore::new());
        let service = service(dir.path(), model.clone(), store.clone());

        let bytes = pdf_with_pages(&["The capital of France is Paris."]);
        let outcome = service.ingest_pdf("capitals.pdf", &bytes).await?;

        assert_eq!(outcome.chunk_count, 1);
        assert_eq!(outcome.record.name, "Capitals of Europe");
        assert_eq!(outcome.record.keywords, vec!["capital", "France", "Paris"]);
        assert_eq!(*model.calls.lock().unwrap(), 3);

        let stored = store
            .get(DocumentKind::Pdf, outcome.document_id())
            .await?
            .expect("record persisted");
        assert_eq!(
            stored.source,
            RecordSource::Pdf {
                file_name: "capitals.pdf".to_string(),
                file_size: bytes.len() as u64,
            }
        );
        assert!(stored.questions.is_empty());

        let index = service.indexes.for_kind(DocumentKind::Pdf);
        assert!(index.exists(outcome.document_id()).await);
        let loaded = index.load(outcome.document_id()).await?;
        let hits = index.search(&loaded, "capital of France", 4).await?;
        assert!(hits[0].text.contains("Paris"));
        Ok(())
    }

    #[tokio::test]
    async fn every_ingestion_mints_a_fresh_id() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let service = service(
            dir.path(),
            Arc::new(ScriptedModel::default()),
            Arc::new(MemoryRecordStore::new()),
        );
        let bytes = pdf_with_pages(&["Same content twice."]);

        let first = service.ingest_pdf("a.pdf", &bytes).await?;
        let second = service.ingest_pdf("a.pdf", &bytes).await?;
        assert_ne!(first.document_id(), second.document_id());
        Ok(())
    }

    #[tokio::test]
    async fn metadata_falls_back_when_the_model_is_down() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = Arc::new(MemoryRecordStore::new());
        let service = service(dir.path(), Arc::new(DownModel), store.clone());

        let bytes = pdf_with_pages(&["Berlin is the capital of Germany."]);
        let outcome = service.ingest_pdf("germany.pdf", &bytes).await?;

        assert_eq!(outcome.record.name, "germany.pdf");
        assert_eq!(outcome.record.description, "");
        assert!(outcome.record.keywords.is_empty());
        assert!(store.get(DocumentKind::Pdf, outcome.document_id()).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn empty_pdf_leaves_no_index_or_record() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let model = Arc::new(ScriptedModel::default());
        let store = Arc::new(MemoryRecordStore::new());
        let service = service(dir.path(), model.clone(), store.clone());

        let bytes = pdf_with_pages(&[" "]);
        let result = service.ingest_pdf("blank.pdf", &bytes).await;

        assert!(matches!(result, Err(IngestError::EmptyContent)));
        assert!(namespace_is_empty(dir.path(), DocumentKind::Pdf));
        assert!(store.list(DocumentKind::Pdf).await?.is_empty());
        assert_eq!(*model.calls.lock().unwrap(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_pdf_is_an_extraction_error() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let service = service(
            dir.path(),
            Arc::new(ScriptedModel::default()),
            Arc::new(MemoryRecordStore::new()),
        );

        let result = service.ingest_pdf("broken.pdf", b"%PDF-1.4\n%broken").await;
        assert!(matches!(
            result,
            Err(IngestError::Extraction(ExtractionError::PdfParse(_)))
        ));
        assert!(namespace_is_empty(dir.path(), DocumentKind::Pdf));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_url_leaves_nothing_behind() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = Arc::new(MemoryRecordStore::new());
        let service = service(dir.path(), Arc::new(ScriptedModel::default()), store.clone());

        let result = service.ingest_url("http://docchat-test.invalid/page").await;

        assert!(matches!(result, Err(IngestError::Extraction(_))));
        assert!(namespace_is_empty(dir.path(), DocumentKind::Url));
        assert!(store.list(DocumentKind::Url).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_record_keeps_the_index() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let service = service(
            dir.path(),
            Arc::new(ScriptedModel::default()),
            Arc::new(RejectingStore),
        );

        let bytes = pdf_with_pages(&["Madrid is the capital of Spain."]);
        let result = service.ingest_pdf("spain.pdf", &bytes).await;

        assert!(matches!(result, Err(IngestError::Persistence(_))));
        assert!(!namespace_is_empty(dir.path(), DocumentKind::Pdf));
        Ok(())
    }

    #[tokio::test]
    async fn blank_file_name_is_rejected_up_front() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let service = service(
            dir.path(),
            Arc::new(ScriptedModel::default()),
            Arc::new(MemoryRecordStore::new()),
        );

        let bytes = pdf_with_pages(&["text"]);
        let result = service.ingest_pdf("  ", &bytes).await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn keywords_are_split_and_trimmed() {
        assert_eq!(
            parse_keywords(" law, contract ,,  tort "),
            vec!["law", "contract", "tort"]
        );
        assert!(parse_keywords(" , ").is_empty());
    }

    #[test]
    fn titles_lose_quotes_and_markdown() {
        assert_eq!(clean_title("**\"Capitals\"**\nextra"), "Capitals");
        assert_eq!(clean_title("\n\n  Plain  "), "Plain");
    }
}
