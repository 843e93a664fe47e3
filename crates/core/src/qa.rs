use crate::composer::AnswerComposer;
use crate::error::QaError;
use crate::index::IndexRegistry;
use crate::models::{DocumentKind, QaEntry};
use crate::traits::RecordStore;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaAnswer {
    Answered(String),
    /// Retrieval came back empty; the model was not called and history is untouched.
    NoRelevantContent,
}

/// Answers questions against one ingested document. Holds no per-call state.
#[derive(Clone)]
pub struct QaService {
    indexes: IndexRegistry,
    composer: AnswerComposer,
    store: Arc<dyn RecordStore>,
    top_k: usize,
}

impl QaService {
    pub fn new(indexes: IndexRegistry, composer: AnswerComposer, store: Arc<dyn RecordStore>) -> Self {
        Self {
            indexes,
            composer,
            store,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub async fn answer(
        &self,
        kind: DocumentKind,
        document_id: &str,
        question: &str,
    ) -> Result<QaAnswer, QaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::EmptyQuestion);
        }

        let index = self.indexes.for_kind(kind);
        let loaded = index.load(document_id).await?;
        let hits = index.search(&loaded, question, self.top_k).await?;
        if hits.is_empty() {
            debug!(%kind, document_id, "no chunks retrieved");
            return Ok(QaAnswer::NoRelevantContent);
        }
        debug!(
            %kind,
            document_id,
            best_score = hits[0].score,
            best_chunk = hits[0].chunk_index,
            "chunks retrieved"
        );

        let context = hits.iter().map(|hit| hit.text.as_str()).collect::<Vec<_>>();
        let answer = self.composer.compose(&context, question).await?;

        self.store
            .append_question(kind, document_id, &QaEntry::now(question, answer.as_str()))
            .await?;
        info!(%kind, document_id, retrieved = hits.len(), "question answered");

        Ok(QaAnswer::Answered(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{IndexError, ModelError};
    use crate::index::tests::write_empty_index;
    use crate::models::{Record, RecordSource, RecordStatus};
    use crate::stores::MemoryRecordStore;
    use crate::traits::LanguageModel;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Echoes the first context line that mentions a word from the question.
    #[derive(Default)]
    struct ExtractiveModel {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LanguageModel for ExtractiveModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            *self.calls.lock().unwrap() += 1;
            let context = prompt
                .split("Context:\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\nQuestion:").next())
                .unwrap_or_default();
            Ok(context.lines().next().unwrap_or("nothing").to_string())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        model: Arc<ExtractiveModel>,
        store: Arc<MemoryRecordStore>,
        service: QaService,
        indexes: IndexRegistry,
    }

    async fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let model = Arc::new(ExtractiveModel::default());
        let store = Arc::new(MemoryRecordStore::new());
        let indexes = IndexRegistry::new(dir.path(), Arc::new(CharacterNgramEmbedder::default()));
        let service = QaService::new(
            indexes.clone(),
            AnswerComposer::new(model.clone()),
            store.clone(),
        );
        Ok(Fixture {
            _dir: dir,
            model,
            store,
            service,
            indexes,
        })
    }

    async fn seed(fixture: &Fixture, id: &str, chunks: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
        let chunks = chunks.iter().map(|chunk| chunk.to_string()).collect::<Vec<_>>();
        fixture
            .indexes
            .for_kind(DocumentKind::Pdf)
            .build(&chunks, id)
            .await?;

        let now = Utc::now();
        fixture
            .store
            .create(&Record {
                id: id.to_string(),
                source: RecordSource::Pdf {
                    file_name: "capitals.pdf".to_string(),
                    file_size: 10,
                },
                status: RecordStatus::Processed,
                name: "Capitals".to_string(),
                description: String::new(),
                keywords: Vec::new(),
                questions: Vec::new(),
                created_at: now,
                last_activity: now,
            })
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn answers_from_retrieved_context() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        seed(
            &fixture,
            "doc-1",
            &["The capital of France is Paris.", "Bananas are yellow."],
        )
        .await?;

        let answer = fixture
            .service
            .answer(DocumentKind::Pdf, "doc-1", "What is the capital of France?")
            .await?;

        match answer {
            QaAnswer::Answered(text) => assert!(text.contains("Paris")),
            other => panic!("unexpected answer: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn history_grows_once_per_answer_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        seed(&fixture, "doc-2", &["The capital of France is Paris."]).await?;

        for question in ["first?", "second?", "third?"] {
            fixture
                .service
                .answer(DocumentKind::Pdf, "doc-2", question)
                .await?;
        }

        let record = fixture
            .store
            .get(DocumentKind::Pdf, "doc-2")
            .await?
            .expect("record exists");
        let asked = record
            .questions
            .iter()
            .map(|entry| entry.question.as_str())
            .collect::<Vec<_>>();
        assert_eq!(asked, vec!["first?", "second?", "third?"]);
        assert!(record.last_activity >= record.created_at);
        Ok(())
    }

    #[tokio::test]
    async fn empty_retrieval_skips_the_model_and_history() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        seed(&fixture, "doc-5", &["The capital of France is Paris."]).await?;
        let index = fixture.indexes.for_kind(DocumentKind::Pdf);
        index.delete("doc-5").await?;
        write_empty_index(index, "doc-5").await?;

        let answer = fixture
            .service
            .answer(DocumentKind::Pdf, "doc-5", "What is the capital of France?")
            .await?;

        assert_eq!(answer, QaAnswer::NoRelevantContent);
        assert_eq!(*fixture.model.calls.lock().unwrap(), 0);
        let record = fixture
            .store
            .get(DocumentKind::Pdf, "doc-5")
            .await?
            .expect("record exists");
        assert!(record.questions.is_empty());
        assert_eq!(record.last_activity, record.created_at);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_document_is_index_not_found() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        let result = fixture
            .service
            .answer(DocumentKind::Pdf, "does-not-exist", "q")
            .await;

        assert!(matches!(result, Err(QaError::IndexNotFound(id)) if id == "does-not-exist"));
        assert_eq!(*fixture.model.calls.lock().unwrap(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn kinds_do_not_share_indexes() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        seed(&fixture, "doc-3", &["The capital of France is Paris."]).await?;

        let result = fixture.service.answer(DocumentKind::Url, "doc-3", "q").await;
        assert!(matches!(result, Err(QaError::IndexNotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn blank_question_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        seed(&fixture, "doc-4", &["text"]).await?;

        let result = fixture.service.answer(DocumentKind::Pdf, "doc-4", "   ").await;
        assert!(matches!(result, Err(QaError::EmptyQuestion)));
        Ok(())
    }

    #[tokio::test]
    async fn index_without_record_fails_on_append() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        let chunks = vec!["Rome is the capital of Italy.".to_string()];
        fixture
            .indexes
            .for_kind(DocumentKind::Pdf)
            .build(&chunks, "orphan")
            .await?;

        let result = fixture
            .service
            .answer(DocumentKind::Pdf, "orphan", "capital of Italy?")
            .await;
        assert!(matches!(result, Err(QaError::Store(_))));
        Ok(())
    }

    #[test]
    fn not_found_maps_to_index_not_found() {
        let error = QaError::from(IndexError::NotFound("x".to_string()));
        assert!(matches!(error, QaError::IndexNotFound(_)));
    }
}
