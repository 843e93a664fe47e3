use crate::error::CompositionError;
use crate::traits::LanguageModel;
use std::sync::Arc;
use tracing::debug;

/// Reply the model is told to give when the context does not hold the answer.
pub const ANSWER_NOT_AVAILABLE: &str = "Answer is not available in the context.";

/// Renders the grounded-answer prompt and calls the generative model once.
///
/// Ingestion calls it with an empty context and the excerpt folded into the
/// question to produce titles, descriptions and keywords; question answering
/// calls it with retrieved chunks.
#[derive(Clone)]
pub struct AnswerComposer {
    model: Arc<dyn LanguageModel>,
}

impl AnswerComposer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn compose<S: AsRef<str> + Sync>(
        &self,
        context_chunks: &[S],
        question: &str,
    ) -> Result<String, CompositionError> {
        let prompt = render_prompt(context_chunks, question);
        debug!(
            context_chunks = context_chunks.len(),
            prompt_chars = prompt.len(),
            "composing answer"
        );

        let answer = self.model.generate(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(CompositionError::Empty);
        }
        Ok(answer.to_string())
    }

    /// Asks for one piece of metadata about `excerpt` with no retrieved context.
    pub async fn describe(&self, instruction: &str, excerpt: &str) -> Result<String, CompositionError> {
        let question = format!("{instruction}\n\nContent:\n{excerpt}");
        self.compose::<&str>(&[], &question).await
    }
}

pub fn render_prompt<S: AsRef<str>>(context_chunks: &[S], question: &str) -> String {
    let context = context_chunks
        .iter()
        .map(|chunk| chunk.as_ref())
        .collect::<Vec<&str>>()
        .join("\n\n");

    format!(
        "Answer the question as detailed as possible from the provided context. \
If the answer is not in the provided context, just say \"{ANSWER_NOT_AVAILABLE}\" \
Do not provide incorrect information.\n\n\
Context:\n{context}\n\n\
Question:\n{question}\n\n\
Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Err(ModelError::EmptyResponse)
        }
    }

    #[test]
    fn prompt_carries_context_question_and_sentinel() {
        let prompt = render_prompt(&["First chunk.", "Second chunk."], "Where is Paris?");

        assert!(prompt.contains("First chunk.\n\nSecond chunk."));
        assert!(prompt.contains("Question:\nWhere is Paris?"));
        assert!(prompt.contains(ANSWER_NOT_AVAILABLE));
        assert!(!prompt.contains("{context}"));
    }

    #[tokio::test]
    async fn compose_calls_the_model_once_and_trims() {
        let model = Arc::new(RecordingModel {
            reply: "  Paris.\n".to_string(),
            ..Default::default()
        });
        let composer = AnswerComposer::new(model.clone());

        let answer = composer
            .compose(&["The capital of France is Paris."], "What is the capital?")
            .await
            .unwrap();

        assert_eq!(answer, "Paris.");
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn describe_uses_empty_context() {
        let model = Arc::new(RecordingModel {
            reply: "Capitals of Europe".to_string(),
            ..Default::default()
        });
        let composer = AnswerComposer::new(model.clone());

        composer
            .describe("Generate a short and meaningful name for this PDF.", "Paris, Berlin")
            .await
            .unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Context:\n\n\nQuestion:"));
        assert!(prompts[0].contains("Content:\nParis, Berlin"));
    }

    #[tokio::test]
    async fn blank_reply_is_a_composition_error() {
        let composer = AnswerComposer::new(Arc::new(RecordingModel {
            reply: "   ".to_string(),
            ..Default::default()
        }));
        assert!(matches!(
            composer.compose::<&str>(&[], "q").await,
            Err(CompositionError::Empty)
        ));
    }

    #[tokio::test]
    async fn model_failure_surfaces() {
        let composer = AnswerComposer::new(Arc::new(FailingModel));
        assert!(matches!(
            composer.compose(&["ctx"], "q").await,
            Err(CompositionError::Model(_))
        ));
    }
}
