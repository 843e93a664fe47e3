//! Question answering over a fixed legal corpus.
//!
//! The corpus is a directory of `*.json` files, each holding one passage under
//! `"text"`. Passages are embedded once when the corpus is loaded; a question
//! picks the single most similar passage and hands it to the model with a
//! legal-domain prompt.

use crate::embeddings::cosine_similarity;
use crate::error::{CorpusError, ModelError};
use crate::traits::{Embedder, LanguageModel};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusPassage {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct PassageFile {
    #[serde(default)]
    text: String,
}

pub struct CorpusQa {
    passages: Vec<CorpusPassage>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
}

impl CorpusQa {
    pub async fn load(
        directory: &Path,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, CorpusError> {
        let mut passages = Vec::new();
        for path in passage_files(directory)? {
            let raw = tokio::fs::read_to_string(&path).await?;
            let file: PassageFile =
                serde_json::from_str(&raw).map_err(|error| CorpusError::InvalidPassage {
                    path: path.display().to_string(),
                    details: error.to_string(),
                })?;

            if file.text.trim().is_empty() {
                debug!(path = %path.display(), "skipping empty passage");
                continue;
            }
            passages.push(CorpusPassage {
                source: path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
                text: file.text,
            });
        }

        if passages.is_empty() {
            return Err(CorpusError::Empty(directory.display().to_string()));
        }

        let corpus = Self::from_passages(passages, embedder, model).await?;
        info!(
            directory = %directory.display(),
            passages = corpus.len(),
            "legal corpus embedded"
        );
        Ok(corpus)
    }

    pub async fn from_passages(
        passages: Vec<CorpusPassage>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, CorpusError> {
        let texts = passages
            .iter()
            .map(|passage| passage.text.clone())
            .collect::<Vec<_>>();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != passages.len() {
            return Err(ModelError::CountMismatch {
                expected: passages.len(),
                returned: vectors.len(),
            }
            .into());
        }

        Ok(Self {
            passages,
            vectors,
            embedder,
            model,
        })
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub async fn answer(&self, question: &str) -> Result<String, CorpusError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(CorpusError::EmptyQuestion);
        }

        let query = self.embedder.embed_query(question).await?;
        let passage = self.most_similar(&query);
        debug!(
            source = passage.map(|p| p.source.as_str()).unwrap_or("none"),
            "legal passage selected"
        );

        let prompt = render_legal_prompt(passage.map(|p| p.text.as_str()), question);
        let answer = self.model.generate(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(CorpusError::Model(ModelError::EmptyResponse));
        }
        Ok(answer.to_string())
    }

    /// First passage with the highest cosine similarity to `query`.
    pub fn most_similar(&self, query: &[f32]) -> Option<&CorpusPassage> {
        let mut best: Option<(f32, usize)> = None;
        for (position, vector) in self.vectors.iter().enumerate() {
            let score = cosine_similarity(query, vector);
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, position));
            }
        }
        best.and_then(|(_, position)| self.passages.get(position))
    }
}

fn passage_files(directory: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(directory).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_json = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort_unstable();
    Ok(files)
}

pub fn render_legal_prompt(passage: Option<&str>, question: &str) -> String {
    let reference = passage
        .map(|text| format!("Reference:\n{text}\n\n"))
        .unwrap_or_default();
    format!(
        "Answer the following question based on the Indian legal system. \
Use the reference passage where it applies. \
Do not answer questions that are not about law. \
The answer can be in markdown format.\n\n\
{reference}Question: {question}\nAnswer:"
    )
}
