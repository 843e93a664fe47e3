use crate::embeddings::{cosine_similarity, normalize_in_place};
use crate::error::IndexError;
use crate::models::{DocumentKind, RetrievedChunk};
use crate::traits::Embedder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "chunks.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub document_id: String,
    pub namespace: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub metric: DistanceMetric,
    pub chunk_count: usize,
    pub content_digest: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk_index: usize,
    text: String,
    vector: Vec<f32>,
}

/// Read-only handle to a persisted index.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

impl LoadedIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Vector indexes for one namespace, stored at `<root>/<namespace>/index_<document_id>`.
#[derive(Clone)]
pub struct EmbeddingIndex {
    root: PathBuf,
    namespace: String,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingIndex {
    pub fn new(
        root: impl Into<PathBuf>,
        namespace: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
            embedder,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn index_path(&self, document_id: &str) -> PathBuf {
        self.root
            .join(&self.namespace)
            .join(format!("index_{document_id}"))
    }

    pub async fn build(
        &self,
        chunks: &[String],
        document_id: &str,
    ) -> Result<IndexManifest, IndexError> {
        if !is_valid_document_id(document_id) {
            return Err(IndexError::Build(format!(
                "invalid document id: {document_id:?}"
            )));
        }
        if chunks.is_empty() {
            return Err(IndexError::Build("no chunks to index".to_string()));
        }

        let final_path = self.index_path(document_id);
        if fs::try_exists(&final_path).await? {
            return Err(IndexError::Build(format!(
                "index already exists for {document_id}"
            )));
        }

        let vectors = self.embedder.embed_batch(chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::Build(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }
        let dimensions = vectors.first().map(Vec::len).unwrap_or_default();
        if dimensions == 0 || vectors.iter().any(|vector| vector.len() != dimensions) {
            return Err(IndexError::Build(
                "embedding vectors have inconsistent dimensions".to_string(),
            ));
        }
        if dimensions != self.embedder.dimensions() {
            return Err(IndexError::Build(format!(
                "{} returned {dimensions}-dimensional vectors but declares {}",
                self.embedder.model_name(),
                self.embedder.dimensions()
            )));
        }

        let entries = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(chunk_index, (text, mut vector))| {
                normalize_in_place(&mut vector);
                IndexEntry {
                    chunk_index,
                    text: text.clone(),
                    vector,
                }
            })
            .collect::<Vec<_>>();

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            document_id: document_id.to_string(),
            namespace: self.namespace.clone(),
            embedding_model: self.embedder.model_name().to_string(),
            dimensions,
            metric: DistanceMetric::Cosine,
            chunk_count: entries.len(),
            content_digest: content_digest(entries.iter().map(|entry| entry.text.as_str())),
            created_at: Utc::now(),
        };

        self.write_atomically(&final_path, &manifest, &entries).await?;

        info!(
            namespace = %self.namespace,
            document_id,
            chunk_count = manifest.chunk_count,
            dimensions,
            "index persisted"
        );
        Ok(manifest)
    }

    pub async fn load(&self, document_id: &str) -> Result<LoadedIndex, IndexError> {
        if !is_valid_document_id(document_id) {
            return Err(IndexError::NotFound(document_id.to_string()));
        }

        let path = self.index_path(document_id);
        let manifest_bytes = match fs::read(path.join(MANIFEST_FILE)).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(IndexError::NotFound(document_id.to_string()));
            }
            Err(error) => return Err(error.into()),
        };
        let manifest: IndexManifest = serde_json::from_slice(&manifest_bytes)?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(corrupt(
                document_id,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }
        if manifest.embedding_model != self.embedder.model_name()
            || manifest.dimensions != self.embedder.dimensions()
        {
            return Err(IndexError::ModelMismatch {
                document_id: document_id.to_string(),
                built_with: format!("{}/{}", manifest.embedding_model, manifest.dimensions),
                configured: format!(
                    "{}/{}",
                    self.embedder.model_name(),
                    self.embedder.dimensions()
                ),
            });
        }

        let entries: Vec<IndexEntry> =
            serde_json::from_slice(&fs::read(path.join(ENTRIES_FILE)).await?)?;
        if entries.len() != manifest.chunk_count {
            return Err(corrupt(
                document_id,
                format!(
                    "manifest lists {} chunks, found {}",
                    manifest.chunk_count,
                    entries.len()
                ),
            ));
        }
        if content_digest(entries.iter().map(|entry| entry.text.as_str())) != manifest.content_digest
        {
            return Err(corrupt(document_id, "content digest mismatch".to_string()));
        }

        debug!(namespace = %self.namespace, document_id, chunk_count = entries.len(), "index loaded");
        Ok(LoadedIndex { manifest, entries })
    }

    /// Up to `k` chunks ordered by descending cosine similarity.
    pub async fn search(
        &self,
        index: &LoadedIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query).await?;
        if query_vector.len() != index.manifest.dimensions {
            return Err(IndexError::ModelMismatch {
                document_id: index.manifest.document_id.clone(),
                built_with: index.manifest.dimensions.to_string(),
                configured: query_vector.len().to_string(),
            });
        }

        let mut scored = index
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_vector, &entry.vector), entry))
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| {
            right
                .0
                .total_cmp(&left.0)
                .then(left.1.chunk_index.cmp(&right.1.chunk_index))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| RetrievedChunk {
                chunk_index: entry.chunk_index,
                text: entry.text.clone(),
                score,
            })
            .collect())
    }

    pub async fn exists(&self, document_id: &str) -> bool {
        is_valid_document_id(document_id)
            && fs::try_exists(self.index_path(document_id).join(MANIFEST_FILE))
                .await
                .unwrap_or(false)
    }

    /// Returns whether an index directory was removed.
    pub async fn delete(&self, document_id: &str) -> Result<bool, IndexError> {
        if !is_valid_document_id(document_id) {
            return Ok(false);
        }
        match fs::remove_dir_all(self.index_path(document_id)).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn write_atomically(
        &self,
        final_path: &Path,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<(), IndexError> {
        let parent = self.root.join(&self.namespace);
        fs::create_dir_all(&parent).await?;

        let staging = parent.join(format!(
            ".staging_{}_{}",
            manifest.document_id,
            Uuid::new_v4().simple()
        ));
        fs::create_dir(&staging).await?;

        let written = async {
            fs::write(staging.join(ENTRIES_FILE), serde_json::to_vec(entries)?).await?;
            fs::write(
                staging.join(MANIFEST_FILE),
                serde_json::to_vec_pretty(manifest)?,
            )
            .await?;
            fs::rename(&staging, final_path).await?;
            Ok::<_, IndexError>(())
        }
        .await;

        if written.is_err() {
            if let Err(error) = fs::remove_dir_all(&staging).await {
                warn!(path = %staging.display(), %error, "failed to clean staging directory");
            }
        }
        written
    }
}

/// Pdf and url indexes side by side under one root.
#[derive(Clone)]
pub struct IndexRegistry {
    pdf: EmbeddingIndex,
    url: EmbeddingIndex,
}

impl IndexRegistry {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        let root = root.into();
        Self {
            pdf: EmbeddingIndex::new(&root, DocumentKind::Pdf.namespace(), embedder.clone()),
            url: EmbeddingIndex::new(&root, DocumentKind::Url.namespace(), embedder),
        }
    }

    pub fn for_kind(&self, kind: DocumentKind) -> &EmbeddingIndex {
        match kind {
            DocumentKind::Pdf => &self.pdf,
            DocumentKind::Url => &self.url,
        }
    }
}

/// Identifiers become directory names, so only `[A-Za-z0-9_-]` is accepted.
pub fn is_valid_document_id(document_id: &str) -> bool {
    !document_id.is_empty()
        && document_id.len() <= 128
        && document_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn content_digest<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for text in texts {
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn corrupt(document_id: &str, details: String) -> IndexError {
    IndexError::Corrupt {
        document_id: document_id.to_string(),
        details,
    }
}
