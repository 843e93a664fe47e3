use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crate::server::MAX_UPLOAD_BYTES;
use docchat_core::gemini::{
    DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_GEMINI_ENDPOINT,
};
use docchat_core::stores::{connect, CollectionNames};
use docchat_core::{
    CharacterNgramEmbedder, DocumentKind, Embedder, GeminiChatModel, GeminiClient, GeminiEmbedder,
    IndexRegistry, LanguageModel, SqliteRecordStore, WebExtractor, DEFAULT_TOP_K,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "docchat", version, about = "Chat with PDFs and web pages")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderChoice {
    /// Hosted Gemini embeddings.
    Gemini,
    /// Offline character trigram embedder.
    Ngram,
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// SQLite database holding chat records
    #[arg(long, env = "DOCCHAT_DATABASE_URL", default_value = "sqlite://data/docchat.db")]
    pub database_url: String,

    /// Collection name for PDF chats
    #[arg(long, env = "DOCCHAT_PDF_COLLECTION", default_value = "chats")]
    pub pdf_collection: String,

    /// Collection name for URL chats
    #[arg(long, env = "DOCCHAT_URL_COLLECTION", default_value = "url_chats")]
    pub url_collection: String,

    /// Directory that holds one index directory per document
    #[arg(long, env = "DOCCHAT_INDEX_ROOT", default_value = "indexes")]
    pub index_root: PathBuf,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_ENDPOINT", default_value = DEFAULT_GEMINI_ENDPOINT)]
    pub gemini_endpoint: String,

    #[arg(long, env = "DOCCHAT_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    #[arg(long, env = "DOCCHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    #[arg(long, env = "DOCCHAT_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    pub embedding_dimensions: usize,

    #[arg(long, env = "DOCCHAT_EMBEDDER", value_enum, default_value_t = EmbedderChoice::Gemini)]
    pub embedder: EmbedderChoice,

    /// Directory of `*.json` passages answered by `/askai`
    #[arg(long, env = "DOCCHAT_LEGAL_CORPUS")]
    pub legal_corpus: Option<PathBuf>,

    /// Chunks retrieved per question
    #[arg(long, env = "DOCCHAT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Timeout for outbound HTTP calls, in seconds
    #[arg(long, env = "DOCCHAT_HTTP_TIMEOUT_SECS", default_value_t = 60)]
    pub http_timeout_secs: u64,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "DOCCHAT_BIND", default_value = "127.0.0.1:5000")]
        bind: String,

        /// Largest accepted request body, in bytes
        #[arg(long, env = "DOCCHAT_MAX_UPLOAD_BYTES", default_value_t = MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },
    /// Ingest one PDF file.
    IngestPdf {
        #[arg(long)]
        file: PathBuf,
    },
    /// Ingest one web page.
    IngestUrl {
        #[arg(long)]
        url: String,
    },
    /// Ask a question about an ingested document.
    Ask {
        #[arg(long)]
        kind: DocumentKind,
        #[arg(long)]
        id: String,
        #[arg(long)]
        question: String,
    },
    /// List stored chats, most recently active first.
    List {
        #[arg(long)]
        kind: DocumentKind,
    },
    /// Delete a chat record and its index.
    Delete {
        #[arg(long)]
        kind: DocumentKind,
        #[arg(long)]
        id: String,
    },
}

impl Settings {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    fn gemini_client(&self) -> anyhow::Result<GeminiClient> {
        let api_key = self
            .gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .context("GEMINI_API_KEY (or --gemini-api-key) is required")?;
        Ok(GeminiClient::new(&self.gemini_endpoint, api_key, self.timeout())?)
    }

    pub fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderChoice::Gemini => Arc::new(GeminiEmbedder::new(
                self.gemini_client()?,
                &self.embedding_model,
                self.embedding_dimensions,
            )),
            EmbedderChoice::Ngram => Arc::new(CharacterNgramEmbedder::default()),
        };
        Ok(embedder)
    }

    /// Model used for grounded answers and ingestion metadata.
    pub fn chat_model(&self) -> anyhow::Result<Arc<dyn LanguageModel>> {
        Ok(Arc::new(GeminiChatModel::new(
            self.gemini_client()?,
            &self.chat_model,
        )))
    }

    /// Model used for `/askai`; warmer and allowed longer answers.
    pub fn legal_model(&self) -> anyhow::Result<Arc<dyn LanguageModel>> {
        Ok(Arc::new(
            GeminiChatModel::new(self.gemini_client()?, &self.chat_model)
                .with_temperature(0.7)
                .with_max_output_tokens(4_000),
        ))
    }

    pub fn index_registry(&self, embedder: Arc<dyn Embedder>) -> IndexRegistry {
        IndexRegistry::new(&self.index_root, embedder)
    }

    /// Registry for listing and deleting, which never embed anything.
    pub fn maintenance_registry(&self) -> IndexRegistry {
        self.index_registry(Arc::new(CharacterNgramEmbedder::default()))
    }

    pub fn web_extractor(&self) -> anyhow::Result<WebExtractor> {
        Ok(WebExtractor::new(self.timeout())?)
    }

    pub async fn record_store(&self) -> anyhow::Result<Arc<SqliteRecordStore>> {
        let pool = connect(&self.database_url)
            .await
            .with_context(|| format!("opening {}", self.database_url))?;
        let store = SqliteRecordStore::new(
            pool,
            CollectionNames::new(&self.pdf_collection, &self.url_collection),
        );
        store.migrate().await?;
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_deployment() {
        let cli = Cli::try_parse_from(["docchat", "serve"]).expect("parses");
        assert_eq!(cli.settings.pdf_collection, "chats");
        assert_eq!(cli.settings.url_collection, "url_chats");
        assert_eq!(cli.settings.top_k, 4);
        assert!(matches!(
            cli.command,
            Command::Serve { max_upload_bytes, .. } if max_upload_bytes == MAX_UPLOAD_BYTES
        ));
    }

    #[test]
    fn kinds_parse_from_flags() {
        let cli = Cli::try_parse_from([
            "docchat",
            "--embedder",
            "ngram",
            "ask",
            "--kind",
            "url",
            "--id",
            "abc",
            "--question",
            "why?",
        ])
        .expect("parses");

        assert_eq!(cli.settings.embedder, EmbedderChoice::Ngram);
        match cli.command {
            Command::Ask { kind, id, .. } => {
                assert_eq!(kind, DocumentKind::Url);
                assert_eq!(id, "abc");
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn hosted_models_need_an_api_key() {
        let cli = Cli::try_parse_from(["docchat", "--gemini-api-key", " ", "list", "--kind", "pdf"])
            .expect("parses");
        assert!(cli.settings.chat_model().is_err());
        assert!(cli.settings.embedder().is_err());
    }
}
