use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use docchat_core::{
    AnswerComposer, CorpusQa, Embedder, IngestionService, Library, QaAnswer, QaService,
    RecordStore,
};
use docchat_server::{AppState, Cli, Command, Settings};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docchat boot"
    );

    let settings = cli.settings;
    match cli.command {
        Command::Serve {
            bind,
            max_upload_bytes,
        } => {
            let state = build_state(&settings)
                .await?
                .with_upload_limit(max_upload_bytes);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            docchat_server::serve(listener, state).await?;
        }
        Command::IngestPdf { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| file.display().to_string());

            let outcome = ingestion(&settings)
                .await?
                .ingest_pdf(&file_name, &bytes)
                .await?;
            println!(
                "chat_id={} title={:?} chunks={}",
                outcome.document_id(),
                outcome.record.name,
                outcome.chunk_count
            );
        }
        Command::IngestUrl { url } => {
            let outcome = ingestion(&settings).await?.ingest_url(&url).await?;
            println!(
                "url_id={} title={:?} chunks={}",
                outcome.document_id(),
                outcome.record.name,
                outcome.chunk_count
            );
        }
        Command::Ask { kind, id, question } => {
            let store: Arc<dyn RecordStore> = settings.record_store().await?;
            let qa = QaService::new(
                settings.index_registry(settings.embedder()?),
                AnswerComposer::new(settings.chat_model()?),
                store,
            )
            .with_top_k(settings.top_k);

            match qa.answer(kind, &id, &question).await? {
                QaAnswer::Answered(answer) => println!("{answer}"),
                QaAnswer::NoRelevantContent => println!("No relevant content found"),
            }
        }
        Command::List { kind } => {
            let library = Library::new(settings.maintenance_registry(), settings.record_store().await?);
            for summary in library.list(kind).await? {
                println!(
                    "{}  {}  {:?}",
                    summary.last_activity.to_rfc3339(),
                    summary.id,
                    summary.name
                );
            }
        }
        Command::Delete { kind, id } => {
            let library = Library::new(settings.maintenance_registry(), settings.record_store().await?);
            let outcome = library.delete(kind, &id).await?;
            println!("deleted {kind} {id} index_removed={}", outcome.index_removed);
        }
    }

    Ok(())
}

async fn ingestion(settings: &Settings) -> anyhow::Result<IngestionService> {
    Ok(IngestionService::new(
        settings.web_extractor()?,
        settings.index_registry(settings.embedder()?),
        AnswerComposer::new(settings.chat_model()?),
        settings.record_store().await?,
    ))
}

async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let embedder = settings.embedder()?;
    let state = AppState::assemble(
        settings.index_registry(embedder.clone()),
        settings.web_extractor()?,
        settings.chat_model()?,
        settings.record_store().await?,
        settings.top_k,
    );

    match &settings.legal_corpus {
        Some(directory) => {
            let corpus = load_corpus(directory, settings, embedder).await?;
            Ok(state.with_corpus(corpus))
        }
        None => {
            warn!("no legal corpus configured, /askai will answer 503");
            Ok(state)
        }
    }
}

async fn load_corpus(
    directory: &Path,
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> anyhow::Result<CorpusQa> {
    CorpusQa::load(directory, embedder, settings.legal_model()?)
        .await
        .with_context(|| format!("loading legal corpus from {}", directory.display()))
}
