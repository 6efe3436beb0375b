use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use ragloop_core::DocumentStatus;
use ragloop_error::{RagError, Result};
use ragloop_llm::make_providers;
use ragloop_pipeline::{
    Converter, DocumentIngester, ExtractServiceConverter, MarkdownFileConverter, MemoryIndex,
    QdrantIndex, Settings, TextChunker, VectorIndex,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();
    tracing::info!("ragloop-worker starting");

    let settings = Settings::from_env()?;

    let ingest_dir =
        PathBuf::from(std::env::var("INGEST_DIR").unwrap_or_else(|_| "ingest".to_string()));
    let poll_interval = Duration::from_secs(
        std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5),
    );

    let providers = make_providers(settings.chat_provider(), settings.embed_provider());
    let index: Arc<dyn VectorIndex> = match settings.vector_backend.as_str() {
        "memory" => Arc::new(MemoryIndex::new()),
        _ => Arc::new(
            QdrantIndex::new(
                &settings.qdrant_url,
                &settings.collection_name,
                settings.embedding_dimension,
            )
            .await?,
        ),
    };
    let converter: Arc<dyn Converter> = match &settings.extract_url {
        Some(url) => Arc::new(ExtractServiceConverter::new(
            url.clone(),
            settings.extract_token.clone(),
            settings.extract_timeout_ms,
            settings.extract_retries,
        )),
        None => Arc::new(MarkdownFileConverter),
    };
    let ingester = DocumentIngester::new(
        converter,
        TextChunker::new(settings.chunk_size, settings.chunk_overlap),
        providers.embed,
        index,
    );

    let processed_dir = ingest_dir.join("processed");
    let failed_dir = ingest_dir.join("failed");
    create_dir(&ingest_dir).await?;
    create_dir(&processed_dir).await?;
    create_dir(&failed_dir).await?;

    tracing::info!(
        ingest_dir = %ingest_dir.display(),
        poll_secs = poll_interval.as_secs(),
        "watching inbox"
    );

    loop {
        match scan_inbox(&ingest_dir).await {
            Ok(files) => {
                for path in files {
                    let record = ingester.ingest(&path).await;
                    let target_dir = match record.status {
                        DocumentStatus::Completed => {
                            tracing::info!(
                                document_id = %record.document_id,
                                chunk_count = record.chunk_count.unwrap_or(0),
                                file = %path.display(),
                                "document indexed"
                            );
                            &processed_dir
                        }
                        DocumentStatus::Failed => {
                            tracing::warn!(
                                document_id = %record.document_id,
                                error = record.error.as_deref().unwrap_or(""),
                                file = %path.display(),
                                "document rejected"
                            );
                            &failed_dir
                        }
                    };
                    if let Err(e) = move_into(&path, target_dir).await {
                        tracing::warn!(file = %path.display(), error = %e, "failed to move file");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "inbox scan failed"),
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// 收集收件目录里的普通文件，子目录（processed/failed）跳过
async fn scan_inbox(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let file_type = entry.file_type().await.map_err(io_error)?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

async fn move_into(path: &Path, target_dir: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| RagError::Internal {
            message: format!("path has no file name: {}", path.display()),
            details: None,
        })?;
    tokio::fs::rename(path, target_dir.join(file_name))
        .await
        .map_err(io_error)
}

async fn create_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(io_error)
}

fn io_error(err: std::io::Error) -> RagError {
    RagError::Internal {
        message: err.to_string(),
        details: None,
    }
}

fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
