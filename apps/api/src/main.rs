use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use ragloop_core::{DocumentRecord, IngestRequest, QueryRequest, QueryResponse};
use ragloop_error::{RagError, Result};
use ragloop_llm::make_providers;
use ragloop_pipeline::{
    Converter, DocumentIngester, Evaluator, ExtractServiceConverter, MarkdownFileConverter,
    MemoryIndex, QdrantIndex, RagQueryEngine, Settings, TextChunker, VectorIndex,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Clone)]
struct AppState {
    engine: Arc<RagQueryEngine>,
    ingester: Arc<DocumentIngester>,
    evaluator: Evaluator,
    default_top_k: usize,
    max_top_k: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let settings = Settings::from_env()?;
    info!(bind_addr = %settings.bind_addr, "ragloop-api starting");

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

    let state = AppState {
        engine: Arc::new(RagQueryEngine::new(
            providers.chat.clone(),
            providers.embed.clone(),
            index.clone(),
        )),
        ingester: Arc::new(DocumentIngester::new(
            converter,
            TextChunker::new(settings.chunk_size, settings.chunk_overlap),
            providers.embed,
            index,
        )),
        evaluator: Evaluator,
        default_top_k: settings.default_top_k,
        max_top_k: settings.max_top_k,
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/query", post(query))
        .route("/ingest", post(ingest))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .map_err(|_| RagError::Configuration {
            key: "BIND_ADDR".to_string(),
            reason: format!("invalid socket address: {:?}", settings.bind_addr),
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RagError::Network {
            operation: "bind".to_string(),
            message: e.to_string(),
        })?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| RagError::Network {
            operation: "serve".to_string(),
            message: e.to_string(),
        })?;

    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "RAG System API is running" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// 查询 + 自评估，top_k 的策略边界在这里而不在流水线里
async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    if top_k == 0 || top_k > state.max_top_k {
        return Err(RagError::InvalidRequest {
            reason: format!("top_k must be in 1..={}, got {}", state.max_top_k, top_k),
        });
    }

    let result = state.engine.query(&req.query, top_k).await?;
    let evaluation = state.evaluator.evaluate(&req.query, &result);

    Ok(Json(QueryResponse {
        query: req.query,
        answer: result.answer,
        sources: result.sources,
        retrieved_count: result.retrieved_count,
        evaluation,
    }))
}

/// 摄取失败同样返回 200，failed 记录本身就是响应数据
async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Json<DocumentRecord> {
    let record = state.ingester.ingest(&PathBuf::from(req.path)).await;
    Json(record)
}

fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
