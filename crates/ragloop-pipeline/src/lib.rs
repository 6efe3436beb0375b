pub mod chunker;
pub mod config;
pub mod convert;
pub mod evaluate;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod qdrant;
pub mod query;

pub use chunker::TextChunker;
pub use config::Settings;
pub use convert::{ConvertedDocument, Converter, ExtractServiceConverter, MarkdownFileConverter};
pub use evaluate::Evaluator;
pub use index::VectorIndex;
pub use ingest::DocumentIngester;
pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;
pub use query::{RagQueryEngine, NO_RESULTS_ANSWER};

// 重新导出核心类型
pub use ragloop_core::{
    Chunk, DocumentMetadata, DocumentRecord, DocumentStatus, Evaluation, QueryResult, RetrievedHit,
};
pub use ragloop_error::{RagError, Result};
