use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 文档块：一段带位置元数据的词窗口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// 块级元数据，块在文档中的顺序由 chunk_index 表达
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_index: usize,
    pub char_count: usize,
}

/// 转换器产出的文档级元数据，摄取时会合并进每个块的索引载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    pub format: String,
    pub char_count: usize,
    pub word_count: usize,
}

/// 摄取终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Completed,
    Failed,
}

/// 单次摄取的结果记录，流水线结束后不再变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentRecord {
    pub fn completed(document_id: Uuid, chunk_count: usize, source: String) -> Self {
        Self {
            document_id,
            status: DocumentStatus::Completed,
            chunk_count: Some(chunk_count),
            source: Some(source),
            error: None,
        }
    }

    pub fn failed(document_id: Uuid, error: String) -> Self {
        Self {
            document_id,
            status: DocumentStatus::Failed,
            chunk_count: None,
            source: None,
            error: Some(error),
        }
    }
}

/// 向量检索命中，仅在单次查询内有效
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedHit {
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// 查询流水线的产出：回答 + 溯源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<RetrievedHit>,
    pub retrieved_count: usize,
}

/// 启发式自评估记录，所有字段都落在 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub faithfulness: f32,
    pub context_precision: f32,
    pub context_recall: f32,
    pub answer_relevance: f32,
    pub overall_score: f32,
}

// === HTTP 请求/响应模型 ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub sources: Vec<RetrievedHit>,
    pub retrieved_count: usize,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub path: String,
}

pub use ragloop_error::{RagError as Error, Result};
