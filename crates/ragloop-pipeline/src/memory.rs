use async_trait::async_trait;
use ragloop_core::RetrievedHit;
use ragloop_error::{RagError, Result};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::index::VectorIndex;

/// 内存向量索引：余弦相似度全量扫描
///
/// 本地开发与测试用，生产路径走 `QdrantIndex`。
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<MemoryEntry>>,
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    id: String,
    text: String,
    vector: Vec<f32>,
    metadata: serde_json::Value,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 计算余弦相似度
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    let len = a.len().min(b.len());
    for i in 0..len {
        dot_product += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn insert(
        &self,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadatas: Vec<serde_json::Value>,
    ) -> Result<()> {
        if ids.len() != vectors.len() || ids.len() != texts.len() || ids.len() != metadatas.len() {
            return Err(RagError::VectorStore {
                operation: "insert".to_string(),
                message: format!(
                    "parallel arrays length mismatch: ids={} vectors={} texts={} metadatas={}",
                    ids.len(),
                    vectors.len(),
                    texts.len(),
                    metadatas.len()
                ),
            });
        }

        let mut entries = self.entries.write().await;
        for (((id, vector), text), metadata) in
            ids.into_iter().zip(vectors).zip(texts).zip(metadatas)
        {
            entries.push(MemoryEntry {
                id,
                text,
                vector,
                metadata,
            });
        }

        Ok(())
    }

    #[instrument(skip(self, vector))]
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedHit>> {
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, &MemoryEntry)> = entries
            .iter()
            .map(|entry| (cosine_similarity(vector, &entry.vector), entry))
            .collect();

        // 按相似度降序，最优在前
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| RetrievedHit {
                text: entry.text.clone(),
                score,
                metadata: entry.metadata.clone(),
            })
            .collect())
    }
}
