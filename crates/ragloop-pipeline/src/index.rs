use async_trait::async_trait;
use ragloop_core::RetrievedHit;
use ragloop_error::Result;

/// 向量索引网关
///
/// 分数语义约定为越大越相似，按分数降序返回。如果底层索引
/// 返回的是距离，由适配器负责换算。
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 写入并行数组：id、向量、文本、元数据按下标一一对应
    async fn insert(
        &self,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadatas: Vec<serde_json::Value>,
    ) -> Result<()>;

    /// 检索最相似的 top_k 条记录，最优在前
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedHit>>;
}
