use std::sync::Arc;

use ragloop_core::QueryResult;
use ragloop_error::{RagError, Result};
use ragloop_llm::{ChatModel, EmbedModel};
use tracing::instrument;

use crate::index::VectorIndex;

/// 检索集为空时的固定回答
pub const NO_RESULTS_ANSWER: &str = "No relevant documents found.";

/// RAG 查询流水线：嵌入 -> 检索 -> 组装上下文 -> 生成
///
/// 嵌入或生成失败会原样向上传播，没有查询向量或生成结果时
/// 不存在有意义的部分回答。唯一的非错误空结果是检索零命中。
pub struct RagQueryEngine {
    chat_model: Arc<dyn ChatModel>,
    embed_model: Arc<dyn EmbedModel>,
    index: Arc<dyn VectorIndex>,
}

impl RagQueryEngine {
    pub fn new(
        chat_model: Arc<dyn ChatModel>,
        embed_model: Arc<dyn EmbedModel>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            chat_model,
            embed_model,
            index,
        }
    }

    /// 执行查询，top_k 原样传给索引，不做后过滤
    #[instrument(skip(self, question))]
    pub async fn query(&self, question: &str, top_k: usize) -> Result<QueryResult> {
        let query_vector = self
            .embed_model
            .embed(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingService {
                provider: "embed".to_string(),
                message: "provider returned an empty batch for a single-item request".to_string(),
                retry_after: None,
            })?;

        let hits = self.index.search(&query_vector, top_k).await?;

        if hits.is_empty() {
            tracing::info!(top_k, "No hits retrieved, skipping generation");
            return Ok(QueryResult {
                answer: NO_RESULTS_ANSWER.to_string(),
                sources: vec![],
                retrieved_count: 0,
            });
        }

        // 命中顺序就是上下文顺序，不重新排序
        let context = hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = self.chat_model.chat(question, &context).await?;

        tracing::info!(retrieved_count = hits.len(), "Query completed");

        Ok(QueryResult {
            answer,
            retrieved_count: hits.len(),
            sources: hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ragloop_core::RetrievedHit;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingChat {
        called: AtomicBool,
        contexts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for RecordingChat {
        async fn chat(&self, _question: &str, context: &str) -> Result<String> {
            self.called.store(true, Ordering::SeqCst);
            self.contexts.lock().unwrap().push(context.to_string());
            Ok("generated answer".to_string())
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatModel for FailingChat {
        async fn chat(&self, _question: &str, _context: &str) -> Result<String> {
            Err(RagError::Generation {
                provider: "test".to_string(),
                message: "generation failed".to_string(),
                retry_after: None,
            })
        }
    }

    struct UnitEmbed;

    #[async_trait]
    impl EmbedModel for UnitEmbed {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FailingEmbed;

    #[async_trait]
    impl EmbedModel for FailingEmbed {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::EmbeddingService {
                provider: "test".to_string(),
                message: "embedding failed".to_string(),
                retry_after: None,
            })
        }
    }

    struct StaticIndex {
        hits: Vec<RetrievedHit>,
    }

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn insert(
            &self,
            _ids: Vec<String>,
            _vectors: Vec<Vec<f32>>,
            _texts: Vec<String>,
            _metadatas: Vec<serde_json::Value>,
        ) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _vector: &[f32], top_k: usize) -> Result<Vec<RetrievedHit>> {
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
    }

    fn hit(text: &str, score: f32) -> RetrievedHit {
        RetrievedHit {
            text: text.to_string(),
            score,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn test_query_with_no_hits_skips_generation() {
        let chat = Arc::new(RecordingChat::default());
        // 空的真实索引，检索必然零命中
        let engine = RagQueryEngine::new(
            chat.clone(),
            Arc::new(UnitEmbed),
            Arc::new(crate::memory::MemoryIndex::new()),
        );

        let result = engine.query("anything", 5).await.unwrap();

        assert_eq!(result.answer, "No relevant documents found.");
        assert!(result.sources.is_empty());
        assert_eq!(result.retrieved_count, 0);
        assert!(!chat.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_query_context_preserves_rank_order() {
        let chat = Arc::new(RecordingChat::default());
        let engine = RagQueryEngine::new(
            chat.clone(),
            Arc::new(UnitEmbed),
            Arc::new(StaticIndex {
                hits: vec![hit("First document", 0.9), hit("Second document", 0.7)],
            }),
        );

        let result = engine.query("question", 5).await.unwrap();

        let contexts = chat.contexts.lock().unwrap();
        assert_eq!(contexts[0], "First document\n\nSecond document");
        assert_eq!(result.retrieved_count, 2);
        assert_eq!(result.sources[0].text, "First document");
        assert_eq!(result.sources[1].text, "Second document");
        assert_eq!(result.answer, "generated answer");
    }

    #[tokio::test]
    async fn test_query_passes_top_k_through() {
        let chat = Arc::new(RecordingChat::default());
        let engine = RagQueryEngine::new(
            chat,
            Arc::new(UnitEmbed),
            Arc::new(StaticIndex {
                hits: vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)],
            }),
        );

        let result = engine.query("question", 2).await.unwrap();
        assert_eq!(result.retrieved_count, 2);
        assert_eq!(result.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_query_embedding_failure_is_fatal() {
        let engine = RagQueryEngine::new(
            Arc::new(RecordingChat::default()),
            Arc::new(FailingEmbed),
            Arc::new(StaticIndex { hits: vec![] }),
        );

        let err = engine.query("question", 5).await;
        assert!(matches!(err, Err(RagError::EmbeddingService { .. })));
    }

    #[tokio::test]
    async fn test_query_generation_failure_is_fatal() {
        let engine = RagQueryEngine::new(
            Arc::new(FailingChat),
            Arc::new(UnitEmbed),
            Arc::new(StaticIndex {
                hits: vec![hit("some context", 0.5)],
            }),
        );

        let err = engine.query("question", 5).await;
        assert!(matches!(err, Err(RagError::Generation { .. })));
    }
}
