use std::path::Path;
use std::sync::Arc;

use ragloop_core::{Chunk, DocumentMetadata, DocumentRecord};
use ragloop_error::{RagError, Result};
use ragloop_llm::EmbedModel;
use tracing::instrument;
use uuid::Uuid;

use crate::chunker::TextChunker;
use crate::convert::Converter;
use crate::index::VectorIndex;

/// 文档摄取流水线：转换 -> 分块 -> 嵌入 -> 写入索引
///
/// 任一阶段失败都会短路成 failed 记录，不向调用方抛错，
/// 单个坏文档不应中断批量摄取。阶段之间没有自动重试。
pub struct DocumentIngester {
    converter: Arc<dyn Converter>,
    chunker: TextChunker,
    embed_model: Arc<dyn EmbedModel>,
    index: Arc<dyn VectorIndex>,
}

impl DocumentIngester {
    pub fn new(
        converter: Arc<dyn Converter>,
        chunker: TextChunker,
        embed_model: Arc<dyn EmbedModel>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            converter,
            chunker,
            embed_model,
            index,
        }
    }

    /// 摄取单个文档，返回终态记录
    #[instrument(skip(self))]
    pub async fn ingest(&self, path: &Path) -> DocumentRecord {
        // 文档 id 先于所有阶段生成，失败记录也要携带
        let document_id = Uuid::new_v4();

        match self.run_stages(document_id, path).await {
            Ok((chunk_count, source)) => {
                tracing::info!(
                    document_id = %document_id,
                    chunk_count,
                    source = %source,
                    "Ingestion completed"
                );
                DocumentRecord::completed(document_id, chunk_count, source)
            }
            Err(e) => {
                tracing::error!(
                    document_id = %document_id,
                    path = %path.display(),
                    error = %e,
                    "Ingestion failed"
                );
                DocumentRecord::failed(document_id, e.to_string())
            }
        }
    }

    async fn run_stages(&self, document_id: Uuid, path: &Path) -> Result<(usize, String)> {
        let converted = self.converter.convert(path).await?;

        let chunks = self
            .chunker
            .chunk(&converted.markdown, &converted.metadata.source)?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embed_model.embed(&texts).await?;

        let ids: Vec<String> = chunks.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let metadatas: Vec<serde_json::Value> = chunks
            .iter()
            .map(|chunk| merged_metadata(chunk, &converted.metadata, document_id))
            .collect::<Result<_>>()?;

        self.index.insert(ids, vectors, texts, metadatas).await?;

        Ok((chunks.len(), converted.metadata.source))
    }
}

/// 合并块级与文档级元数据
///
/// 文档键先铺底，块键覆盖同名键，document_id 最后写入且总是生效。
fn merged_metadata(
    chunk: &Chunk,
    document: &DocumentMetadata,
    document_id: Uuid,
) -> Result<serde_json::Value> {
    let serde_json::Value::Object(mut merged) = serde_json::to_value(document)? else {
        return Err(RagError::Serialization {
            format: "json".to_string(),
            message: "document metadata did not serialize to an object".to_string(),
        });
    };

    if let serde_json::Value::Object(chunk_map) = serde_json::to_value(&chunk.metadata)? {
        for (key, value) in chunk_map {
            merged.insert(key, value);
        }
    }

    merged.insert(
        "document_id".to_string(),
        serde_json::Value::String(document_id.to_string()),
    );

    Ok(serde_json::Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use ragloop_core::{DocumentStatus, RetrievedHit};

    use crate::convert::ConvertedDocument;

    struct StaticConverter {
        markdown: String,
        metadata: DocumentMetadata,
    }

    #[async_trait]
    impl Converter for StaticConverter {
        async fn convert(&self, _path: &Path) -> Result<ConvertedDocument> {
            Ok(ConvertedDocument {
                markdown: self.markdown.clone(),
                metadata: self.metadata.clone(),
            })
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl Converter for FailingConverter {
        async fn convert(&self, path: &Path) -> Result<ConvertedDocument> {
            Err(RagError::Conversion {
                source_name: path.display().to_string(),
                message: "conversion failed".to_string(),
            })
        }
    }

    struct StaticEmbed {
        dimension: usize,
        called: AtomicBool,
    }

    impl StaticEmbed {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                called: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EmbedModel for StaticEmbed {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.called.store(true, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.1; self.dimension]).collect())
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

    #[derive(Default)]
    struct RecordingIndex {
        inserts: Mutex<Vec<(Vec<String>, Vec<Vec<f32>>, Vec<String>, Vec<serde_json::Value>)>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn insert(
            &self,
            ids: Vec<String>,
            vectors: Vec<Vec<f32>>,
            texts: Vec<String>,
            metadatas: Vec<serde_json::Value>,
        ) -> Result<()> {
            self.inserts
                .lock()
                .unwrap()
                .push((ids, vectors, texts, metadatas));
            Ok(())
        }

        async fn search(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<RetrievedHit>> {
            Ok(vec![])
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl VectorIndex for FailingIndex {
        async fn insert(
            &self,
            _ids: Vec<String>,
            _vectors: Vec<Vec<f32>>,
            _texts: Vec<String>,
            _metadatas: Vec<serde_json::Value>,
        ) -> Result<()> {
            Err(RagError::VectorStore {
                operation: "insert".to_string(),
                message: "index unavailable".to_string(),
            })
        }

        async fn search(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<RetrievedHit>> {
            Ok(vec![])
        }
    }

    fn test_metadata() -> DocumentMetadata {
        DocumentMetadata {
            source: "test.pdf".to_string(),
            format: "pdf".to_string(),
            char_count: 30,
            word_count: 6,
        }
    }

    #[tokio::test]
    async fn test_ingest_successful() {
        let index = Arc::new(RecordingIndex::default());
        let ingester = DocumentIngester::new(
            Arc::new(StaticConverter {
                markdown: "# Test Document\n\nThis is a test.".to_string(),
                metadata: test_metadata(),
            }),
            TextChunker::new(5, 1),
            Arc::new(StaticEmbed::new(3)),
            index.clone(),
        );

        let record = ingester.ingest(&PathBuf::from("test.pdf")).await;

        assert_eq!(record.status, DocumentStatus::Completed);
        assert_eq!(record.chunk_count, Some(2));
        assert_eq!(record.source, Some("test.pdf".to_string()));
        assert!(record.error.is_none());

        let inserts = index.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        let (ids, vectors, texts, metadatas) = &inserts[0];
        assert_eq!(ids.len(), 2);
        assert_eq!(vectors.len(), 2);
        assert_eq!(texts[0], "# Test Document This is");
        assert!(metadatas
            .iter()
            .all(|m| m["document_id"] == record.document_id.to_string()));
    }

    #[tokio::test]
    async fn test_ingest_converter_failure_short_circuits() {
        let embed = Arc::new(StaticEmbed::new(3));
        let index = Arc::new(RecordingIndex::default());
        let ingester = DocumentIngester::new(
            Arc::new(FailingConverter),
            TextChunker::default(),
            embed.clone(),
            index.clone(),
        );

        let record = ingester.ingest(&PathBuf::from("broken.pdf")).await;

        assert_eq!(record.status, DocumentStatus::Failed);
        let error = record.error.unwrap();
        assert!(error.contains("conversion failed"));
        assert!(record.chunk_count.is_none());

        // 转换失败后，后续阶段一个都不该执行
        assert!(!embed.called.load(Ordering::SeqCst));
        assert!(index.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_chunker_failure_short_circuits() {
        let embed = Arc::new(StaticEmbed::new(3));
        let index = Arc::new(RecordingIndex::default());
        let ingester = DocumentIngester::new(
            Arc::new(StaticConverter {
                markdown: "some words here".to_string(),
                metadata: test_metadata(),
            }),
            TextChunker::new(10, 10), // 步长为零
            embed.clone(),
            index.clone(),
        );

        let record = ingester.ingest(&PathBuf::from("test.pdf")).await;

        assert_eq!(record.status, DocumentStatus::Failed);
        assert!(record.error.unwrap().contains("分块配置错误"));
        assert!(!embed.called.load(Ordering::SeqCst));
        assert!(index.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_embedding_failure_short_circuits() {
        let index = Arc::new(RecordingIndex::default());
        let ingester = DocumentIngester::new(
            Arc::new(StaticConverter {
                markdown: "some words here".to_string(),
                metadata: test_metadata(),
            }),
            TextChunker::default(),
            Arc::new(FailingEmbed),
            index.clone(),
        );

        let record = ingester.ingest(&PathBuf::from("test.pdf")).await;

        assert_eq!(record.status, DocumentStatus::Failed);
        assert!(record.error.unwrap().contains("embedding failed"));
        assert!(index.inserts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_index_failure_is_terminal_record() {
        let ingester = DocumentIngester::new(
            Arc::new(StaticConverter {
                markdown: "some words here".to_string(),
                metadata: test_metadata(),
            }),
            TextChunker::default(),
            Arc::new(StaticEmbed::new(3)),
            Arc::new(FailingIndex),
        );

        let record = ingester.ingest(&PathBuf::from("test.pdf")).await;

        assert_eq!(record.status, DocumentStatus::Failed);
        assert!(record.error.unwrap().contains("index unavailable"));
    }

    #[tokio::test]
    async fn test_ingest_metadata_merge_precedence() {
        let index = Arc::new(RecordingIndex::default());
        let ingester = DocumentIngester::new(
            Arc::new(StaticConverter {
                markdown: "only a few words".to_string(),
                metadata: test_metadata(),
            }),
            TextChunker::default(),
            Arc::new(StaticEmbed::new(3)),
            index.clone(),
        );

        let record = ingester.ingest(&PathBuf::from("test.pdf")).await;
        assert_eq!(record.status, DocumentStatus::Completed);

        let inserts = index.inserts.lock().unwrap();
        let metadata = &inserts[0].3[0];

        // 块级键覆盖文档级同名键：char_count 是块文本的长度，不是全文的
        assert_eq!(metadata["chunk_index"], 0);
        assert_eq!(metadata["char_count"], "only a few words".len());
        assert_eq!(metadata["format"], "pdf");
        assert_eq!(metadata["source"], "test.pdf");
        assert_eq!(metadata["word_count"], 6);
        assert_eq!(
            metadata["document_id"],
            record.document_id.to_string()
        );
    }

    #[tokio::test]
    async fn test_ingest_empty_document_completes_with_zero_chunks() {
        let index = Arc::new(RecordingIndex::default());
        let ingester = DocumentIngester::new(
            Arc::new(StaticConverter {
                markdown: "   \n\t ".to_string(),
                metadata: test_metadata(),
            }),
            TextChunker::default(),
            Arc::new(StaticEmbed::new(3)),
            index.clone(),
        );

        let record = ingester.ingest(&PathBuf::from("empty.pdf")).await;

        assert_eq!(record.status, DocumentStatus::Completed);
        assert_eq!(record.chunk_count, Some(0));
    }
}
