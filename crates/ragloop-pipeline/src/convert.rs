use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ragloop_core::DocumentMetadata;
use ragloop_error::{RagError, Result};
use tracing::instrument;

/// 转换结果：markdown 文本 + 文档级元数据
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub markdown: String,
    pub metadata: DocumentMetadata,
}

/// 文档转换网关：文件 -> (markdown, 元数据)
///
/// 流水线只依赖这个契约，具体格式解析交给适配器背后的引擎。
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument>;
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload.bin")
        .to_string()
}

fn format_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

fn document_metadata(path: &Path, markdown: &str) -> DocumentMetadata {
    DocumentMetadata {
        source: file_name_of(path),
        format: format_of(path),
        char_count: markdown.chars().count(),
        word_count: markdown.split_whitespace().count(),
    }
}

// ========== 外部抽取服务 ==========

/// 通过外部抽取服务转换文档
///
/// 服务接收原始文件字节，返回 markdown 文本。429 和 5xx 按
/// 指数退避重试，其余状态直接失败。
pub struct ExtractServiceConverter {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
    retries: usize,
}

const RETRY_BASE: Duration = Duration::from_millis(250);

impl ExtractServiceConverter {
    pub fn new(url: String, token: Option<String>, timeout_ms: u64, retries: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            token,
            timeout: Duration::from_millis(timeout_ms),
            retries,
        }
    }

    async fn extract_bytes(&self, filename: &str, ext: &str, data: &[u8]) -> Result<String> {
        let mut backoff = RETRY_BASE;
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let mut rb = self
                .http
                .post(&self.url)
                .header("Content-Type", "application/octet-stream")
                .header("X-Filename", filename)
                .timeout(self.timeout)
                .body(data.to_vec());

            if let Some(token) = &self.token {
                rb = rb.bearer_auth(token);
            }

            if !ext.is_empty() {
                rb = rb.header("X-File-Ext", ext);
            }

            match rb.send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().await.map_err(|e| RagError::Network {
                        operation: "extract_response_read".to_string(),
                        message: e.to_string(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt <= self.retries + 1 {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                        continue;
                    }
                    return Err(RagError::ServiceUnavailable {
                        service: format!("extract_service ({})", status),
                        retry_after: if retryable {
                            Some(Duration::from_secs(30))
                        } else {
                            None
                        },
                    });
                }
                Err(e) => {
                    if attempt <= self.retries + 1 {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                        continue;
                    }
                    return Err(RagError::Network {
                        operation: "extract_request".to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl Converter for ExtractServiceConverter {
    #[instrument(skip(self))]
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument> {
        let filename = file_name_of(path);
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::Conversion {
                source_name: filename.clone(),
                message: format!("failed to read file: {}", e),
            })?;

        // 对流水线统一呈现为转换失败，重试细节留在日志里
        let markdown = self
            .extract_bytes(&filename, &format_of(path), &data)
            .await
            .map_err(|e| RagError::Conversion {
                source_name: filename.clone(),
                message: e.to_string(),
            })?;

        Ok(ConvertedDocument {
            metadata: document_metadata(path, &markdown),
            markdown,
        })
    }
}

// ========== 本地纯文本直读 ==========

/// markdown / 纯文本文件直读转换器，worker 与测试使用
pub struct MarkdownFileConverter;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

#[async_trait]
impl Converter for MarkdownFileConverter {
    #[instrument(skip(self))]
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument> {
        let filename = file_name_of(path);
        let format = format_of(path);
        if !PLAIN_TEXT_EXTENSIONS.contains(&format.as_str()) {
            return Err(RagError::Conversion {
                source_name: filename,
                message: format!("unsupported format: {:?}", format),
            });
        }

        let markdown = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagError::Conversion {
                source_name: filename,
                message: e.to_string(),
            })?;

        Ok(ConvertedDocument {
            metadata: document_metadata(path, &markdown),
            markdown,
        })
    }
}
