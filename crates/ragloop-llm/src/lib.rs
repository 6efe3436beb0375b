use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use ragloop_error::{RagError, Result};

/// 生成模型网关：问题 + 检索上下文 -> 回答文本
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, question: &str, context: &str) -> Result<String>;
}

/// 嵌入模型网关：文本批次 -> 向量批次，等长同序
#[async_trait]
pub trait EmbedModel: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ========== Ollama (native API) ==========

/// 生成请求的最大等待时间，本地大模型推理可能很慢
const CHAT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct OllamaConfig {
    pub base_url: String,                // e.g. http://localhost:11434
    pub chat_model: String,              // e.g. llama3:8b
    pub embedding_model: Option<String>, // e.g. nomic-embed-text
}

#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    cfg: OllamaConfig,
}

impl OllamaClient {
    pub fn new(cfg: OllamaConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }

    /// 把问题和上下文拼成检索增强提示词
    fn rag_prompt(question: &str, context: &str) -> String {
        format!(
            "Use the following context to answer the question.\n\n\
             Context:\n{}\n\n\
             Question:\n{}\n\n\
             Answer:",
            context, question
        )
    }
}

#[derive(Serialize)]
struct OllamaChatMsg {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OllamaChatReq {
    model: String,
    messages: Vec<OllamaChatMsg>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatRespMsg {
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResp {
    message: OllamaChatRespMsg,
}

#[async_trait]
impl ChatModel for OllamaClient {
    #[instrument(skip(self, question, context))]
    async fn chat(&self, question: &str, context: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.cfg.base_url.trim_end_matches('/'));
        let body = OllamaChatReq {
            model: self.cfg.chat_model.clone(),
            messages: vec![OllamaChatMsg {
                role: "user",
                content: Self::rag_prompt(question, context),
            }],
            stream: false,
        };

        let resp = self
            .http
            .post(url)
            .timeout(CHAT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Network {
                operation: "ollama_chat".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(RagError::Generation {
                provider: "ollama".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: OllamaChatResp = resp.json().await.map_err(|e| RagError::Network {
            operation: "ollama_chat".to_string(),
            message: e.to_string(),
        })?;
        Ok(data.message.content)
    }
}

#[derive(Serialize)]
struct OllamaEmbedReq {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OllamaEmbedResp {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbedModel for OllamaClient {
    #[instrument(skip(self, texts))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self
            .cfg
            .embedding_model
            .clone()
            .ok_or_else(|| RagError::Configuration {
                key: "embedding_model".to_string(),
                reason: "not configured".to_string(),
            })?;
        let url = format!("{}/api/embed", self.cfg.base_url.trim_end_matches('/'));
        let body = OllamaEmbedReq {
            model,
            input: texts.to_vec(),
        };

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Network {
                operation: "ollama_embed".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingService {
                provider: "ollama".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: OllamaEmbedResp = resp.json().await.map_err(|e| RagError::Network {
            operation: "ollama_embed".to_string(),
            message: e.to_string(),
        })?;
        Ok(data.embeddings)
    }
}

// ========== OpenAI-compatible (covers OpenAI, DeepSeek, vLLM gateways) ==========

/// 要求模型只依据检索上下文作答的系统提示词
const GROUNDING_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question \
based on the provided context. If the context doesn't contain enough information to answer the \
question, say so clearly.";

#[derive(Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String,                // e.g. https://api.openai.com
    pub api_key: String,                 // Bearer token
    pub chat_model: String,              // e.g. gpt-4o
    pub embedding_model: Option<String>, // e.g. text-embedding-3-small
}

#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    cfg: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(cfg: OpenAiCompatConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }
}

#[derive(Serialize)]
struct OaiChatReqMsg {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OaiChatReq {
    model: String,
    messages: Vec<OaiChatReqMsg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct OaiChatRespChoiceMsg {
    content: String,
}

#[derive(Deserialize)]
struct OaiChatRespChoice {
    message: OaiChatRespChoiceMsg,
}

#[derive(Deserialize)]
struct OaiChatResp {
    choices: Vec<OaiChatRespChoice>,
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    #[instrument(skip(self, question, context))]
    async fn chat(&self, question: &str, context: &str) -> Result<String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let body = OaiChatReq {
            model: self.cfg.chat_model.clone(),
            messages: vec![
                OaiChatReqMsg {
                    role: "system".into(),
                    content: GROUNDING_SYSTEM_PROMPT.to_string(),
                },
                OaiChatReqMsg {
                    role: "user".into(),
                    content: format!("{}\n\nContext:\n{}", question, context),
                },
            ],
            temperature: Some(0.2),
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .timeout(CHAT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Network {
                operation: "http_request".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(RagError::Generation {
                provider: "openai_compat".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: OaiChatResp = resp.json().await.map_err(|e| RagError::Network {
            operation: "http_request".to_string(),
            message: e.to_string(),
        })?;
        let content = data
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content)
    }
}

#[derive(Serialize)]
struct OaiEmbedReq {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OaiEmbedData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OaiEmbedResp {
    data: Vec<OaiEmbedData>,
}

#[async_trait]
impl EmbedModel for OpenAiCompatClient {
    #[instrument(skip(self, texts))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self
            .cfg
            .embedding_model
            .clone()
            .ok_or_else(|| RagError::Configuration {
                key: "embedding_model".to_string(),
                reason: "not configured".to_string(),
            })?;
        let url = format!("{}/v1/embeddings", self.cfg.base_url.trim_end_matches('/'));
        let body = OaiEmbedReq {
            model,
            input: texts.to_vec(),
        };

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Network {
                operation: "http_request".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingService {
                provider: "openai_compat".to_string(),
                message: format!("status={} body={}", status, txt),
                retry_after: None,
            });
        }

        let data: OaiEmbedResp = resp.json().await.map_err(|e| RagError::Network {
            operation: "http_request".to_string(),
            message: e.to_string(),
        })?;
        Ok(data.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ========== Provider Factory & Config ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChatProviderConfig {
    #[serde(rename = "ollama")]
    Ollama { base_url: String, model: String },
    #[serde(rename = "openai_compat")]
    OpenAiCompat {
        base_url: String,
        api_key: String,
        model: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EmbedProviderConfig {
    #[serde(rename = "ollama")]
    Ollama { base_url: String, model: String },
    #[serde(rename = "openai_compat")]
    OpenAiCompat {
        base_url: String,
        api_key: String,
        model: String,
    },
}

pub struct Providers {
    pub chat: Arc<dyn ChatModel>,
    pub embed: Arc<dyn EmbedModel>,
}

pub fn make_providers(chat: ChatProviderConfig, embed: EmbedProviderConfig) -> Providers {
    let chat_arc: Arc<dyn ChatModel> = match chat {
        ChatProviderConfig::Ollama { base_url, model } => Arc::new(OllamaClient::new(OllamaConfig {
            base_url,
            chat_model: model,
            embedding_model: None,
        })),
        ChatProviderConfig::OpenAiCompat {
            base_url,
            api_key,
            model,
        } => Arc::new(OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url,
            api_key,
            chat_model: model,
            embedding_model: None,
        })),
    };

    let embed_arc: Arc<dyn EmbedModel> = match embed {
        EmbedProviderConfig::Ollama { base_url, model } => {
            Arc::new(OllamaClient::new(OllamaConfig {
                base_url,
                chat_model: String::new(),
                embedding_model: Some(model),
            }))
        }
        EmbedProviderConfig::OpenAiCompat {
            base_url,
            api_key,
            model,
        } => Arc::new(OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url,
            api_key,
            chat_model: String::new(),
            embedding_model: Some(model),
        })),
    };

    Providers {
        chat: chat_arc,
        embed: embed_arc,
    }
}
