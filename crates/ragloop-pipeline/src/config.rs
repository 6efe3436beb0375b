use std::env;

use ragloop_error::{RagError, Result};
use ragloop_llm::{ChatProviderConfig, EmbedProviderConfig};

/// 运行时配置，从环境变量读取
///
/// 默认值面向本地自托管部署：本机 Ollama + 本机 Qdrant。
/// 配置了 EXTRACT_URL 时摄取走外部抽取服务，否则只收纯文本文件。
#[derive(Debug, Clone)]
pub struct Settings {
    pub ollama_url: String,
    pub model_name: String,
    pub embedding_model: String,
    pub vector_backend: String,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_dimension: u64,
    pub extract_url: Option<String>,
    pub extract_token: Option<String>,
    pub extract_timeout_ms: u64,
    pub extract_retries: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub default_top_k: usize,
    pub max_top_k: usize,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3:8b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            vector_backend: "qdrant".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
            collection_name: "rag_documents".to_string(),
            embedding_dimension: 768,
            extract_url: None,
            extract_token: None,
            extract_timeout_ms: 15_000,
            extract_retries: 2,
            chunk_size: 512,
            chunk_overlap: 50,
            default_top_k: 5,
            max_top_k: 20,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| RagError::Configuration {
            key: key.to_string(),
            reason: format!("invalid value: {:?}", raw),
        }),
        Err(_) => Ok(default),
    }
}

impl Settings {
    /// 读取环境变量并做启动期校验
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            ollama_url: env_or("OLLAMA_URL", &defaults.ollama_url),
            model_name: env_or("MODEL_NAME", &defaults.model_name),
            embedding_model: env_or("EMBEDDING_MODEL", &defaults.embedding_model),
            vector_backend: env_or("VECTOR_BACKEND", &defaults.vector_backend),
            qdrant_url: env_or("QDRANT_URL", &defaults.qdrant_url),
            collection_name: env_or("COLLECTION_NAME", &defaults.collection_name),
            embedding_dimension: env_parse("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            extract_url: env::var("EXTRACT_URL").ok(),
            extract_token: env::var("EXTRACT_TOKEN").ok(),
            extract_timeout_ms: env_parse("EXTRACT_TIMEOUT_MS", defaults.extract_timeout_ms)?,
            extract_retries: env_parse("EXTRACT_RETRIES", defaults.extract_retries)?,
            chunk_size: env_parse("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            default_top_k: env_parse("DEFAULT_TOP_K", defaults.default_top_k)?,
            max_top_k: env_parse("MAX_TOP_K", defaults.max_top_k)?,
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// 启动期校验，配置问题在这里暴露而不是第一次请求时
    pub fn validate(&self) -> Result<()> {
        validate_base_url("OLLAMA_URL", &self.ollama_url)?;
        validate_base_url("QDRANT_URL", &self.qdrant_url)?;
        if let Some(url) = &self.extract_url {
            validate_base_url("EXTRACT_URL", url)?;
        }

        if self.chunk_size == 0 {
            return Err(RagError::Configuration {
                key: "CHUNK_SIZE".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Chunking {
                reason: format!(
                    "chunk_overlap {} must be smaller than chunk_size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }

        if self.vector_backend != "qdrant" && self.vector_backend != "memory" {
            return Err(RagError::Configuration {
                key: "VECTOR_BACKEND".to_string(),
                reason: format!("must be \"qdrant\" or \"memory\": {:?}", self.vector_backend),
            });
        }

        if self.embedding_dimension == 0 {
            return Err(RagError::Configuration {
                key: "EMBEDDING_DIMENSION".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        if self.default_top_k == 0 || self.max_top_k == 0 {
            return Err(RagError::Configuration {
                key: "DEFAULT_TOP_K".to_string(),
                reason: "top_k bounds must be positive".to_string(),
            });
        }
        if self.default_top_k > self.max_top_k {
            return Err(RagError::Configuration {
                key: "DEFAULT_TOP_K".to_string(),
                reason: format!(
                    "default_top_k {} exceeds max_top_k {}",
                    self.default_top_k, self.max_top_k
                ),
            });
        }

        Ok(())
    }

    /// 生成 provider 配置，与原始部署一致走本机 Ollama
    pub fn chat_provider(&self) -> ChatProviderConfig {
        ChatProviderConfig::Ollama {
            base_url: self.ollama_url.clone(),
            model: self.model_name.clone(),
        }
    }

    pub fn embed_provider(&self) -> EmbedProviderConfig {
        EmbedProviderConfig::Ollama {
            base_url: self.ollama_url.clone(),
            model: self.embedding_model.clone(),
        }
    }
}

/// 校验 base url：scheme 必须是 http(s)，显式端口必须在 1..=65535
fn validate_base_url(key: &str, value: &str) -> Result<()> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(RagError::Configuration {
            key: key.to_string(),
            reason: format!("must start with http:// or https://: {:?}", value),
        });
    }

    let authority = value
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .split('/')
        .next()
        .unwrap_or("");

    if let Some((_, port)) = authority.rsplit_once(':') {
        let port: u32 = port.parse().map_err(|_| RagError::Configuration {
            key: key.to_string(),
            reason: format!("invalid port in {:?}", value),
        })?;
        if port == 0 || port > 65_535 {
            return Err(RagError::Configuration {
                key: key.to_string(),
                reason: format!("port out of range in {:?}", value),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_url_without_scheme() {
        let settings = Settings {
            ollama_url: "localhost:11434".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(RagError::Configuration { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        assert!(matches!(
            validate_base_url("QDRANT_URL", "http://localhost:0"),
            Err(RagError::Configuration { .. })
        ));
        assert!(matches!(
            validate_base_url("QDRANT_URL", "http://localhost:70000"),
            Err(RagError::Configuration { .. })
        ));
        assert!(matches!(
            validate_base_url("QDRANT_URL", "http://localhost:abc"),
            Err(RagError::Configuration { .. })
        ));
        validate_base_url("QDRANT_URL", "http://localhost:6334").unwrap();
        validate_base_url("QDRANT_URL", "https://qdrant.internal/path").unwrap();
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_chunk_size() {
        let settings = Settings {
            chunk_size: 50,
            chunk_overlap: 50,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(RagError::Chunking { .. })));
    }

    #[test]
    fn test_rejects_default_top_k_above_max() {
        let settings = Settings {
            default_top_k: 30,
            max_top_k: 20,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(RagError::Configuration { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_vector_backend() {
        let settings = Settings {
            vector_backend: "milvus".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(RagError::Configuration { .. })
        ));
    }

    #[test]
    fn test_providers_point_at_ollama() {
        let settings = Settings::default();
        assert!(matches!(
            settings.chat_provider(),
            ChatProviderConfig::Ollama { .. }
        ));
        assert!(matches!(
            settings.embed_provider(),
            EmbedProviderConfig::Ollama { .. }
        ));
    }
}
