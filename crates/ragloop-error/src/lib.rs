use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// 系统统一错误类型
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum RagError {
    // === 业务错误 ===
    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    #[error("请求无效: {reason}")]
    InvalidRequest { reason: String },

    // === 流水线阶段错误 ===
    #[error("文档转换失败 ({source_name}): {message}")]
    Conversion { source_name: String, message: String },

    #[error("分块配置错误: {reason}")]
    Chunking { reason: String },

    #[error("嵌入服务错误 ({provider}): {message}")]
    EmbeddingService {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("生成服务错误 ({provider}): {message}")]
    Generation {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("向量索引错误: {operation} 失败")]
    VectorStore { operation: String, message: String },

    // === 系统错误 ===
    #[error("外部服务不可用: {service}")]
    ServiceUnavailable {
        service: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("配置错误: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("序列化错误: {format}")]
    Serialization { format: String, message: String },

    #[error("网络错误: {operation}")]
    Network { operation: String, message: String },

    #[error("超时错误: {operation} 超过 {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("并发错误: {operation}")]
    Concurrency { operation: String, message: String },

    #[error("内部系统错误: {message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

/// 错误严重级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,      // 可预期的业务错误
    Medium,   // 技术错误但不影响核心功能
    High,     // 影响核心功能的错误
    Critical, // 系统级严重错误
}

impl RagError {
    /// 获取错误的严重级别
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RagError::NotFound { .. } | RagError::InvalidRequest { .. } => ErrorSeverity::Low,
            RagError::Conversion { .. } => ErrorSeverity::Low,
            RagError::EmbeddingService { .. } | RagError::Generation { .. } => {
                ErrorSeverity::Medium
            }
            RagError::ServiceUnavailable { .. }
            | RagError::Network { .. }
            | RagError::Timeout { .. } => ErrorSeverity::Medium,
            RagError::VectorStore { .. }
            | RagError::Serialization { .. }
            | RagError::Concurrency { .. } => ErrorSeverity::High,
            RagError::Chunking { .. }
            | RagError::Configuration { .. }
            | RagError::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::ServiceUnavailable { retry_after, .. } => retry_after.is_some(),
            RagError::EmbeddingService { retry_after, .. }
            | RagError::Generation { retry_after, .. } => retry_after.is_some(),
            RagError::Network { .. } | RagError::Timeout { .. } => true,
            RagError::Concurrency { .. } => true,
            _ => false,
        }
    }

    /// 获取重试延迟时间
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            RagError::ServiceUnavailable { retry_after, .. }
            | RagError::EmbeddingService { retry_after, .. }
            | RagError::Generation { retry_after, .. } => *retry_after,
            RagError::Network { .. } => Some(std::time::Duration::from_millis(500)),
            RagError::Timeout { .. } => Some(std::time::Duration::from_millis(1000)),
            RagError::Concurrency { .. } => Some(std::time::Duration::from_millis(100)),
            _ => None,
        }
    }

    /// 转换为 HTTP 状态码
    pub fn to_http_status(&self) -> u16 {
        match self {
            RagError::NotFound { .. } => 404,
            RagError::InvalidRequest { .. } => 400,
            RagError::Chunking { .. } => 400,
            RagError::ServiceUnavailable { .. } => 503,
            RagError::Timeout { .. } => 408,
            _ => 500,
        }
    }

    /// 获取用户友好的错误消息
    pub fn user_message(&self) -> String {
        match self {
            RagError::NotFound { .. } => "请求的资源不存在".to_string(),
            RagError::InvalidRequest { .. } => "请求参数有误，请检查后重试".to_string(),
            RagError::Conversion { .. } => "文档无法解析，请检查文件格式".to_string(),
            RagError::Chunking { .. } => "分块参数无效，请检查配置".to_string(),
            RagError::ServiceUnavailable { .. } => "服务暂时不可用，请稍后重试".to_string(),
            RagError::Timeout { .. } => "请求超时，请重试".to_string(),
            _ => "系统内部错误，请联系管理员".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

// === 转换实现 ===

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RagError::Timeout {
                operation: "http_request".to_string(),
                timeout_ms: 30000, // 默认超时时间
            }
        } else if err.is_connect() {
            RagError::Network {
                operation: "connect".to_string(),
                message: err.to_string(),
            }
        } else {
            RagError::Network {
                operation: "http_request".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<qdrant_client::QdrantError> for RagError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        RagError::VectorStore {
            operation: "qdrant_client".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for RagError {
    fn from(err: tokio::task::JoinError) -> Self {
        RagError::Concurrency {
            operation: "task_join".to_string(),
            message: err.to_string(),
        }
    }
}

// Axum integration
#[cfg(feature = "axum")]
impl IntoResponse for RagError {
    fn into_response(self) -> axum::response::Response {
        let status_code = StatusCode::from_u16(self.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "error": self.to_string(),
            "message": self.user_message()
        });

        (status_code, Json(body)).into_response()
    }
}
