//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::complete；RetryingLlmClient 在调用点
//! 加请求超时与有限次退避重试，只对传输类错误重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 请求本身不合法时重试无意义
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::InvalidRequest(_))
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 调用点重试策略
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            request_timeout_secs: 60,
        }
    }
}

/// 带超时与退避重试的包装客户端
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut last_err = LlmError::EmptyResponse;

        for attempt in 1..=attempts {
            let result = tokio::time::timeout(
                Duration::from_secs(self.config.request_timeout_secs),
                self.inner.complete(messages),
            )
            .await
            .unwrap_or(Err(LlmError::Timeout(self.config.request_timeout_secs)));

            match result {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, max_attempts = attempts, error = %e, "llm call failed, retrying");
                    let wait = match &e {
                        LlmError::RateLimited { retry_after_ms } => {
                            Duration::from_millis(*retry_after_ms).max(backoff)
                        }
                        _ => backoff,
                    };
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyClient {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
        error: LlmError,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            Ok("ok".to_string())
        }
    }

    fn fast_retry(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            request_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_retries_transport_errors_until_success() {
        let flaky = Arc::new(FlakyClient {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
            error: LlmError::Api("503".into()),
        });
        let client = RetryingLlmClient::new(flaky.clone(), fast_retry(3));
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let flaky = Arc::new(FlakyClient {
            failures_left: AtomicUsize::new(10),
            calls: AtomicUsize::new(0),
            error: LlmError::Api("down".into()),
        });
        let client = RetryingLlmClient::new(flaky.clone(), fast_retry(2));
        assert!(client.complete(&[Message::user("hi")]).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_request_not_retried() {
        let flaky = Arc::new(FlakyClient {
            failures_left: AtomicUsize::new(10),
            calls: AtomicUsize::new(0),
            error: LlmError::InvalidRequest("bad".into()),
        });
        let client = RetryingLlmClient::new(flaky.clone(), fast_retry(3));
        assert!(client.complete(&[Message::user("hi")]).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
