//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置的回复；脚本用完后返回一个同时满足决策 / 分解 / 反思格式的 JSON，
//! 让本地不配 API Key 也能跑通整个流程（直接结束、不分解、判定已解决）。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

const FALLBACK_REPLY: &str =
    r#"{"thought": "mock reasoning", "action": "finish", "subtasks": [], "is_solved": true, "issues": null}"#;

/// Mock 客户端：脚本化回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 已被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|_| LlmError::Api("mock script poisoned".to_string()))?
            .pop_front();
        Ok(next.unwrap_or_else(|| FALLBACK_REPLY.to_string()))
    }
}
