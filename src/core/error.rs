//! 错误类型
//!
//! 沙箱 / 动作 / 推理服务 / 持久化各自一个错误枚举，统一汇入 AgentError，
//! 由 RecoveryEngine 决定是转成 Observation 让推理端自我修正，还是直接终止运行。

use thiserror::Error;

use crate::llm::LlmError;

/// 沙箱错误：创建、执行、检查、回收
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox setup failed: {0}")]
    Setup(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Execution timed out after {0}s")]
    Timeout(u64),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Failed to spawn interpreter: {0}")]
    Spawn(String),

    #[error("Dataset inspection failed: {0}")]
    Inspect(String),

    #[error("Sandbox teardown failed: {0}")]
    Teardown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// 是否为运行级致命错误（沙箱无法建立 / 数据集无效 / 无法回收）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SandboxError::Setup(_) | SandboxError::InvalidDataset(_) | SandboxError::Teardown(_)
        )
    }
}

/// 动作分发与执行错误
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid arguments for {action}: {reason}")]
    InvalidArguments { action: String, reason: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// 推理服务错误：不可达、超时、输出结构不合法
#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("Reasoning service unavailable: {0}")]
    Transport(String),

    #[error("Reasoning request timed out")]
    Timeout,

    #[error("Malformed reasoning output: {0}")]
    Malformed(String),
}

impl From<LlmError> for ReasoningError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(_) => ReasoningError::Timeout,
            other => ReasoningError::Transport(other.to_string()),
        }
    }
}

/// 持久化（上传 / 落盘）错误
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Artifact not found: {0}")]
    Missing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 运行过程中所有可能的故障，供 RecoveryEngine 分类
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}
