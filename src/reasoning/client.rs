//! 推理端边界：decide / decompose / reflect
//!
//! 三个调用都被当作不可靠的远程调用：可能慢、可能返回结构不合法的输出，结果必须先校验再使用。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::ActionSpec;
use crate::core::ReasoningError;
use crate::engine::Turn;
use crate::sandbox::DatasetSnapshot;

/// 单次规划调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Invoke {
        action: String,
        args: Value,
        thought: Option<String>,
    },
    Finish {
        thought: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReflectionVerdict {
    pub is_solved: bool,
    #[serde(default)]
    pub issues: Option<String>,
}

/// 反思的全部输入；相同输入必须得到相同判定
#[derive(Debug, Clone, Copy)]
pub struct ReflectionInput<'a> {
    pub instruction: &'a str,
    pub subtasks: &'a [String],
    pub initial_snapshot: &'a DatasetSnapshot,
    pub final_snapshot: &'a DatasetSnapshot,
    pub code_history: &'a [String],
}

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn decide(
        &self,
        history: &[Turn],
        actions: &[ActionSpec],
        snapshot: &DatasetSnapshot,
    ) -> Result<Decision, ReasoningError>;

    /// 返回空列表表示没有可用的分解
    async fn decompose(
        &self,
        instruction: &str,
        snapshot: &DatasetSnapshot,
    ) -> Result<Vec<String>, ReasoningError>;

    async fn reflect(&self, input: &ReflectionInput<'_>) -> Result<ReflectionVerdict, ReasoningError>;
}
