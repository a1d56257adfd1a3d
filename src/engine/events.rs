//! 运行过程事件：供 CLI / 前端流式展示步数、决策、观察、反思与最终结果

use serde::Serialize;
use serde_json::Value;

use crate::actions::Observation;
use crate::core::RunStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    StepUpdate { step: usize, max_steps: usize },
    /// 分解得到的子任务
    Subtasks { items: Vec<String> },
    /// 正在调用推理端
    Thinking,
    Decision {
        thought: Option<String>,
        action: String,
        args: Value,
    },
    Observation {
        action: String,
        observation: Observation,
    },
    Reflection {
        is_solved: bool,
        issues: Option<String>,
    },
    /// 恢复动作（重试 / 终止）
    Recovery { action: String, detail: String },
    Finished {
        status: RunStatus,
        steps: usize,
        retries: usize,
        error: Option<String>,
    },
}
