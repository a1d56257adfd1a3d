//! 运行历史：只追加的 turn 日志，由编排循环独占写入
//!
//! 插入顺序即推理端每轮看到的上下文顺序；整段历史可序列化，用于调试回放。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::Observation;

/// turn 的角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnRole {
    Instruction,
    AssistantDecision,
    ActionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnPayload {
    /// 任务指令、可选问题背景、分解出的子任务与初始数据集描述
    Instruction {
        text: String,
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        subtasks: Vec<String>,
        dataset: String,
    },
    /// 推理端的决策；结束时 action 为 "finish"
    Decision {
        #[serde(default)]
        thought: Option<String>,
        action: String,
        #[serde(default)]
        args: Value,
    },
    ActionResult {
        action: String,
        #[serde(default)]
        args: Value,
        observation: Observation,
    },
    /// run_code 之后数据集结构发生了变化
    DatasetChanged { description: String },
    Reflection {
        is_solved: bool,
        #[serde(default)]
        issues: Option<String>,
    },
    /// 反思给出的问题，作为下一轮 Plan 的修正上下文
    Correction { issues: String },
}

impl TurnPayload {
    pub fn role(&self) -> TurnRole {
        match self {
            TurnPayload::Instruction { .. } | TurnPayload::Correction { .. } => TurnRole::Instruction,
            TurnPayload::Decision { .. } | TurnPayload::Reflection { .. } => TurnRole::AssistantDecision,
            TurnPayload::ActionResult { .. } | TurnPayload::DatasetChanged { .. } => {
                TurnRole::ActionResult
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub index: usize,
    /// 写入时的 step
    pub step: usize,
    pub at: DateTime<Utc>,
    pub role: TurnRole,
    #[serde(flatten)]
    pub payload: TurnPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, step: usize, payload: TurnPayload) -> &Turn {
        let index = self.turns.len();
        self.turns.push(Turn {
            index,
            step,
            at: Utc::now(),
            role: payload.role(),
            payload,
        });
        &self.turns[index]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

/// 最近一次 run_code 失败且之后没有成功的 run_code 时，返回 (代码, 错误信息)
pub fn last_failed_code(turns: &[Turn]) -> Option<(String, String)> {
    let last = turns.iter().rev().find_map(|t| match &t.payload {
        TurnPayload::ActionResult {
            action,
            args,
            observation,
        } if action == "run_code" => Some((args, observation)),
        _ => None,
    })?;
    match last {
        (args, Observation::Error { message, detail, .. }) => {
            let code = args.get("code")?.as_str()?.to_string();
            let error = match detail {
                Some(d) => format!("{}\n{}", message, d),
                None => message.clone(),
            };
            Some((code, error))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ErrorKind;
    use serde_json::json;

    fn run_code(history: &mut History, code: &str, observation: Observation) {
        history.push(
            1,
            TurnPayload::ActionResult {
                action: "run_code".into(),
                args: json!({ "code": code }),
                observation,
            },
        );
    }

    #[test]
    fn test_indices_and_roles() {
        let mut h = History::new();
        h.push(0, TurnPayload::Correction { issues: "x".into() });
        h.push(
            0,
            TurnPayload::Decision {
                thought: None,
                action: "finish".into(),
                args: Value::Null,
            },
        );
        assert_eq!(h.turns()[1].index, 1);
        assert_eq!(h.turns()[0].role, TurnRole::Instruction);
        assert_eq!(h.turns()[1].role, TurnRole::AssistantDecision);
    }

    #[test]
    fn test_last_failed_code_cleared_by_later_success() {
        let mut h = History::new();
        run_code(&mut h, "bad()", Observation::error(ErrorKind::Execution, "NameError"));
        assert_eq!(
            last_failed_code(h.turns()),
            Some(("bad()".to_string(), "NameError".to_string()))
        );
        run_code(&mut h, "good()", Observation::ok("fine"));
        assert_eq!(last_failed_code(h.turns()), None);
    }

    #[test]
    fn test_history_serializes_in_order() {
        let mut h = History::new();
        h.push(0, TurnPayload::DatasetChanged { description: "d".into() });
        run_code(&mut h, "x", Observation::ok("1"));
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["turns"][0]["kind"], "dataset_changed");
        assert_eq!(json["turns"][1]["role"], "action-result");
        assert_eq!(json["turns"][1]["observation"]["status"], "ok");
    }
}
