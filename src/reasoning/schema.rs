//! 推理输出格式与 JSON Schema（schemars 生成，注入 system prompt 以减少格式错误）

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// 规划调用的回复格式
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DecisionFormat {
    /// 简短推理过程
    #[serde(default)]
    pub thought: Option<String>,
    /// 动作名，或 "finish" 表示任务已完成
    pub action: String,
    /// 动作参数，结构见各动作的 argument_schema
    #[serde(default)]
    pub args: Value,
}

/// 分解调用的回复格式
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DecompositionFormat {
    /// 有序的子任务，每条一句话
    pub subtasks: Vec<String>,
}

/// 反思调用的回复格式
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReflectionFormat {
    pub is_solved: bool,
    /// 未解决时说明具体问题
    #[serde(default)]
    pub issues: Option<String>,
}

fn pretty<T: JsonSchema>() -> String {
    serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_default()
}

pub fn decision_schema_json() -> String {
    pretty::<DecisionFormat>()
}

pub fn decomposition_schema_json() -> String {
    pretty::<DecompositionFormat>()
}

pub fn reflection_schema_json() -> String {
    pretty::<ReflectionFormat>()
}
