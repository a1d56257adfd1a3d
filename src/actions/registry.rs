//! 动作注册表
//!
//! 所有动作实现 Action trait（name / description / parameters_schema / execute），由 ActionRegistry
//! 按注册顺序保存。注册表在运行开始时确定，运行期间不变；未注册的名字是类型化错误。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::ActionError;
use crate::sandbox::Sandbox;

/// 动作执行的成功结果
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// 普通结果，作为 ok observation 写入历史
    Payload(String),
    /// submit_answer：自愿结束的唯一信号
    Submitted(String),
}

/// 动作 trait：名称、描述（供推理端理解）、参数 schema、在沙箱上异步执行
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认表示无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value, sandbox: &mut Sandbox) -> Result<ActionOutput, ActionError>;
}

/// 对外可枚举的动作描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    pub argument_schema: Value,
}

/// 固定、有序的动作集合
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: Vec<Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// run_code / query_schema / list_files / read_file / submit_answer
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(super::RunCodeAction);
        registry.register(super::QuerySchemaAction);
        registry.register(super::ListFilesAction);
        registry.register(super::ReadFileAction);
        registry.register(super::SubmitAnswerAction);
        registry
    }

    /// 同名动作会替换原有项（保持原位置）
    pub fn register(&mut self, action: impl Action + 'static) {
        let action: Arc<dyn Action> = Arc::new(action);
        match self.actions.iter().position(|a| a.name() == action.name()) {
            Some(i) => self.actions[i] = action,
            None => self.actions.push(action),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.iter().find(|a| a.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn specs(&self) -> Vec<ActionSpec> {
        self.actions
            .iter()
            .map(|a| ActionSpec {
                name: a.name().to_string(),
                description: a.description().to_string(),
                argument_schema: a.parameters_schema(),
            })
            .collect()
    }

    pub fn to_schema_json(&self) -> String {
        serde_json::to_string_pretty(&self.specs()).unwrap_or_else(|_| "[]".to_string())
    }
}

/// 由参数结构体生成 JSON Schema
pub(crate) fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// 解析参数；null 视为空对象
pub(crate) fn parse_args<T: DeserializeOwned>(action: &str, args: Value) -> Result<T, ActionError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| ActionError::InvalidArguments {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_is_ordered_and_enumerable() {
        let registry = ActionRegistry::standard();
        assert_eq!(
            registry.names(),
            vec!["run_code", "query_schema", "list_files", "read_file", "submit_answer"]
        );
        assert!(registry.get("delete_everything").is_none());

        let specs = registry.specs();
        let run_code = specs.iter().find(|s| s.name == "run_code").unwrap();
        assert!(run_code.argument_schema["properties"]["code"].is_object());
        assert!(registry.to_schema_json().contains("argument_schema"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ActionRegistry::standard();
        registry.register(super::super::RunCodeAction);
        assert_eq!(registry.names().len(), 5);
        assert_eq!(registry.names()[0], "run_code");
    }

    #[test]
    fn test_parse_args_reports_action() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Needs {
            code: String,
        }
        let err = parse_args::<Needs>("run_code", serde_json::json!({})).err().unwrap();
        match err {
            ActionError::InvalidArguments { action, reason } => {
                assert_eq!(action, "run_code");
                assert!(reason.contains("code"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
