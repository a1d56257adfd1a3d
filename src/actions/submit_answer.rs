//! submit_answer：自愿结束运行的唯一动作，除标记结束外没有副作用

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::actions::registry::{parse_args, schema_of};
use crate::actions::{Action, ActionOutput};
use crate::core::ActionError;
use crate::sandbox::Sandbox;

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct SubmitAnswerArgs {
    /// 对完成情况的简短说明
    #[serde(default)]
    pub answer: Option<String>,
}

pub struct SubmitAnswerAction;

#[async_trait]
impl Action for SubmitAnswerAction {
    fn name(&self) -> &str {
        "submit_answer"
    }

    fn description(&self) -> &str {
        "Declare the task complete. Call this once every subtask is done."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SubmitAnswerArgs>()
    }

    async fn execute(&self, args: Value, _sandbox: &mut Sandbox) -> Result<ActionOutput, ActionError> {
        let args: SubmitAnswerArgs = parse_args(self.name(), args)?;
        Ok(ActionOutput::Submitted(
            args.answer
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| "Answer submitted.".to_string()),
        ))
    }
}
