//! run_code：在沙箱内执行一段生成代码

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::actions::registry::{parse_args, schema_of};
use crate::actions::{Action, ActionOutput};
use crate::core::ActionError;
use crate::sandbox::Sandbox;

const NO_OUTPUT: &str = "Code executed successfully with no output.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunCodeArgs {
    /// 完整代码片段；数据集路径可从环境变量 DATASET_PATH 取得
    pub code: String,
}

pub struct RunCodeAction;

#[async_trait]
impl Action for RunCodeAction {
    fn name(&self) -> &str {
        "run_code"
    }

    fn description(&self) -> &str {
        "Execute a code snippet against the dataset. State from earlier successful snippets is kept. Returns stdout."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<RunCodeArgs>()
    }

    async fn execute(&self, args: Value, sandbox: &mut Sandbox) -> Result<ActionOutput, ActionError> {
        let args: RunCodeArgs = parse_args(self.name(), args)?;
        if args.code.trim().is_empty() {
            return Err(ActionError::InvalidArguments {
                action: self.name().to_string(),
                reason: "code is empty".to_string(),
            });
        }
        let output = sandbox.execute(&args.code).await?;
        let output = output.trim_end();
        Ok(ActionOutput::Payload(if output.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            output.to_string()
        }))
    }
}
