//! query_schema：读取数据集当前结构，可按表 / 列 / 样例行数投影

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::actions::registry::{parse_args, schema_of};
use crate::actions::{Action, ActionOutput};
use crate::core::ActionError;
use crate::sandbox::Sandbox;

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct QuerySchemaArgs {
    /// 只看这一张表
    #[serde(default)]
    pub table: Option<String>,
    /// 只保留这些列
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// 最多返回的样例行数
    #[serde(default)]
    pub sample_rows: Option<usize>,
}

pub struct QuerySchemaAction;

#[async_trait]
impl Action for QuerySchemaAction {
    fn name(&self) -> &str {
        "query_schema"
    }

    fn description(&self) -> &str {
        "Describe the current dataset: tables, columns, row counts and sample rows. Optional filters: table, columns, sample_rows."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<QuerySchemaArgs>()
    }

    /// 过滤条件对不上时不算失败：说明原因并返回完整结构，推理端据此改用正确的名字
    async fn execute(&self, args: Value, sandbox: &mut Sandbox) -> Result<ActionOutput, ActionError> {
        let args: QuerySchemaArgs = parse_args(self.name(), args)?;
        let snapshot = sandbox.inspect().await?;
        if args.columns.is_some() && args.table.is_none() {
            return Ok(ActionOutput::Payload(format!(
                "A column filter needs a table name; showing the whole dataset.\n\n{}",
                snapshot.describe()
            )));
        }
        let text = match snapshot.project(args.table.as_deref(), args.columns.as_deref(), args.sample_rows) {
            Ok(projected) => projected.describe(),
            Err(reason) => {
                tracing::debug!(reason = %reason, "query_schema filter did not match");
                format!("{}\n\n{}", reason, snapshot.describe())
            }
        };
        Ok(ActionOutput::Payload(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::tests::{dataset_file, sh_config};
    use serde_json::json;

    fn inspecting_sandbox(dir: &std::path::Path) -> Sandbox {
        let mut cfg = sh_config();
        cfg.inspect_script = Some(
            r#"echo '{"tables":[{"name":"Sales","columns":[{"name":"region","dtype":"str"},{"name":"amount","dtype":"int"}],"row_count":3,"sample_rows":[["north",10],["south",7]]}]}'"#
                .to_string(),
        );
        Sandbox::create(&cfg, None, &dataset_file(dir)).unwrap()
    }

    #[tokio::test]
    async fn test_full_snapshot() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = inspecting_sandbox(src.path());
        let out = QuerySchemaAction.execute(json!({}), &mut sb).await.unwrap();
        match out {
            ActionOutput::Payload(text) => {
                assert!(text.contains("Table \"Sales\" has 3 rows"));
                assert!(text.contains("data/sales.csv"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_projection_and_unknown_column() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = inspecting_sandbox(src.path());
        let out = QuerySchemaAction
            .execute(json!({"table": "Sales", "columns": ["amount"], "sample_rows": 1}), &mut sb)
            .await
            .unwrap();
        assert_eq!(
            out,
            ActionOutput::Payload(
                "Table \"Sales\" has 3 rows (including the header row) and 1 columns (A(1): \"amount\" (int)). Here is a table snapshot:\n| 10 |\n"
                    .to_string()
            )
        );
        let out = QuerySchemaAction
            .execute(json!({"table": "Sales", "columns": ["nope"]}), &mut sb)
            .await
            .unwrap();
        match out {
            ActionOutput::Payload(text) => {
                assert!(text.starts_with("Unknown column 'nope' in table 'Sales'"));
                assert!(text.contains("\"region\", \"amount\""));
                assert!(text.contains("Table \"Sales\" has 3 rows"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_table_and_missing_table_still_succeed() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = inspecting_sandbox(src.path());
        let out = QuerySchemaAction.execute(json!({"table": "Costs"}), &mut sb).await.unwrap();
        match out {
            ActionOutput::Payload(text) => {
                assert!(text.starts_with("Unknown table 'Costs'. Available tables: [\"Sales\"]"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let out = QuerySchemaAction
            .execute(json!({"columns": ["amount"]}), &mut sb)
            .await
            .unwrap();
        match out {
            ActionOutput::Payload(text) => {
                assert!(text.starts_with("A column filter needs a table name"));
                assert!(text.contains("Table \"Sales\""));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
