//! 只读文件动作：list_files / read_file，路径经 PathGuard 校验必须在私有根目录内

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::actions::registry::{parse_args, schema_of};
use crate::actions::{Action, ActionOutput};
use crate::core::{ActionError, SandboxError};
use crate::sandbox::Sandbox;

const DEFAULT_READ_CHARS: usize = 4000;

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// 相对私有根目录的子目录，缺省为根目录
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    pub path: String,
    #[serde(default)]
    pub max_chars: Option<usize>,
}

/// 列出目录（目录名带 `/` 后缀，隐藏项跳过）
pub struct ListFilesAction;

#[async_trait]
impl Action for ListFilesAction {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in the working directory or one of its subdirectories."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ListFilesArgs>()
    }

    async fn execute(&self, args: Value, sandbox: &mut Sandbox) -> Result<ActionOutput, ActionError> {
        let args: ListFilesArgs = parse_args(self.name(), args)?;
        let base = match args.path.as_deref().map(str::trim) {
            None | Some("") | Some(".") => sandbox.root().to_path_buf(),
            Some(p) => sandbox.guard().resolve(p)?,
        };
        if !base.is_dir() {
            return Err(SandboxError::Execution(format!("Not a directory: {}", base.display())).into());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&base).map_err(SandboxError::from)? {
            let entry = entry.map_err(SandboxError::from)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().map_err(SandboxError::from)?;
            if meta.is_dir() {
                entries.push(format!("{}/", name));
            } else {
                entries.push(format!("{} ({} bytes)", name, meta.len()));
            }
        }
        entries.sort();
        Ok(ActionOutput::Payload(if entries.is_empty() {
            "(empty directory)".to_string()
        } else {
            entries.join("\n")
        }))
    }
}

/// 读取文本文件，超出 max_chars 截断
pub struct ReadFileAction;

#[async_trait]
impl Action for ReadFileAction {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file inside the working directory (e.g. a CSV export). Binary files are rejected."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ReadFileArgs>()
    }

    async fn execute(&self, args: Value, sandbox: &mut Sandbox) -> Result<ActionOutput, ActionError> {
        let args: ReadFileArgs = parse_args(self.name(), args)?;
        let path = sandbox.guard().resolve(&args.path)?;
        let bytes = tokio::fs::read(&path).await.map_err(SandboxError::from)?;
        let text = String::from_utf8(bytes).map_err(|_| {
            SandboxError::Execution(format!("{} is not a UTF-8 text file; use run_code to read it", args.path))
        })?;

        let max = args.max_chars.unwrap_or(DEFAULT_READ_CHARS);
        let total = text.chars().count();
        if total <= max {
            return Ok(ActionOutput::Payload(text));
        }
        let head: String = text.chars().take(max).collect();
        Ok(ActionOutput::Payload(format!(
            "{}\n... ({} of {} chars shown)",
            head, max, total
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::tests::{dataset_file, sh_config};
    use serde_json::json;

    fn sandbox(dir: &std::path::Path) -> Sandbox {
        Sandbox::create(&sh_config(), None, &dataset_file(dir)).unwrap()
    }

    #[tokio::test]
    async fn test_list_root_and_subdir() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = sandbox(src.path());
        let out = ListFilesAction.execute(json!({}), &mut sb).await.unwrap();
        assert_eq!(out, ActionOutput::Payload("data/".to_string()));
        let out = ListFilesAction.execute(json!({"path": "data"}), &mut sb).await.unwrap();
        assert_eq!(out, ActionOutput::Payload("sales.csv (23 bytes)".to_string()));
    }

    #[tokio::test]
    async fn test_read_file_truncates() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = sandbox(src.path());
        let out = ReadFileAction
            .execute(json!({"path": "data/sales.csv", "max_chars": 6}), &mut sb)
            .await
            .unwrap();
        match out {
            ActionOutput::Payload(text) => assert!(text.starts_with("region\n... (6 of 23")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_escape_rejected() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = sandbox(src.path());
        let err = ReadFileAction
            .execute(json!({"path": "../../../../etc/passwd"}), &mut sb)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Sandbox(SandboxError::PathEscape(_))));
        let err = ListFilesAction.execute(json!({"path": "/"}), &mut sb).await.unwrap_err();
        assert!(matches!(err, ActionError::Sandbox(SandboxError::PathEscape(_))));
    }
}
