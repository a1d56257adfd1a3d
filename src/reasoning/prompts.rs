//! Prompt 模板：优先读 prompts_dir 下的 planner.md / decomposer.md / reflector.md，缺失时用内置默认
//!
//! 占位符：`{actions}`（动作列表 JSON，仅 planner）、`{schema}`（回复格式的 JSON Schema）。

use std::path::Path;

const DEFAULT_PLANNER: &str = "You are a spreadsheet automation agent. You solve the user's task step by step by \
calling actions against a private copy of the dataset. Earlier successful code keeps its state.\n\n\
Available actions:\n{actions}\n\n\
Reply with exactly one JSON object matching this schema:\n{schema}\n\n\
Use \"action\": \"finish\" (or call submit_answer) only when every subtask is done. \
When an observation reports an error, read it carefully and correct the code instead of repeating it.";

const DEFAULT_DECOMPOSER: &str = "You split a spreadsheet task into a short ordered list of concrete subtasks. \
Each subtask is one sentence. If the task is already atomic, return a single subtask.\n\n\
Reply with exactly one JSON object matching this schema:\n{schema}";

const DEFAULT_REFLECTOR: &str = "You review whether a spreadsheet task was completed correctly. You are given the \
task, its subtasks, the dataset before and after, and the code that was executed. Judge only what the \
evidence shows. If something is missing or wrong, set is_solved to false and describe the issues precisely.\n\n\
Reply with exactly one JSON object matching this schema:\n{schema}";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub planner: String,
    pub decomposer: String,
    pub reflector: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            planner: DEFAULT_PLANNER.to_string(),
            decomposer: DEFAULT_DECOMPOSER.to_string(),
            reflector: DEFAULT_REFLECTOR.to_string(),
        }
    }
}

impl PromptSet {
    pub fn load(dir: &Path) -> Self {
        let read = |name: &str, fallback: &str| {
            let path = dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!(path = %path.display(), "prompt template loaded");
                    text
                }
                _ => fallback.to_string(),
            }
        };
        Self {
            planner: read("planner.md", DEFAULT_PLANNER),
            decomposer: read("decomposer.md", DEFAULT_DECOMPOSER),
            reflector: read("reflector.md", DEFAULT_REFLECTOR),
        }
    }
}

pub(crate) fn render(template: &str, actions: &str, schema: &str) -> String {
    template.replace("{actions}", actions).replace("{schema}", schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_falls_back_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reflector.md"), "Judge: {schema}").unwrap();
        let prompts = PromptSet::load(dir.path());
        assert_eq!(prompts.reflector, "Judge: {schema}");
        assert_eq!(prompts.planner, PromptSet::default().planner);
    }

    #[test]
    fn test_render_placeholders() {
        let out = render(DEFAULT_PLANNER, "[run_code]", "{\"type\":\"object\"}");
        assert!(out.contains("[run_code]"));
        assert!(!out.contains("{actions}"));
    }
}
