//! 基于 LlmClient 的推理端实现
//!
//! decide：system（动作列表 + 回复 schema）+ 历史转成的对话 + 当前数据集状态；上一段 run_code
//! 失败时附带失败代码与错误。reflect 按输入哈希缓存判定，相同输入只调用一次 LLM。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::actions::ActionSpec;
use crate::core::ReasoningError;
use crate::engine::{last_failed_code, Turn, TurnPayload};
use crate::llm::{LlmClient, Message};
use crate::reasoning::parse::{parse_decision, parse_subtasks, parse_verdict};
use crate::reasoning::prompts::render;
use crate::reasoning::schema::{decision_schema_json, decomposition_schema_json, reflection_schema_json};
use crate::reasoning::{Decision, PromptSet, ReasoningClient, ReflectionInput, ReflectionVerdict};
use crate::sandbox::DatasetSnapshot;

pub struct LlmReasoner {
    llm: Arc<dyn LlmClient>,
    /// 反思使用的客户端（通常 temperature = 0）
    reflector: Arc<dyn LlmClient>,
    prompts: PromptSet,
    verdicts: Mutex<HashMap<u64, ReflectionVerdict>>,
}

impl LlmReasoner {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptSet) -> Self {
        Self {
            reflector: llm.clone(),
            llm,
            prompts,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_reflector(mut self, reflector: Arc<dyn LlmClient>) -> Self {
        self.reflector = reflector;
        self
    }

    /// (prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

fn turn_to_message(turn: &Turn) -> Message {
    match &turn.payload {
        TurnPayload::Instruction {
            text,
            context,
            subtasks,
            dataset,
        } => {
            let mut content = format!("Task: {}", text);
            if let Some(ctx) = context {
                content.push_str(&format!("\nContext: {}", ctx));
            }
            if !subtasks.is_empty() {
                content.push_str("\nSubtasks:");
                for (i, s) in subtasks.iter().enumerate() {
                    content.push_str(&format!("\n{}. {}", i + 1, s));
                }
            }
            content.push_str(&format!("\nDataset:\n{}", dataset));
            Message::user(content)
        }
        TurnPayload::Decision {
            thought,
            action,
            args,
        } => Message::assistant(
            serde_json::json!({ "thought": thought, "action": action, "args": args }).to_string(),
        ),
        TurnPayload::ActionResult {
            action,
            observation,
            ..
        } => Message::user(format!("Observation from {}: {}", action, observation.render())),
        TurnPayload::DatasetChanged { description } => {
            Message::user(format!("The dataset changed:\n{}", description))
        }
        TurnPayload::Reflection { is_solved, issues } => Message::user(match (is_solved, issues) {
            (true, _) => "Review: the task looks solved.".to_string(),
            (false, Some(i)) => format!("Review: the task is not solved yet. {}", i),
            (false, None) => "Review: the task is not solved yet.".to_string(),
        }),
        TurnPayload::Correction { issues } => Message::user(format!(
            "Fix the following issues before finishing:\n{}",
            issues
        )),
    }
}

fn reflection_key(input: &ReflectionInput<'_>) -> u64 {
    let mut hasher = DefaultHasher::new();
    input.instruction.hash(&mut hasher);
    input.subtasks.hash(&mut hasher);
    input.initial_snapshot.describe().hash(&mut hasher);
    input.final_snapshot.describe().hash(&mut hasher);
    input.code_history.hash(&mut hasher);
    hasher.finish()
}

fn reflection_request(input: &ReflectionInput<'_>) -> String {
    let mut out = format!("Task: {}\n", input.instruction);
    if !input.subtasks.is_empty() {
        out.push_str("Subtasks:\n");
        for (i, s) in input.subtasks.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, s));
        }
    }
    out.push_str(&format!(
        "\nDataset before:\n{}\n\nDataset after:\n{}\n\nExecuted code:\n",
        input.initial_snapshot.describe(),
        input.final_snapshot.describe()
    ));
    if input.code_history.is_empty() {
        out.push_str("(no code was executed)\n");
    }
    for code in input.code_history {
        out.push_str(&format!("```\n{}\n```\n", code));
    }
    out
}

#[async_trait]
impl ReasoningClient for LlmReasoner {
    async fn decide(
        &self,
        history: &[Turn],
        actions: &[ActionSpec],
        snapshot: &DatasetSnapshot,
    ) -> Result<Decision, ReasoningError> {
        let actions_json = serde_json::to_string_pretty(actions).unwrap_or_else(|_| "[]".to_string());
        let system = render(&self.prompts.planner, &actions_json, &decision_schema_json());

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history.iter().map(turn_to_message));

        let mut state = format!("Current dataset state:\n{}", snapshot.describe());
        if let Some((code, error)) = last_failed_code(history) {
            state.push_str(&format!(
                "\n\nThe previous code failed:\n```\n{}\n```\nError:\n{}\nCorrect the code rather than repeating it.",
                code, error
            ));
        }
        state.push_str("\n\nWhat is the next action? Reply with one JSON object.");
        messages.push(Message::user(state));

        let reply = self.llm.complete(&messages).await?;
        parse_decision(&reply)
    }

    async fn decompose(
        &self,
        instruction: &str,
        snapshot: &DatasetSnapshot,
    ) -> Result<Vec<String>, ReasoningError> {
        let messages = vec![
            Message::system(render(&self.prompts.decomposer, "", &decomposition_schema_json())),
            Message::user(format!("Task: {}\n\nDataset:\n{}", instruction, snapshot.describe())),
        ];
        let reply = self.llm.complete(&messages).await?;
        parse_subtasks(&reply)
    }

    async fn reflect(&self, input: &ReflectionInput<'_>) -> Result<ReflectionVerdict, ReasoningError> {
        let key = reflection_key(input);
        if let Some(verdict) = self.verdicts.lock().ok().and_then(|m| m.get(&key).cloned()) {
            tracing::debug!(key, "reflection verdict served from memo");
            return Ok(verdict);
        }

        let messages = vec![
            Message::system(render(&self.prompts.reflector, "", &reflection_schema_json())),
            Message::user(reflection_request(input)),
        ];
        let reply = self.reflector.complete(&messages).await?;
        let verdict = parse_verdict(&reply)?;

        if let Ok(mut memo) = self.verdicts.lock() {
            memo.insert(key, verdict.clone());
        }
        Ok(verdict)
    }
}
