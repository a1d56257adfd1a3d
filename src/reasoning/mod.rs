//! 推理层：ReasoningClient 抽象、输出格式与解析、Prompt 模板、基于 LLM 的实现

pub mod client;
pub mod llm_reasoner;
pub mod parse;
pub mod prompts;
pub mod schema;

pub use client::{Decision, ReasoningClient, ReflectionInput, ReflectionVerdict};
pub use llm_reasoner::LlmReasoner;
pub use prompts::PromptSet;
