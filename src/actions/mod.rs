//! 动作层：推理端可调用的固定能力集合
//!
//! - registry：Action trait、ActionRegistry、ActionSpec
//! - executor：ActionDispatcher，故障归一化为 Observation 并输出审计日志
//! - 各动作：run_code / query_schema / list_files / read_file / submit_answer

pub mod executor;
pub mod filesystem;
pub mod observation;
pub mod query_schema;
pub mod registry;
pub mod run_code;
pub mod submit_answer;

pub use executor::{ActionDispatcher, Dispatched};
pub use filesystem::{ListFilesAction, ReadFileAction};
pub use observation::{ErrorKind, Observation};
pub use query_schema::QuerySchemaAction;
pub use registry::{Action, ActionOutput, ActionRegistry, ActionSpec};
pub use run_code::RunCodeAction;
pub use submit_answer::SubmitAnswerAction;
