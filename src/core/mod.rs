//! 核心层：错误与恢复、运行状态、关闭信号

pub mod error;
pub mod recovery;
pub mod shutdown;
pub mod state;

pub use error::{ActionError, AgentError, PersistError, ReasoningError, SandboxError};
pub use recovery::{RecoveryAction, RecoveryEngine};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{LoopPhase, RunState, RunStatus};
