//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction：可恢复的故障转成 Observation 文本交回推理端，
//! 致命故障直接终止运行。

use crate::actions::ErrorKind;
use crate::core::{AgentError, RunStatus};

/// 恢复引擎给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 以 error observation 写入历史，下一轮 Plan 自行修正（计入重试预算）
    RetryWithObservation { kind: ErrorKind, message: String },
    /// 终止当前运行
    Abort { status: RunStatus, reason: String },
}

/// 故障分类：执行错误 / 传输错误 / 致命错误（预算耗尽由循环自己判断）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Sandbox(e) if e.is_fatal() => RecoveryAction::Abort {
                status: RunStatus::FailedFatal,
                reason: e.to_string(),
            },
            AgentError::Sandbox(e) => RecoveryAction::RetryWithObservation {
                kind: ErrorKind::from_sandbox(e),
                message: e.to_string(),
            },
            AgentError::Action(e) => RecoveryAction::RetryWithObservation {
                kind: ErrorKind::from_action(e),
                message: e.to_string(),
            },
            AgentError::Reasoning(e) => RecoveryAction::RetryWithObservation {
                kind: ErrorKind::Reasoning,
                message: format!(
                    "{e}. Reply with exactly one JSON object that follows the decision schema."
                ),
            },
            AgentError::Persist(e) => RecoveryAction::Abort {
                status: RunStatus::FailedFatal,
                reason: e.to_string(),
            },
            AgentError::Cancelled => RecoveryAction::Abort {
                status: RunStatus::FailedFatal,
                reason: "cancelled".to_string(),
            },
            AgentError::ConfigError(msg) => RecoveryAction::Abort {
                status: RunStatus::FailedFatal,
                reason: msg.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActionError, ReasoningError, SandboxError};

    #[test]
    fn test_recovery_malformed_output_retries() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Reasoning(ReasoningError::Malformed("not json".into()));
        match engine.handle(&err) {
            RecoveryAction::RetryWithObservation { kind, message } => {
                assert_eq!(kind, ErrorKind::Reasoning);
                assert!(message.contains("JSON"));
            }
            other => panic!("Expected RetryWithObservation, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_timeout_is_retryable() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Sandbox(SandboxError::Timeout(5));
        assert!(matches!(
            engine.handle(&err),
            RecoveryAction::RetryWithObservation { kind: ErrorKind::Timeout, .. }
        ));
    }

    #[test]
    fn test_recovery_unknown_action() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Action(ActionError::UnknownAction("fake".into()));
        match engine.handle(&err) {
            RecoveryAction::RetryWithObservation { kind, message } => {
                assert_eq!(kind, ErrorKind::UnknownAction);
                assert!(message.contains("fake"));
            }
            other => panic!("Expected RetryWithObservation, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_setup_failure_is_fatal() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Sandbox(SandboxError::Setup("no tmp".into()));
        assert!(matches!(
            engine.handle(&err),
            RecoveryAction::Abort { status: RunStatus::FailedFatal, .. }
        ));
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        match engine.handle(&AgentError::Cancelled) {
            RecoveryAction::Abort { status, reason } => {
                assert_eq!(status, RunStatus::FailedFatal);
                assert_eq!(reason, "cancelled");
            }
            other => panic!("Expected Abort, got {other:?}"),
        }
    }
}
