//! 动作分发器
//!
//! 按名查找动作并在沙箱上执行；任何故障都在这里转成 error observation，不越过分发边界。
//! 每次调用输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::actions::{ActionOutput, ActionRegistry, ActionSpec, ErrorKind, Observation};
use crate::core::{ActionError, AgentError, RecoveryAction, RecoveryEngine};
use crate::sandbox::Sandbox;

/// 一次分发的结果
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub observation: Observation,
    /// submit_answer 成功
    pub submitted: bool,
}

pub struct ActionDispatcher {
    registry: ActionRegistry,
    /// 与编排循环共用同一个恢复引擎，故障分类只有一套
    recovery: Arc<RecoveryEngine>,
}

impl ActionDispatcher {
    pub fn new(registry: ActionRegistry, recovery: Arc<RecoveryEngine>) -> Self {
        Self { registry, recovery }
    }

    pub fn specs(&self) -> Vec<ActionSpec> {
        self.registry.specs()
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn recovery(&self) -> &Arc<RecoveryEngine> {
        &self.recovery
    }

    pub async fn dispatch(&self, name: &str, args: Value, sandbox: &mut Sandbox) -> Dispatched {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.registry.get(name) {
            Some(action) => action.execute(args, sandbox).await,
            None => Err(ActionError::UnknownAction(format!(
                "{} (available: {})",
                name,
                self.registry.names().join(", ")
            ))),
        };

        let dispatched = match result {
            Ok(ActionOutput::Payload(payload)) => Dispatched {
                observation: Observation::ok(payload),
                submitted: false,
            },
            Ok(ActionOutput::Submitted(answer)) => Dispatched {
                observation: Observation::ok(answer),
                submitted: true,
            },
            Err(e) => self.normalize(e),
        };

        let outcome = dispatched
            .observation
            .error_kind()
            .map(|k| k.as_str())
            .unwrap_or("ok");
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": name,
            "ok": dispatched.observation.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        dispatched
    }

    fn normalize(&self, err: ActionError) -> Dispatched {
        let observation = match self.recovery.handle(&AgentError::Action(err)) {
            RecoveryAction::RetryWithObservation { kind, message } => Observation::error(kind, message),
            RecoveryAction::Abort { reason, .. } => Observation::error(ErrorKind::Unavailable, reason),
        };
        Dispatched {
            observation,
            submitted: false,
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
