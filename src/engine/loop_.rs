//! 编排主循环
//!
//! Plan -> Act -> Observe -> (Reflect)，每轮开始先检查取消与 step 预算；推理调用与动作执行
//! 都与取消令牌竞速。可恢复的故障全部转成 error observation 写入历史，只有终态离开循环。

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::actions::{ActionDispatcher, ActionSpec, Observation};
use crate::config::RunConfig;
use crate::core::{AgentError, LoopPhase, ReasoningError, RecoveryAction, RecoveryEngine, RunState, RunStatus};
use crate::engine::{RunEvent, TurnPayload};
use crate::reasoning::{Decision, ReasoningClient, ReflectionInput, ReflectionVerdict};
use crate::sandbox::Sandbox;

const REASONING_ACTION: &str = "(reasoning)";
const REFLECTION_ACTION: &str = "(reflection)";

/// 单次运行所需的协作者；都是借用，运行之间不共享可变状态
pub struct RunSession<'a> {
    pub reasoner: &'a dyn ReasoningClient,
    pub dispatcher: &'a ActionDispatcher,
    pub recovery: &'a RecoveryEngine,
    pub config: &'a RunConfig,
    pub cancel: CancellationToken,
    pub event_tx: Option<&'a UnboundedSender<RunEvent>>,
}

impl<'a> RunSession<'a> {
    pub fn new(
        reasoner: &'a dyn ReasoningClient,
        dispatcher: &'a ActionDispatcher,
        recovery: &'a RecoveryEngine,
        config: &'a RunConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reasoner,
            dispatcher,
            recovery,
            config,
            cancel,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// 推理调用的结果（含调用点重试后）
enum Called<T> {
    Done(T),
    Cancelled,
    Failed(ReasoningError),
}

/// 反思之后循环该怎么走
enum Next {
    Continue,
    Stop,
}

/// 分解 + 主循环；返回时 state 一定处于终态
pub async fn run_loop(
    session: &RunSession<'_>,
    state: &mut RunState,
    sandbox: &mut Sandbox,
    instruction: &str,
    context: Option<&str>,
) {
    let specs = session.dispatcher.specs();

    if session.config.enable_decomposition {
        match decompose(session, instruction, state).await {
            Called::Done(items) if !items.is_empty() => {
                tracing::info!(run_id = %state.run_id, count = items.len(), "task decomposed");
                session.emit(RunEvent::Subtasks {
                    items: items.clone(),
                });
                state.subtasks = items;
            }
            Called::Done(_) => {
                tracing::debug!(run_id = %state.run_id, "no decomposition, using raw instruction");
            }
            Called::Failed(e) => {
                tracing::warn!(run_id = %state.run_id, error = %e, "decomposition failed, using raw instruction");
            }
            Called::Cancelled => {
                abort_cancelled(session, state);
                return;
            }
        }
    }

    let dataset = state.snapshot.describe();
    state.history.push(
        state.step,
        TurnPayload::Instruction {
            text: instruction.to_string(),
            context: context.map(str::to_string),
            subtasks: state.subtasks.clone(),
            dataset,
        },
    );

    loop {
        if session.cancel.is_cancelled() {
            abort_cancelled(session, state);
            break;
        }
        if state.step >= session.config.max_steps {
            abort(
                session,
                state,
                RunStatus::FailedBudgetExhausted,
                format!("step budget exhausted ({} steps)", session.config.max_steps),
            );
            break;
        }

        state.phase = LoopPhase::Plan;
        session.emit(RunEvent::StepUpdate {
            step: state.step,
            max_steps: session.config.max_steps,
        });
        tracing::debug!(run_id = %state.run_id, step = state.step, retries = state.retry_count, "plan");

        let decision = match decide(session, state, &specs).await {
            Called::Done(d) => d,
            Called::Cancelled => {
                abort_cancelled(session, state);
                break;
            }
            Called::Failed(e) => {
                let err = AgentError::Reasoning(e);
                let observation = match session.recovery.handle(&err) {
                    RecoveryAction::RetryWithObservation { kind, message } => {
                        Observation::error(kind, message)
                    }
                    RecoveryAction::Abort { status, reason } => {
                        abort(session, state, status, reason);
                        break;
                    }
                };
                if record_error(session, state, REASONING_ACTION, serde_json::Value::Null, observation) {
                    break;
                }
                continue;
            }
        };

        match decision {
            Decision::Finish { thought } => {
                session.emit(RunEvent::Decision {
                    thought: thought.clone(),
                    action: "finish".to_string(),
                    args: serde_json::Value::Null,
                });
                state.history.push(
                    state.step,
                    TurnPayload::Decision {
                        thought,
                        action: "finish".to_string(),
                        args: serde_json::Value::Null,
                    },
                );
                match reflect_or_finish(session, state, sandbox, instruction).await {
                    Next::Continue => continue,
                    Next::Stop => break,
                }
            }
            Decision::Invoke {
                action,
                args,
                thought,
            } => {
                session.emit(RunEvent::Decision {
                    thought: thought.clone(),
                    action: action.clone(),
                    args: args.clone(),
                });
                state.history.push(
                    state.step,
                    TurnPayload::Decision {
                        thought,
                        action: action.clone(),
                        args: args.clone(),
                    },
                );

                state.phase = LoopPhase::Act;
                let dispatched = tokio::select! {
                    _ = session.cancel.cancelled() => {
                        abort_cancelled(session, state);
                        break;
                    }
                    d = session.dispatcher.dispatch(&action, args.clone(), sandbox) => d,
                };

                if !dispatched.observation.is_ok() {
                    if record_error(session, state, &action, args, dispatched.observation) {
                        break;
                    }
                    continue;
                }

                session.emit(RunEvent::Observation {
                    action: action.clone(),
                    observation: dispatched.observation.clone(),
                });
                state.history.push(
                    state.step,
                    TurnPayload::ActionResult {
                        action: action.clone(),
                        args,
                        observation: dispatched.observation,
                    },
                );
                state.record_success();

                if action == "run_code" {
                    refresh_snapshot(state, sandbox).await;
                }
                if dispatched.submitted {
                    match reflect_or_finish(session, state, sandbox, instruction).await {
                        Next::Continue => continue,
                        Next::Stop => break,
                    }
                }
            }
        }
    }

    tracing::info!(
        run_id = %state.run_id,
        status = ?state.status(),
        steps = state.step,
        retries = state.retry_count,
        "run loop finished"
    );
}

/// 错误 observation 写入历史并记账；返回 true 表示重试预算已耗尽、运行已终止
fn record_error(
    session: &RunSession<'_>,
    state: &mut RunState,
    action: &str,
    args: serde_json::Value,
    observation: Observation,
) -> bool {
    tracing::warn!(run_id = %state.run_id, action, observation = %observation.render(), "error observation");
    session.emit(RunEvent::Observation {
        action: action.to_string(),
        observation: observation.clone(),
    });
    state.history.push(
        state.step,
        TurnPayload::ActionResult {
            action: action.to_string(),
            args,
            observation,
        },
    );
    if state.record_failure(session.config.max_retries) {
        abort(
            session,
            state,
            RunStatus::FailedBudgetExhausted,
            format!("retry budget exhausted ({} retries)", session.config.max_retries),
        );
        return true;
    }
    session.emit(RunEvent::Recovery {
        action: "retry".to_string(),
        detail: format!("retry {}/{}", state.retry_count, session.config.max_retries),
    });
    false
}

async fn decide(session: &RunSession<'_>, state: &RunState, specs: &[ActionSpec]) -> Called<Decision> {
    let attempts = session.config.reasoning_attempts.max(1);
    let mut attempt = 1;
    loop {
        session.emit(RunEvent::Thinking);
        let result = tokio::select! {
            _ = session.cancel.cancelled() => return Called::Cancelled,
            r = session.reasoner.decide(state.history.turns(), specs, &state.snapshot) => r,
        };
        match result {
            Ok(d) => return Called::Done(d),
            Err(e) if attempt < attempts => {
                tracing::warn!(run_id = %state.run_id, attempt, max_attempts = attempts, error = %e, "decide failed, asking again");
                attempt += 1;
            }
            Err(e) => return Called::Failed(e),
        }
    }
}

async fn decompose(session: &RunSession<'_>, instruction: &str, state: &RunState) -> Called<Vec<String>> {
    session.emit(RunEvent::Thinking);
    tokio::select! {
        _ = session.cancel.cancelled() => Called::Cancelled,
        r = session.reasoner.decompose(instruction, &state.snapshot) => match r {
            Ok(items) => Called::Done(items),
            Err(e) => Called::Failed(e),
        },
    }
}

async fn reflect(session: &RunSession<'_>, input: &ReflectionInput<'_>) -> Called<ReflectionVerdict> {
    let attempts = session.config.reasoning_attempts.max(1);
    let mut attempt = 1;
    loop {
        session.emit(RunEvent::Thinking);
        let result = tokio::select! {
            _ = session.cancel.cancelled() => return Called::Cancelled,
            r = session.reasoner.reflect(input) => r,
        };
        match result {
            Ok(v) => return Called::Done(v),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, max_attempts = attempts, error = %e, "reflect failed, asking again");
                attempt += 1;
            }
            Err(e) => return Called::Failed(e),
        }
    }
}

/// 候选完成：关闭反思时直接 Solved；否则按判定结束或带着 issues 回到 Plan
async fn reflect_or_finish(
    session: &RunSession<'_>,
    state: &mut RunState,
    sandbox: &Sandbox,
    instruction: &str,
) -> Next {
    if !session.config.enable_reflection {
        state.finish(RunStatus::Solved, None);
        return Next::Stop;
    }

    state.phase = LoopPhase::Reflect;
    let called = {
        let input = ReflectionInput {
            instruction,
            subtasks: &state.subtasks,
            initial_snapshot: &state.initial_snapshot,
            final_snapshot: &state.snapshot,
            code_history: sandbox.code_history(),
        };
        reflect(session, &input).await
    };

    let verdict = match called {
        Called::Done(v) => v,
        Called::Cancelled => {
            abort_cancelled(session, state);
            return Next::Stop;
        }
        Called::Failed(e) => {
            let err = AgentError::Reasoning(e);
            let observation = match session.recovery.handle(&err) {
                RecoveryAction::RetryWithObservation { kind, message } => Observation::error(kind, message),
                RecoveryAction::Abort { status, reason } => {
                    abort(session, state, status, reason);
                    return Next::Stop;
                }
            };
            return if record_error(session, state, REFLECTION_ACTION, serde_json::Value::Null, observation) {
                Next::Stop
            } else {
                Next::Continue
            };
        }
    };

    session.emit(RunEvent::Reflection {
        is_solved: verdict.is_solved,
        issues: verdict.issues.clone(),
    });
    state.history.push(
        state.step,
        TurnPayload::Reflection {
            is_solved: verdict.is_solved,
            issues: verdict.issues.clone(),
        },
    );

    if verdict.is_solved {
        tracing::info!(run_id = %state.run_id, "reflection accepted the result");
        state.finish(RunStatus::Solved, None);
        return Next::Stop;
    }

    state.reflection_count += 1;
    let issues = verdict
        .issues
        .unwrap_or_else(|| "The reviewer judged the task unsolved without details.".to_string());
    tracing::info!(run_id = %state.run_id, issues = %issues, "reflection rejected the result");
    state.history.push(state.step, TurnPayload::Correction { issues });

    if state.record_retry(session.config.max_retries) {
        abort(
            session,
            state,
            RunStatus::FailedBudgetExhausted,
            format!(
                "retry budget exhausted after {} unsuccessful reflections",
                state.reflection_count
            ),
        );
        return Next::Stop;
    }
    session.emit(RunEvent::Recovery {
        action: "retry".to_string(),
        detail: format!("reflection retry {}/{}", state.retry_count, session.config.max_retries),
    });
    Next::Continue
}

/// run_code 成功后重新检查数据集；变化时写入一条 DatasetChanged
async fn refresh_snapshot(state: &mut RunState, sandbox: &mut Sandbox) {
    match sandbox.inspect().await {
        Ok(snapshot) if snapshot != state.snapshot => {
            let description = snapshot.describe();
            state.history.push(state.step, TurnPayload::DatasetChanged { description });
            state.snapshot = snapshot;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(run_id = %state.run_id, error = %e, "snapshot refresh failed, keeping previous snapshot");
        }
    }
}

fn abort_cancelled(session: &RunSession<'_>, state: &mut RunState) {
    match session.recovery.handle(&AgentError::Cancelled) {
        RecoveryAction::Abort { status, reason } => abort(session, state, status, reason),
        RecoveryAction::RetryWithObservation { message, .. } => {
            abort(session, state, RunStatus::FailedFatal, message)
        }
    }
}

fn abort(session: &RunSession<'_>, state: &mut RunState, status: RunStatus, reason: String) {
    tracing::warn!(run_id = %state.run_id, status = ?status, reason = %reason, "run aborted");
    session.emit(RunEvent::Recovery {
        action: "abort".to_string(),
        detail: reason.clone(),
    });
    state.finish(status, Some(reason));
}
