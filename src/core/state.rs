//! 运行状态：单次运行独占的可变记录
//!
//! RunState 只由编排循环持有并修改；step / retry_count 的记账集中在这里，
//! 状态一旦进入终态就不再变化（唯一例外见 `escalate_fatal`）。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::History;
use crate::sandbox::{DatasetHandle, DatasetSnapshot};

/// 运行终态（对外只暴露这四种）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Solved,
    FailedBudgetExhausted,
    FailedFatal,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// 状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Plan,
    Act,
    Reflect,
    Done,
    Aborted,
}

/// 单次运行的完整状态
#[derive(Debug)]
pub struct RunState {
    pub run_id: Uuid,
    pub history: History,
    pub step: usize,
    pub retry_count: usize,
    /// 反思判定未解决的次数（与 retry_count 共用预算，这里只做统计）
    pub reflection_count: usize,
    pub dataset_ref: DatasetHandle,
    pub initial_snapshot: DatasetSnapshot,
    pub snapshot: DatasetSnapshot,
    pub subtasks: Vec<String>,
    pub phase: LoopPhase,
    status: RunStatus,
    error: Option<String>,
}

impl RunState {
    pub fn new(run_id: Uuid, dataset_ref: DatasetHandle, snapshot: DatasetSnapshot) -> Self {
        Self {
            run_id,
            history: History::new(),
            step: 0,
            retry_count: 0,
            reflection_count: 0,
            dataset_ref,
            initial_snapshot: snapshot.clone(),
            snapshot,
            subtasks: Vec::new(),
            phase: LoopPhase::Plan,
            status: RunStatus::Running,
            error: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 成功的 observation 不计入重试
    pub fn record_success(&mut self) {
        self.step += 1;
    }

    /// 失败的 observation：step 与 retry_count 各加一；返回是否已超出重试预算
    pub fn record_failure(&mut self, max_retries: usize) -> bool {
        self.step += 1;
        self.record_retry(max_retries)
    }

    /// 只计一次重试（反思判定未解决时使用，不推进 step）
    pub fn record_retry(&mut self, max_retries: usize) -> bool {
        self.retry_count += 1;
        self.retry_count > max_retries
    }

    /// 进入终态；已是终态时忽略
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        if self.status.is_terminal() {
            tracing::debug!(run_id = %self.run_id, current = ?self.status, requested = ?status, "status already terminal");
            return;
        }
        self.status = status;
        self.error = error;
        self.phase = match status {
            RunStatus::Solved => LoopPhase::Done,
            _ => LoopPhase::Aborted,
        };
    }

    /// 循环结束后的收尾（持久化 / 回收）失败时升级为致命错误
    pub fn escalate_fatal(&mut self, reason: String) {
        if self.status == RunStatus::FailedFatal {
            return;
        }
        tracing::warn!(run_id = %self.run_id, previous = ?self.status, reason = %reason, "escalating run to failed_fatal");
        self.status = RunStatus::FailedFatal;
        self.phase = LoopPhase::Aborted;
        self.error = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn state() -> RunState {
        let handle = DatasetHandle {
            path: PathBuf::from("/tmp/x/data/book.xlsx"),
            relative: "data/book.xlsx".to_string(),
        };
        RunState::new(Uuid::new_v4(), handle, DatasetSnapshot::default())
    }

    #[test]
    fn test_success_never_counts_as_retry() {
        let mut s = state();
        s.record_success();
        s.record_success();
        assert_eq!(s.step, 2);
        assert_eq!(s.retry_count, 0);
    }

    #[test]
    fn test_failure_exceeds_after_max_plus_one() {
        let mut s = state();
        assert!(!s.record_failure(2));
        assert!(!s.record_failure(2));
        assert!(s.record_failure(2));
        assert_eq!(s.retry_count, 3);
        assert_eq!(s.step, 3);
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut s = state();
        s.finish(RunStatus::Solved, None);
        s.finish(RunStatus::FailedBudgetExhausted, Some("late".into()));
        assert_eq!(s.status(), RunStatus::Solved);
        assert_eq!(s.phase, LoopPhase::Done);
        assert!(s.error().is_none());
    }

    #[test]
    fn test_escalate_fatal_overrides_terminal() {
        let mut s = state();
        s.finish(RunStatus::Solved, None);
        s.escalate_fatal("teardown failed".into());
        assert_eq!(s.status(), RunStatus::FailedFatal);
        assert_eq!(s.error(), Some("teardown failed"));
    }
}
