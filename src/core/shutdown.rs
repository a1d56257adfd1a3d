//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 触发根 CancellationToken；每次运行拿到 child token，
//! 编排循环在每轮 Plan / Act 前检查，取消后有序终止并回收沙箱。

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 关闭信号管理器：一个根 token，多个运行级 child token
#[derive(Clone)]
pub struct ShutdownManager {
    root: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    /// 调用方断开等外部取消
    CallerGone,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(4);
        Self {
            root: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 全局关闭会级联取消所有运行；单个运行取消不影响其它运行
    pub fn run_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// 只有第一次调用会广播原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.root.is_cancelled() {
            return;
        }
        tracing::info!(reason = ?reason, "cancelling active runs");
        let _ = self.reason_tx.send(reason);
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    /// 后台监听 Ctrl+C 与 SIGTERM（非 unix 只有 Ctrl+C）
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let reason = wait_for_signal().await;
            manager.shutdown(reason);
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> ShutdownReason {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => tokio::select! {
            _ = tokio::signal::ctrl_c() => ShutdownReason::UserInitiated,
            _ = sigterm.recv() => ShutdownReason::Signal,
        },
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            ShutdownReason::UserInitiated
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> ShutdownReason {
    let _ = tokio::signal::ctrl_c().await;
    ShutdownReason::UserInitiated
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
