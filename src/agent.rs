//! 无头运行时：组装协作者并对外提供 start_run
//!
//! 一次运行独占一个 RunState 与一个沙箱；运行结束后依次 finalize -> 导出日志 -> 持久化 -> 回收沙箱。
//! 调用方只会看到四种状态之一加可选的诊断信息，不会拿到内部错误类型。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::actions::{ActionDispatcher, ActionRegistry, ActionSpec};
use crate::config::{AppConfig, RunConfig, SandboxSection};
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, RunState, RunStatus};
use crate::engine::{run_loop, RunEvent, RunSession, Turn};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryingLlmClient};
use crate::persistence::{ArtifactStore, LocalDirStore};
use crate::reasoning::{LlmReasoner, PromptSet, ReasoningClient};
use crate::sandbox::Sandbox;

/// 运行所需的全部协作者，可在多次（并发）运行之间共享
pub struct AgentComponents {
    pub reasoner: Arc<dyn ReasoningClient>,
    pub dispatcher: ActionDispatcher,
    pub recovery: Arc<RecoveryEngine>,
    pub store: Arc<dyn ArtifactStore>,
    pub sandbox: SandboxSection,
    /// 沙箱私有目录的父目录
    pub work_dir: Option<PathBuf>,
}

impl AgentComponents {
    pub fn new(
        reasoner: Arc<dyn ReasoningClient>,
        store: Arc<dyn ArtifactStore>,
        sandbox: SandboxSection,
    ) -> Self {
        let recovery = Arc::new(RecoveryEngine::new());
        Self {
            reasoner,
            dispatcher: ActionDispatcher::new(ActionRegistry::standard(), recovery.clone()),
            recovery,
            store,
            sandbox,
            work_dir: None,
        }
    }

    /// LLM、prompt、沙箱与本地存储全部来自配置
    pub fn from_config(cfg: &AppConfig) -> Self {
        let (planner, reflector) = create_llm_from_config(cfg);
        let prompts = PromptSet::load(&cfg.app.prompts_dir);
        let reasoner = LlmReasoner::new(planner, prompts).with_reflector(reflector);
        let mut components = Self::new(
            Arc::new(reasoner),
            Arc::new(LocalDirStore::new(&cfg.app.output_dir)),
            cfg.sandbox.clone(),
        );
        components.work_dir = cfg.app.work_dir.clone();
        components
    }

    pub fn with_registry(mut self, registry: ActionRegistry) -> Self {
        self.dispatcher = ActionDispatcher::new(registry, self.recovery.clone());
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// 可调用动作的静态清单
    pub fn actions(&self) -> Vec<ActionSpec> {
        self.dispatcher.specs()
    }
}

/// 按配置创建 (规划用, 反思用) 两个客户端；没有 API Key 时退回 Mock
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> (Arc<dyn LlmClient>, Arc<dyn LlmClient>) {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    if provider == "openai" && api_key.is_some() {
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        let planner = OpenAiClient::new(base, &cfg.llm.model, api_key.as_deref());
        let mut reflector = OpenAiClient::new(base, &cfg.llm.model, api_key.as_deref());
        if let Some(t) = cfg.llm.reflection_temperature {
            reflector = reflector.with_temperature(t);
        }
        let retry = cfg.llm.retry_config();
        (
            Arc::new(RetryingLlmClient::new(Arc::new(planner), retry.clone())),
            Arc::new(RetryingLlmClient::new(Arc::new(reflector), retry)),
        )
    } else {
        if provider != "mock" {
            tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
        }
        let mock: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
        (mock.clone(), mock)
    }
}

/// 一次运行的输入
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub instruction: String,
    /// 可选的问题背景（业务说明、列含义等）
    pub context: Option<String>,
    pub dataset_path: PathBuf,
}

impl RunRequest {
    pub fn new(instruction: impl Into<String>, dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            instruction: instruction.into(),
            context: None,
            dataset_path: dataset_path.into(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// 可选：外部取消与事件推送
#[derive(Debug, Clone, Default)]
pub struct RunHooks {
    pub cancel: Option<CancellationToken>,
    pub event_tx: Option<UnboundedSender<RunEvent>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// 持久化后的数据集引用；致命失败时为空
    pub final_dataset_ref: Option<String>,
    pub history_trace: Vec<Turn>,
    pub subtasks: Vec<String>,
    pub steps: usize,
    pub retries: usize,
    pub error: Option<String>,
}

impl RunResult {
    fn fatal(run_id: Uuid, reason: String) -> Self {
        Self {
            run_id,
            status: RunStatus::FailedFatal,
            final_dataset_ref: None,
            history_trace: Vec::new(),
            subtasks: Vec::new(),
            steps: 0,
            retries: 0,
            error: Some(reason),
        }
    }
}

pub async fn start_run(
    components: &AgentComponents,
    instruction: &str,
    dataset_ref: &Path,
    config: RunConfig,
) -> RunResult {
    start_run_with(
        components,
        RunRequest::new(instruction, dataset_ref),
        config,
        RunHooks::default(),
    )
    .await
}

pub async fn start_run_with(
    components: &AgentComponents,
    request: RunRequest,
    config: RunConfig,
    hooks: RunHooks,
) -> RunResult {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);
    let result = execute_run(components, run_id, request, config, &hooks)
        .instrument(span)
        .await;
    if let Some(tx) = &hooks.event_tx {
        let _ = tx.send(RunEvent::Finished {
            status: result.status,
            steps: result.steps,
            retries: result.retries,
            error: result.error.clone(),
        });
    }
    result
}

fn fatal_reason(recovery: &RecoveryEngine, err: AgentError) -> String {
    match recovery.handle(&err) {
        RecoveryAction::Abort { reason, .. } => reason,
        RecoveryAction::RetryWithObservation { message, .. } => message,
    }
}

async fn execute_run(
    components: &AgentComponents,
    run_id: Uuid,
    request: RunRequest,
    config: RunConfig,
    hooks: &RunHooks,
) -> RunResult {
    tracing::info!(
        dataset = %request.dataset_path.display(),
        max_steps = config.max_steps,
        max_retries = config.max_retries,
        reflection = config.enable_reflection,
        "run started"
    );

    let mut sandbox = match Sandbox::create(
        &components.sandbox,
        components.work_dir.as_deref(),
        &request.dataset_path,
    ) {
        Ok(s) => s,
        Err(e) => {
            let reason = fatal_reason(&components.recovery, AgentError::Sandbox(e));
            tracing::error!(reason = %reason, "sandbox could not be created");
            return RunResult::fatal(run_id, reason);
        }
    };

    let snapshot = match sandbox.inspect().await {
        Ok(s) => s,
        Err(e) => {
            let reason = format!("initial dataset inspection failed: {}", e);
            tracing::error!(reason = %reason, "dataset is not usable");
            if let Err(e) = sandbox.close() {
                tracing::warn!(error = %e, "sandbox teardown failed");
            }
            return RunResult::fatal(run_id, reason);
        }
    };

    let mut state = RunState::new(run_id, sandbox.dataset().clone(), snapshot);
    let cancel = hooks.cancel.clone().unwrap_or_default();
    let mut session = RunSession::new(
        components.reasoner.as_ref(),
        &components.dispatcher,
        &components.recovery,
        &config,
        cancel,
    );
    if let Some(tx) = &hooks.event_tx {
        session = session.with_event_tx(tx);
    }

    run_loop(
        &session,
        &mut state,
        &mut sandbox,
        &request.instruction,
        request.context.as_deref(),
    )
    .await;

    let final_ref = if state.status() == RunStatus::FailedFatal {
        None
    } else {
        persist(components, &mut state, &mut sandbox).await
    };

    if let Err(e) = sandbox.close() {
        let reason = fatal_reason(&components.recovery, AgentError::Sandbox(e));
        state.escalate_fatal(reason);
    }

    let status = state.status();
    let error = state.error().map(str::to_string);
    tracing::info!(status = ?status, steps = state.step, retries = state.retry_count, "run finished");
    RunResult {
        run_id,
        status,
        final_dataset_ref: if status == RunStatus::FailedFatal { None } else { final_ref },
        steps: state.step,
        retries: state.retry_count,
        subtasks: std::mem::take(&mut state.subtasks),
        history_trace: state.history.into_turns(),
        error,
    }
}

/// finalize -> 导出日志 -> 交给存储；任何一步失败都升级为致命
async fn persist(
    components: &AgentComponents,
    state: &mut RunState,
    sandbox: &mut Sandbox,
) -> Option<String> {
    if let Err(e) = sandbox.finalize().await {
        state.escalate_fatal(format!("finalize failed: {}", e));
        return None;
    }
    let logs = match sandbox.export_logs() {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!(error = %e, "log export failed, persisting dataset only");
            Vec::new()
        }
    };
    match components.store.persist(state.run_id, &state.dataset_ref, &logs).await {
        Ok(reference) => Some(reference),
        Err(e) => {
            let reason = fatal_reason(&components.recovery, AgentError::Persist(e));
            state.escalate_fatal(reason);
            None
        }
    }
}
