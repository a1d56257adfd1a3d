//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SHEET_AGENT__*` 覆盖（双下划线表示嵌套，如
//! `SHEET_AGENT__RUN__MAX_STEPS=8`）。单次运行的预算通过 RunConfig 显式传入 start_run，
//! 不存在进程级可变配置。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub run: RunConfig,
    pub sandbox: SandboxSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 最终结果（数据集 + 代码 / 输出日志）的落盘目录
    pub output_dir: PathBuf,
    /// 沙箱私有目录的父目录，未设置时用系统临时目录
    pub work_dir: Option<PathBuf>,
    /// Prompt 模板目录
    pub prompts_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "sheet-agent".to_string(),
            output_dir: PathBuf::from("output"),
            work_dir: None,
            prompts_dir: PathBuf::from("config/prompts"),
        }
    }
}

/// [llm] 段：后端选择、超时与调用点重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 反思调用的 temperature，0 使输出尽量确定
    pub reflection_temperature: Option<f32>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            reflection_temperature: Some(0.0),
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl LlmSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_backoff_ms: self.retry.initial_backoff_ms,
            request_timeout_secs: self.timeouts.request,
        }
    }
}

/// [run] 段：单次运行的预算与可选阶段
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 完整 plan→act→observe 周期的上限
    pub max_steps: usize,
    /// 失败（执行错误 / 推理输出不合法 / 反思未通过）后允许的修正次数
    pub max_retries: usize,
    pub enable_reflection: bool,
    pub enable_decomposition: bool,
    /// 推理调用在调用点的尝试次数（含首次），用尽后按执行错误处理
    pub reasoning_attempts: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_retries: 3,
            enable_reflection: true,
            enable_decomposition: true,
            reasoning_attempts: 2,
        }
    }
}

/// [sandbox] 段：解释器、超时与数据集脚本
///
/// 解释器常驻：每个代码单元写成文件，再把 `runner_statement` 经 stdin 发给解释器执行。
/// 脚本中通过环境变量 `DATASET_PATH`（相对私有根目录）定位数据集，`SANDBOX_ROOT` 是根目录绝对路径。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub file_extension: String,
    pub exec_timeout_secs: u64,
    /// 解释器因失败 / 超时被重启后，重放已成功的片段以重建内存状态
    pub replay_history: bool,
    /// 解释器启动后执行一次的公共代码（导入库、加载数据集）
    pub prelude: Option<String>,
    /// 执行一个单元文件的语句，`{cell}` 与 `{marker}` 会被替换。
    /// 执行完必须先向 stderr 打印 `{marker}`，再向 stdout 打印 `{marker} <退出码>`
    pub runner_statement: String,
    /// 向 stdout 输出 DatasetSnapshot JSON 的脚本
    pub inspect_script: Option<String>,
    /// 运行结束时把内存中的修改写回数据集文件
    pub finalize_script: Option<String>,
    pub max_output_chars: usize,
    /// 追加给解释器的环境变量（其余环境变量一律清空，只保留 PATH）
    pub env: BTreeMap<String, String>,
    pub jail: JailMode,
    /// bubblewrap 监狱里只读挂载的宿主目录（不存在的会跳过）
    pub jail_ro_binds: Vec<String>,
}

/// 解释器是否放进 bubblewrap 监狱
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JailMode {
    /// 只靠路径守卫与运行时检查
    #[default]
    Off,
    /// bwrap 可用就用，否则退回 Off
    Auto,
    /// 必须可用，否则沙箱创建失败
    Bubblewrap,
}

/// 默认 Python 解释器的驱动程序：安装审计钩子后逐行读取 stdin 上的 runner 语句
pub const PYTHON_DRIVER: &str = include_str!("sandbox/python_driver.py");

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-u".to_string(), "-c".to_string(), PYTHON_DRIVER.to_string()],
            file_extension: "py".to_string(),
            exec_timeout_secs: 30,
            replay_history: true,
            prelude: None,
            runner_statement: "_run(r\"{cell}\", \"{marker}\")".to_string(),
            inspect_script: None,
            finalize_script: None,
            max_output_chars: 8000,
            env: BTreeMap::from([
                ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
                ("MPLBACKEND".to_string(), "Agg".to_string()),
            ]),
            jail: JailMode::Off,
            jail_ro_binds: ["/usr", "/lib", "/lib64", "/bin", "/sbin", "/etc/alternatives"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 SHEET_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SHEET_AGENT__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SHEET_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
