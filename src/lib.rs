//! SheetAgent - 自然语言驱动的电子表格任务编排引擎
//!
//! 模块划分：
//! - **agent**: 无头运行时，组装协作者并提供 start_run
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、运行状态、关闭信号
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / 重试包装）
//! - **reasoning**: 推理端边界（decide / decompose / reflect）与基于 LLM 的实现
//! - **sandbox**: 私有目录 + 解释器子进程的执行沙箱、数据集快照
//! - **actions**: 动作注册表、分发器与各动作
//! - **engine**: 运行历史、过程事件、编排主循环
//! - **persistence**: 结果落盘 / 上传

pub mod actions;
pub mod agent;
pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod observability;
pub mod persistence;
pub mod reasoning;
pub mod sandbox;

pub use agent::{start_run, start_run_with, AgentComponents, RunHooks, RunRequest, RunResult};
pub use config::{load_config, AppConfig, RunConfig};
pub use core::RunStatus;
