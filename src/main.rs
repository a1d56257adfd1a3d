//! SheetAgent CLI
//!
//! 用法：`sheet-agent [--config <file>] [--context <text>] <dataset> <instruction...>`
//! 运行结果以 JSON 打印到 stdout；未解决时退出码为 1。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use sheet_agent::core::ShutdownManager;
use sheet_agent::{load_config, start_run_with, AgentComponents, RunHooks, RunRequest, RunStatus};
use tokio::sync::mpsc;

struct Cli {
    config: Option<PathBuf>,
    context: Option<String>,
    dataset: PathBuf,
    instruction: String,
}

fn parse_cli(args: impl IntoIterator<Item = String>) -> anyhow::Result<Cli> {
    let mut config = None;
    let mut context = None;
    let mut positional = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--context" => context = Some(args.next().context("--context needs a value")?),
            _ => positional.push(arg),
        }
    }
    if positional.len() < 2 {
        bail!("usage: sheet-agent [--config <file>] [--context <text>] <dataset> <instruction...>");
    }
    let dataset = PathBuf::from(positional.remove(0));
    Ok(Cli {
        config,
        context,
        dataset,
        instruction: positional.join(" "),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sheet_agent::observability::init();

    let cli = parse_cli(std::env::args().skip(1))?;
    let cfg = load_config(cli.config).context("Failed to load config")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    let mut shutdown_reason = shutdown.subscribe();

    let components = AgentComponents::from_config(&cfg);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                tracing::info!(event = %line, "run event");
            }
        }
    });

    let mut request = RunRequest::new(cli.instruction, cli.dataset);
    if let Some(ctx) = cli.context {
        request = request.with_context(ctx);
    }
    let hooks = RunHooks {
        cancel: Some(shutdown.run_token()),
        event_tx: Some(event_tx),
    };

    let result = start_run_with(&components, request, cfg.run.clone(), hooks).await;
    let _ = printer.await;
    if let Ok(reason) = shutdown_reason.try_recv() {
        tracing::warn!(reason = ?reason, "run was interrupted");
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize run result")?
    );
    if result.status != RunStatus::Solved {
        std::process::exit(1);
    }
    Ok(())
}
