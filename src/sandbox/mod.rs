//! 沙箱：每次运行一个私有临时根目录，生成代码在其中的常驻解释器里执行
//!
//! - 根目录由 tempfile 创建，Sandbox 被 drop 或 close 时整体回收（任何退出路径都成立）
//! - 解释器常驻，内存状态跨调用累积，每个单元只执行一次；单元失败或超时后解释器被整组杀掉，
//!   下次使用时重启，replay_history 打开时重放已成功的片段重建状态（失败片段不进入历史）
//! - 越界访问三道检查：执行前 PathGuard 扫描代码，执行中解释器自身的钩子（默认 Python 驱动）
//!   或 bubblewrap 监狱，执行后核对解释器工作目录与根目录内的符号链接
//! - 每个单元有墙钟超时，超时后沙箱仍可继续使用

pub mod guard;
mod jail;
mod session;
pub mod snapshot;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::SandboxSection;
use crate::core::SandboxError;
use session::{CellOutput, CellStatus, Session};

pub use guard::PathGuard;
pub use snapshot::{column_letter, ColumnInfo, DatasetSnapshot, FileEntry, TableSnapshot};

const CELLS_DIR: &str = ".cells";
const DATA_DIR: &str = "data";
/// 导出代码 / 输出 / 错误日志的子目录
pub const EXPORT_DIR: &str = "export";
const LOG_SEPARATOR: &str = "\n\n# ============\n";
/// 解释器侧越界检查报错时使用的前缀
pub const ESCAPE_SIGNAL: &str = "sandbox path escape";

/// 私有根目录内数据集文件的句柄；文件被原地修改，句柄本身不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    pub path: PathBuf,
    /// 相对根目录的路径，脚本通过 DATASET_PATH 环境变量拿到
    pub relative: String,
}

pub struct Sandbox {
    // session 在 root 之前声明：drop 时先杀解释器再删目录
    session: Option<Session>,
    root: TempDir,
    guard: PathGuard,
    config: SandboxSection,
    jailed: bool,
    dataset: DatasetHandle,
    marker: String,
    code_history: Vec<String>,
    outputs: Vec<String>,
    errors: Vec<String>,
    cells: usize,
}

impl Sandbox {
    /// 建立私有根目录并把数据集复制进去；失败属于致命错误。解释器在第一次使用时才启动
    pub fn create(
        config: &SandboxSection,
        work_dir: Option<&Path>,
        dataset_src: &Path,
    ) -> Result<Self, SandboxError> {
        if !dataset_src.is_file() {
            return Err(SandboxError::InvalidDataset(format!(
                "{} is not a readable file",
                dataset_src.display()
            )));
        }
        let file_name = dataset_src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SandboxError::InvalidDataset(format!("bad file name: {}", dataset_src.display()))
            })?
            .to_string();
        let jailed = jail::enabled(config.jail)?;

        let setup = |e: std::io::Error| SandboxError::Setup(e.to_string());
        let mut builder = tempfile::Builder::new();
        builder.prefix("sheet-agent-");
        let root = match work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(setup)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(setup)?;

        let guard = PathGuard::new(root.path());
        std::fs::create_dir_all(guard.root().join(DATA_DIR)).map_err(setup)?;
        std::fs::create_dir_all(guard.root().join(CELLS_DIR)).map_err(setup)?;

        let relative = format!("{}/{}", DATA_DIR, file_name);
        let path = guard.root().join(&relative);
        std::fs::copy(dataset_src, &path).map_err(|e| {
            SandboxError::InvalidDataset(format!("{}: {}", dataset_src.display(), e))
        })?;

        tracing::info!(root = %guard.root().display(), dataset = %relative, jailed, "sandbox created");

        Ok(Self {
            session: None,
            root,
            guard,
            config: config.clone(),
            jailed,
            dataset: DatasetHandle { path, relative },
            marker: format!("__SANDBOX_MARK_{}__", Uuid::new_v4().simple()),
            code_history: Vec::new(),
            outputs: Vec::new(),
            errors: Vec::new(),
            cells: 0,
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn dataset(&self) -> &DatasetHandle {
        &self.dataset
    }

    /// 已成功执行的代码片段（按执行顺序）
    pub fn code_history(&self) -> &[String] {
        &self.code_history
    }

    /// 执行一段生成代码，返回它的 stdout
    pub async fn execute(&mut self, code: &str) -> Result<String, SandboxError> {
        if let Err(e) = self.guard.scan(code) {
            self.errors.push(e.to_string());
            return Err(e);
        }

        let output = match self.run_cell(code).await {
            Ok(o) => o,
            Err(e) => {
                self.errors.push(e.to_string());
                return Err(e);
            }
        };

        if let Some(escape) = self.detect_escape(&output) {
            // 输出丢弃；工作目录可能已在根目录之外，解释器不再复用
            self.session = None;
            tracing::warn!(error = %escape, "cell reached outside the sandbox");
            self.errors.push(escape.to_string());
            return Err(escape);
        }

        let CellOutput { stdout, stderr, status } = output;
        if status != CellStatus::Ok {
            self.session = None;
            let msg = match (stderr.trim().is_empty(), status) {
                (false, _) => stderr.trim().to_string(),
                (true, CellStatus::Failed(code)) => format!("cell failed with exit code {}", code),
                (true, _) => "interpreter exited".to_string(),
            };
            self.errors.push(msg.clone());
            return Err(SandboxError::Execution(self.truncate(msg)));
        }

        self.code_history.push(code.to_string());
        self.outputs.push(stdout.clone());
        let stderr = stderr.trim();
        let out = if stderr.is_empty() {
            stdout
        } else {
            self.errors.push(stderr.to_string());
            format!("{}\nstderr: {}", stdout.trim_end(), stderr)
        };
        Ok(self.truncate(out))
    }

    /// 当前数据集快照：inspect_script 在活动解释器中的输出 + 根目录文件清单
    pub async fn inspect(&mut self) -> Result<DatasetSnapshot, SandboxError> {
        let mut snapshot = match self.config.inspect_script.clone() {
            Some(script) => {
                let output = self
                    .run_cell(&script)
                    .await
                    .map_err(|e| SandboxError::Inspect(e.to_string()))?;
                if output.status != CellStatus::Ok {
                    return Err(SandboxError::Inspect(output.stderr.trim().to_string()));
                }
                serde_json::from_str::<DatasetSnapshot>(output.stdout.trim())
                    .map_err(|e| SandboxError::Inspect(format!("invalid snapshot JSON: {}", e)))?
            }
            None => DatasetSnapshot::default(),
        };
        snapshot.files = self.list_files();
        Ok(snapshot)
    }

    /// 运行结束前把内存中的修改写回数据集文件
    pub async fn finalize(&mut self) -> Result<(), SandboxError> {
        let Some(script) = self.config.finalize_script.clone() else {
            return Ok(());
        };
        let output = self.run_cell(&script).await?;
        if output.status != CellStatus::Ok {
            return Err(SandboxError::Execution(output.stderr.trim().to_string()));
        }
        Ok(())
    }

    /// 导出 code.txt / outputs.txt / errors.txt，返回文件路径
    pub fn export_logs(&self) -> Result<Vec<PathBuf>, SandboxError> {
        let dir = self.guard.check(EXPORT_DIR)?;
        std::fs::create_dir_all(&dir)?;
        let files = [
            ("code.txt", &self.code_history),
            ("outputs.txt", &self.outputs),
            ("errors.txt", &self.errors),
        ];
        let mut written = Vec::with_capacity(files.len());
        for (name, entries) in files {
            let path = dir.join(name);
            std::fs::write(&path, entries.join(LOG_SEPARATOR))?;
            written.push(path);
        }
        Ok(written)
    }

    /// 杀掉解释器进程组并回收私有目录；drop 时同样会回收，只是无法报告错误
    pub fn close(mut self) -> Result<(), SandboxError> {
        self.session = None;
        let root = self.guard.root().display().to_string();
        self.root
            .close()
            .map_err(|e| SandboxError::Teardown(format!("{}: {}", root, e)))?;
        tracing::info!(root = %root, "sandbox removed");
        Ok(())
    }

    /// 根目录下的可见文件（跳过 . 开头的目录与文件）
    pub fn list_files(&self) -> Vec<FileEntry> {
        let root = self.guard.root();
        WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let path = e.path().strip_prefix(root).ok()?.to_string_lossy().to_string();
                let bytes = e.metadata().ok()?.len();
                Some(FileEntry { path, bytes })
            })
            .collect()
    }

    /// 在活动解释器中执行一个单元；没有可用解释器时先启动。超时或 future 被丢弃时解释器随之被杀
    async fn run_cell(&mut self, code: &str) -> Result<CellOutput, SandboxError> {
        let alive = self.session.as_mut().map(Session::is_alive).unwrap_or(false);
        let mut session = match self.session.take() {
            Some(session) if alive => session,
            stale => {
                drop(stale);
                self.start_session().await?
            }
        };
        let output = self.send_cell(&mut session, code).await?;
        self.session = Some(session);
        Ok(output)
    }

    /// 启动解释器，执行 prelude，并按需重放成功历史（输出丢弃）
    async fn start_session(&mut self) -> Result<Session, SandboxError> {
        let mut session = Session::spawn(self.command(), &self.config.interpreter)?;
        if let Some(prelude) = self.config.prelude.clone() {
            let output = self.send_cell(&mut session, &prelude).await?;
            if output.status != CellStatus::Ok {
                return Err(SandboxError::Setup(format!(
                    "prelude failed: {}",
                    output.stderr.trim()
                )));
            }
        }
        if self.config.replay_history && !self.code_history.is_empty() {
            tracing::debug!(cells = self.code_history.len(), "replaying successful cells");
            for code in self.code_history.clone() {
                let output = self.send_cell(&mut session, &code).await?;
                if output.status != CellStatus::Ok {
                    tracing::warn!(stderr = %output.stderr.trim(), "replayed cell failed");
                }
            }
        }
        Ok(session)
    }

    async fn send_cell(&mut self, session: &mut Session, code: &str) -> Result<CellOutput, SandboxError> {
        self.cells += 1;
        let cell = self.guard.root().join(CELLS_DIR).join(format!(
            "cell_{:04}.{}",
            self.cells, self.config.file_extension
        ));
        tokio::fs::write(&cell, code).await?;
        let statement = self
            .config
            .runner_statement
            .replace("{cell}", &cell.to_string_lossy())
            .replace("{marker}", &self.marker);

        let secs = self.config.exec_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), session.run(&statement, &self.marker)).await {
            Ok(output) => Ok(output),
            Err(_) => {
                tracing::warn!(cell = self.cells, timeout_secs = secs, "sandbox execution timed out, interpreter killed");
                Err(SandboxError::Timeout(secs))
            }
        }
    }

    fn command(&self) -> Command {
        let root = self.guard.root();
        let mut cmd = if self.jailed {
            jail::command(&self.config, root)
        } else {
            let mut cmd = Command::new(&self.config.interpreter);
            cmd.args(&self.config.interpreter_args);
            cmd
        };
        cmd.current_dir(root)
            .env_clear()
            .env("HOME", root)
            .env("TMPDIR", root)
            .env("SANDBOX_ROOT", root)
            .env("DATASET_PATH", &self.dataset.relative)
            .envs(&self.config.env);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd
    }

    /// 单元执行后的越界检查：解释器报告、工作目录、指向根目录外的符号链接
    fn detect_escape(&self, output: &CellOutput) -> Option<SandboxError> {
        if let Some(line) = output.stderr.lines().find(|l| l.contains(ESCAPE_SIGNAL)) {
            return Some(SandboxError::PathEscape(line.trim().to_string()));
        }
        if !self.jailed {
            if let Some(cwd) = self.session.as_ref().and_then(Session::cwd) {
                if !cwd.starts_with(self.guard.root()) {
                    return Some(SandboxError::PathEscape(format!(
                        "working directory moved to {}",
                        cwd.display()
                    )));
                }
            }
        }
        self.sweep_links()
    }

    /// 删除指向根目录之外的符号链接
    fn sweep_links(&self) -> Option<SandboxError> {
        let root = self.guard.root();
        let mut escaped = None;
        for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(Result::ok) {
            if !entry.path_is_symlink() {
                continue;
            }
            let outside = match std::fs::canonicalize(entry.path()) {
                Ok(target) => !target.starts_with(root),
                Err(_) => false,
            };
            if outside {
                let link = entry.path().strip_prefix(root).unwrap_or(entry.path()).display().to_string();
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    tracing::warn!(link = %link, error = %e, "failed to remove escaping symlink");
                }
                escaped.get_or_insert(SandboxError::PathEscape(format!(
                    "symlink {} points outside the sandbox",
                    link
                )));
            }
        }
        escaped
    }

    fn truncate(&self, text: String) -> String {
        let max = self.config.max_output_chars;
        if text.chars().count() <= max {
            return text;
        }
        let head: String = text.chars().take(max).collect();
        format!("{}\n... (output truncated at {} chars)", head, max)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 常驻 sh：单元文件被 source 进同一个 shell
    pub(crate) const SH_RUNNER: &str =
        r#"{ . "{cell}"; } </dev/null; __rc=$?; echo {marker} >&2; echo "{marker} $__rc""#;

    pub(crate) fn sh_config() -> SandboxSection {
        SandboxSection {
            interpreter: "sh".to_string(),
            interpreter_args: Vec::new(),
            file_extension: "sh".to_string(),
            exec_timeout_secs: 5,
            replay_history: false,
            runner_statement: SH_RUNNER.to_string(),
            env: Default::default(),
            ..SandboxSection::default()
        }
    }

    pub(crate) fn dataset_file(dir: &Path) -> PathBuf {
        let path = dir.join("sales.csv");
        std::fs::write(&path, "region,amount\nnorth,10\n").unwrap();
        path
    }

    #[tokio::test]
    async fn test_execute_returns_stdout() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        let out = sb.execute("echo hello").await.unwrap();
        assert_eq!(out.trim(), "hello");
        assert_eq!(sb.code_history().len(), 1);
    }

    #[tokio::test]
    async fn test_dataset_path_env_points_at_private_copy() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        let out = sb.execute("cat \"$DATASET_PATH\"").await.unwrap();
        assert!(out.contains("north,10"));
        assert!(sb.dataset().path.starts_with(sb.root()));
    }

    #[tokio::test]
    async fn test_failure_is_error_and_not_recorded() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        match sb.execute("echo boom >&2; exit 3").await {
            Err(SandboxError::Execution(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected execution error, got {other:?}"),
        }
        assert!(sb.code_history().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_then_still_usable() {
        let src = tempfile::tempdir().unwrap();
        let mut cfg = sh_config();
        cfg.exec_timeout_secs = 1;
        let mut sb = Sandbox::create(&cfg, None, &dataset_file(src.path())).unwrap();
        assert!(matches!(sb.execute("sleep 5").await, Err(SandboxError::Timeout(1))));
        let out = sb.execute("echo still-alive").await.unwrap();
        assert_eq!(out.trim(), "still-alive");
    }

    #[tokio::test]
    async fn test_path_outside_root_rejected() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        assert!(matches!(sb.execute("cat /etc/passwd").await, Err(SandboxError::PathEscape(_))));
        assert!(matches!(sb.execute("echo x > ../leak.txt").await, Err(SandboxError::PathEscape(_))));
        assert!(sb.code_history().is_empty());
    }

    #[tokio::test]
    async fn test_escapes_are_caught_at_runtime() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();

        assert!(matches!(
            sb.execute("cd / && cat etc/hostname").await,
            Err(SandboxError::PathEscape(_))
        ));

        match sb.execute("ln -s / up && cat up/etc/passwd | head -1").await {
            Err(SandboxError::PathEscape(msg)) => assert!(msg.contains("symlink up")),
            other => panic!("expected path escape, got {other:?}"),
        }
        assert!(std::fs::symlink_metadata(sb.root().join("up")).is_err());

        match sb.execute("cd \"$(dirname \"$PWD\")\" && ls").await {
            Err(SandboxError::PathEscape(msg)) => assert!(msg.contains("working directory")),
            other => panic!("expected path escape, got {other:?}"),
        }
        let pwd = sb.execute("pwd").await.unwrap();
        assert_eq!(pwd.trim(), sb.root().to_string_lossy());
        assert_eq!(sb.code_history(), ["pwd".to_string()]);
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .args(["-c", "import sys; sys.exit(0 if sys.version_info >= (3, 8) else 1)"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_python_driver_confines_file_access() {
        if !python_available() {
            return;
        }
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&SandboxSection::default(), None, &dataset_file(src.path())).unwrap();

        let out = sb
            .execute("import os\nprint(open(os.environ['DATASET_PATH']).readline().strip())")
            .await
            .unwrap();
        assert_eq!(out.trim(), "region,amount");

        match sb.execute("import os\nos.chdir(os.path.dirname(os.getcwd()))\nprint(os.listdir('.'))").await {
            Err(SandboxError::PathEscape(msg)) => assert!(msg.contains(ESCAPE_SIGNAL)),
            other => panic!("expected path escape, got {other:?}"),
        }
        assert!(matches!(
            sb.execute("print(open('/'.join(['', 'etc', 'hostname'])).read())").await,
            Err(SandboxError::PathEscape(_))
        ));

        assert_eq!(sb.execute("total = 10 / 4\nprint(total)").await.unwrap().trim(), "2.5");
        assert_eq!(sb.execute("print(total * 2)").await.unwrap().trim(), "5.0");
    }

    fn process_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            // 僵尸进程已经死了，只是还没被回收
            Ok(stat) => !stat
                .rsplit(") ")
                .next()
                .map(|rest| rest.starts_with('Z') || rest.starts_with('X'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn gone(pid: u32) -> bool {
        for _ in 0..40 {
            if !process_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_timeout_kills_background_processes() {
        let src = tempfile::tempdir().unwrap();
        let mut cfg = sh_config();
        cfg.exec_timeout_secs = 1;
        let mut sb = Sandbox::create(&cfg, None, &dataset_file(src.path())).unwrap();
        assert!(matches!(
            sb.execute("sleep 60 & echo $! > pid.txt; wait").await,
            Err(SandboxError::Timeout(1))
        ));
        let pid: u32 = std::fs::read_to_string(sb.root().join("pid.txt"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(gone(pid).await, "background process {pid} survived the timeout");
        assert_eq!(sb.execute("echo fresh").await.unwrap().trim(), "fresh");
    }

    #[tokio::test]
    async fn test_close_kills_background_processes() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        let pid: u32 = sb.execute("sleep 60 & echo $!").await.unwrap().trim().parse().unwrap();
        assert!(process_alive(pid));
        sb.close().unwrap();
        assert!(gone(pid).await, "background process {pid} survived close");
    }

    #[tokio::test]
    async fn test_files_persist_across_calls() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        sb.execute("echo hi > note.txt").await.unwrap();
        let out = sb.execute("cat note.txt").await.unwrap();
        assert_eq!(out.trim(), "hi");
    }

    #[tokio::test]
    async fn test_interpreter_state_persists_without_replay() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        sb.execute("X=5").await.unwrap();
        assert_eq!(sb.execute("echo $((X*2))").await.unwrap().trim(), "10");
    }

    #[tokio::test]
    async fn test_side_effects_apply_once() {
        let src = tempfile::tempdir().unwrap();
        let mut cfg = sh_config();
        cfg.replay_history = true;
        cfg.inspect_script = Some(r#"echo '{"tables":[]}'"#.to_string());
        let mut sb = Sandbox::create(&cfg, None, &dataset_file(src.path())).unwrap();
        sb.execute("echo total,17 >> \"$DATASET_PATH\"").await.unwrap();
        sb.inspect().await.unwrap();
        sb.execute("echo next").await.unwrap();
        sb.execute("echo again").await.unwrap();
        sb.inspect().await.unwrap();

        let data = std::fs::read_to_string(&sb.dataset().path).unwrap();
        assert_eq!(data.matches("total,17").count(), 1);
    }

    #[tokio::test]
    async fn test_replay_history_compounds_state() {
        let src = tempfile::tempdir().unwrap();
        let mut cfg = sh_config();
        cfg.replay_history = true;
        let mut sb = Sandbox::create(&cfg, None, &dataset_file(src.path())).unwrap();
        assert_eq!(sb.execute("X=41").await.unwrap().trim(), "");
        // 失败片段不进入重放历史
        assert!(sb.execute("X=0; exit 1").await.is_err());
        assert_eq!(sb.execute("echo $((X+1))").await.unwrap().trim(), "42");
    }

    #[tokio::test]
    async fn test_inspect_parses_script_output_and_lists_files() {
        let src = tempfile::tempdir().unwrap();
        let mut cfg = sh_config();
        cfg.inspect_script = Some(
            r#"echo '{"tables":[{"name":"Sales","columns":[{"name":"region"}],"row_count":2}]}'"#
                .to_string(),
        );
        let mut sb = Sandbox::create(&cfg, None, &dataset_file(src.path())).unwrap();
        let snap = sb.inspect().await.unwrap();
        assert_eq!(snap.tables[0].name, "Sales");
        assert_eq!(snap.tables[0].row_count, 2);
        assert!(snap.files.iter().any(|f| f.path == "data/sales.csv"));
        assert!(!snap.files.iter().any(|f| f.path.starts_with(".cells")));
    }

    #[tokio::test]
    async fn test_inspect_rejects_malformed_json() {
        let src = tempfile::tempdir().unwrap();
        let mut cfg = sh_config();
        cfg.inspect_script = Some("echo not-json".to_string());
        let mut sb = Sandbox::create(&cfg, None, &dataset_file(src.path())).unwrap();
        assert!(matches!(sb.inspect().await, Err(SandboxError::Inspect(_))));
    }

    #[tokio::test]
    async fn test_export_logs_and_close_reclaims_root() {
        let src = tempfile::tempdir().unwrap();
        let mut sb = Sandbox::create(&sh_config(), None, &dataset_file(src.path())).unwrap();
        sb.execute("echo one").await.unwrap();
        let _ = sb.execute("exit 2").await;
        let files = sb.export_logs().unwrap();
        assert_eq!(files.len(), 3);
        let code = std::fs::read_to_string(&files[0]).unwrap();
        assert!(code.contains("echo one"));

        let root = sb.root().to_path_buf();
        sb.close().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_missing_dataset_is_invalid() {
        let err = Sandbox::create(&sh_config(), None, Path::new("/nonexistent/book.xlsx"))
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, SandboxError::InvalidDataset(_)));
    }

    #[test]
    fn test_work_dir_parent_is_used() {
        let src = tempfile::tempdir().unwrap();
        let parent = tempfile::tempdir().unwrap();
        let sb = Sandbox::create(&sh_config(), Some(parent.path()), &dataset_file(src.path())).unwrap();
        let parent_canon = parent.path().canonicalize().unwrap();
        assert!(sb.root().starts_with(&parent_canon));
    }
}
