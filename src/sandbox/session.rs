//! 常驻解释器进程
//!
//! 每个沙箱至多一个解释器子进程，自成进程组。代码单元写成文件后，runner 语句经 stdin 送入；
//! stdout / stderr 由后台任务按行读取，以 marker 行切分出每个单元的输出。
//! Session 被 drop 时整个进程组被 SIGKILL，后台派生的进程一并回收。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

use crate::core::SandboxError;

/// 解释器退出后等待 stderr 剩余内容的时间
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellStatus {
    Ok,
    Failed(i32),
    /// 解释器在单元执行过程中退出
    Exited,
}

#[derive(Debug)]
pub(crate) struct CellOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: CellStatus,
}

pub(crate) struct Session {
    child: Child,
    /// 进程组号（= 解释器 pid）；解释器先退出时仍可用来回收它派生的进程
    pgid: Option<u32>,
    stdin: ChildStdin,
    stdout: mpsc::UnboundedReceiver<String>,
    stderr: mpsc::UnboundedReceiver<String>,
}

impl Session {
    /// cmd 已配置好程序、参数、cwd 与环境；这里接管 stdio 与进程组
    pub(crate) fn spawn(mut cmd: Command, program: &str) -> Result<Self, SandboxError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("{}: {}", program, e)))?;
        let pgid = child.id();
        let missing = |what: &str| SandboxError::Spawn(format!("{}: no {} pipe", program, what));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        tracing::debug!(pid = ?pgid, program, "interpreter started");
        Ok(Self {
            child,
            pgid,
            stdin,
            stdout: pump(stdout),
            stderr: pump(stderr),
        })
    }

    pub(crate) fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// 解释器当前工作目录（读 /proc，其它平台返回 None）
    pub(crate) fn cwd(&self) -> Option<PathBuf> {
        let pid = self.child.id()?;
        std::fs::read_link(Path::new("/proc").join(pid.to_string()).join("cwd")).ok()
    }

    /// 发送一条 runner 语句并收集该单元的输出；调用方负责超时
    pub(crate) async fn run(&mut self, statement: &str, marker: &str) -> CellOutput {
        let sent = async {
            self.stdin.write_all(statement.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await
        }
        .await;

        let mut stdout = Vec::new();
        let status = if sent.is_err() {
            CellStatus::Exited
        } else {
            loop {
                match self.stdout.recv().await {
                    Some(line) => match line.find(marker) {
                        Some(idx) => {
                            if idx > 0 {
                                stdout.push(line[..idx].to_string());
                            }
                            let code = line[idx + marker.len()..].trim().parse::<i32>().unwrap_or(1);
                            break if code == 0 {
                                CellStatus::Ok
                            } else {
                                CellStatus::Failed(code)
                            };
                        }
                        None => stdout.push(line),
                    },
                    None => break CellStatus::Exited,
                }
            }
        };

        let stderr = match status {
            CellStatus::Exited => self.drain_stderr().await,
            _ => self.stderr_until(marker).await,
        };
        CellOutput {
            stdout: stdout.join("\n"),
            stderr: stderr.join("\n"),
            status,
        }
    }

    async fn stderr_until(&mut self, marker: &str) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.stderr.recv().await {
            match line.find(marker) {
                Some(idx) => {
                    if idx > 0 {
                        lines.push(line[..idx].to_string());
                    }
                    break;
                }
                None => lines.push(line),
            }
        }
        lines
    }

    async fn drain_stderr(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(Some(line)) = tokio::time::timeout(DRAIN_GRACE, self.stderr.recv()).await {
            lines.push(line);
        }
        lines
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pgid) = self.pgid {
                // SAFETY: killpg 只发信号，不涉及内存；进程组已不存在时返回 ESRCH
                unsafe {
                    libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
                }
            }
        }
        let _ = self.child.start_kill();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill();
        tracing::debug!(pid = ?self.pgid, "interpreter stopped");
    }
}

/// 后台按行读取管道；非 UTF-8 内容按 lossy 处理
fn pump<R>(reader: R) -> mpsc::UnboundedReceiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
