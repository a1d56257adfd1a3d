//! bubblewrap 监狱：把解释器放进只读系统目录 + 可写私有根目录的挂载命名空间
//!
//! 私有根目录以原路径绑定进去，脚本看到的绝对路径与宿主一致；其它宿主路径不可见。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tokio::process::Command;

use crate::config::{JailMode, SandboxSection};
use crate::core::SandboxError;

const BWRAP: &str = "bwrap";

/// 按配置决定是否启用监狱
pub(crate) fn enabled(mode: JailMode) -> Result<bool, SandboxError> {
    match mode {
        JailMode::Off => Ok(false),
        JailMode::Auto => {
            let usable = bubblewrap_usable();
            if !usable {
                tracing::warn!("bubblewrap unavailable, sandbox runs without a jail");
            }
            Ok(usable)
        }
        JailMode::Bubblewrap if bubblewrap_usable() => Ok(true),
        JailMode::Bubblewrap => Err(SandboxError::Setup(
            "jail = \"bubblewrap\" but bwrap cannot create a namespace on this host".to_string(),
        )),
    }
}

/// 实际起一次空监狱来判断（装了 bwrap 但禁用了用户命名空间时也算不可用）
fn bubblewrap_usable() -> bool {
    static USABLE: OnceLock<bool> = OnceLock::new();
    *USABLE.get_or_init(|| {
        std::process::Command::new(BWRAP)
            .args(["--unshare-all", "--ro-bind", "/", "/", "--", "true"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

/// 构造 `bwrap ... -- <interpreter> <args>`
pub(crate) fn command(config: &SandboxSection, root: &Path) -> Command {
    let mut cmd = Command::new(BWRAP);
    cmd.args(["--unshare-all", "--die-with-parent", "--new-session"]);
    let mut binds: Vec<PathBuf> = config.jail_ro_binds.iter().map(PathBuf::from).collect();
    if let Some(prefix) = interpreter_prefix(&config.interpreter) {
        binds.push(prefix);
    }
    for bind in binds {
        cmd.arg("--ro-bind-try").arg(&bind).arg(&bind);
    }
    cmd.args(["--proc", "/proc", "--dev", "/dev", "--tmpfs", "/tmp"]);
    cmd.arg("--bind").arg(root).arg(root);
    cmd.arg("--chdir").arg(root);
    cmd.arg("--").arg(&config.interpreter).args(&config.interpreter_args);
    cmd
}

/// 解释器安装前缀（`<prefix>/bin/python3` 的 `<prefix>`），让 /usr 之外的安装也能在监狱里运行
fn interpreter_prefix(interpreter: &str) -> Option<PathBuf> {
    let candidate = Path::new(interpreter);
    let found = if candidate.is_absolute() {
        Some(candidate.to_path_buf())
    } else {
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(interpreter))
                .find(|p| p.is_file())
        })
    }?;
    let real = found.canonicalize().ok()?;
    let prefix = real.parent()?.parent()?.to_path_buf();
    (prefix != Path::new("/")).then_some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_off_never_jails() {
        assert!(!enabled(JailMode::Off).unwrap());
    }

    #[test]
    fn test_command_binds_root_at_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = command(&SandboxSection::default(), dir.path());
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        let root = dir.path().to_string_lossy().to_string();
        let bind = args.iter().position(|a| a == "--bind").unwrap();
        assert_eq!(args[bind + 1], root);
        assert_eq!(args[bind + 2], root);
        let sep = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(args[sep + 1], "python3");
        assert!(args.contains(&"--die-with-parent".to_string()));
    }
}
