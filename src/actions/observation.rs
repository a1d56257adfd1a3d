//! Observation：一次动作分发的归一化结果，原样写入历史供推理端自我修正

use serde::{Deserialize, Serialize};

use crate::core::{ActionError, SandboxError};

/// 错误观察的分类标签
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Execution,
    Timeout,
    PathEscape,
    UnknownAction,
    InvalidArguments,
    Reasoning,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Execution => "execution",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PathEscape => "path_escape",
            ErrorKind::UnknownAction => "unknown_action",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::Reasoning => "reasoning",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    pub fn from_sandbox(err: &SandboxError) -> Self {
        match err {
            SandboxError::Timeout(_) => ErrorKind::Timeout,
            SandboxError::PathEscape(_) => ErrorKind::PathEscape,
            SandboxError::Execution(_) | SandboxError::Io(_) => ErrorKind::Execution,
            SandboxError::Spawn(_)
            | SandboxError::Inspect(_)
            | SandboxError::Setup(_)
            | SandboxError::InvalidDataset(_)
            | SandboxError::Teardown(_) => ErrorKind::Unavailable,
        }
    }

    pub fn from_action(err: &ActionError) -> Self {
        match err {
            ActionError::UnknownAction(_) => ErrorKind::UnknownAction,
            ActionError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            ActionError::Sandbox(e) => ErrorKind::from_sandbox(e),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Observation {
    Ok {
        payload: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl Observation {
    pub fn ok(payload: impl Into<String>) -> Self {
        Observation::Ok {
            payload: payload.into(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Observation::Error {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(self, text: impl Into<String>) -> Self {
        match self {
            Observation::Error { kind, message, .. } => Observation::Error {
                kind,
                message,
                detail: Some(text.into()),
            },
            ok => ok,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Observation::Ok { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Observation::Error { kind, .. } => Some(*kind),
            Observation::Ok { .. } => None,
        }
    }

    /// 写进 prompt 的文本形式
    pub fn render(&self) -> String {
        match self {
            Observation::Ok { payload } => format!("ok: {}", payload),
            Observation::Error {
                kind,
                message,
                detail,
            } => match detail {
                Some(d) => format!("error ({}): {}\n{}", kind, message, d),
                None => format!("error ({}): {}", kind, message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tag_is_status() {
        let obs = Observation::error(ErrorKind::Timeout, "slow").with_detail("cell 3");
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["detail"], "cell 3");
        let ok = serde_json::to_value(Observation::ok("done")).unwrap();
        assert_eq!(ok["status"], "ok");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ErrorKind::from_action(&ActionError::Sandbox(SandboxError::PathEscape("/etc".into()))),
            ErrorKind::PathEscape
        );
        assert_eq!(
            ErrorKind::from_sandbox(&SandboxError::Spawn("python3".into())),
            ErrorKind::Unavailable
        );
    }

    #[test]
    fn test_render_keeps_raw_message() {
        let obs = Observation::error(ErrorKind::Execution, "NameError: x");
        assert_eq!(obs.render(), "error (execution): NameError: x");
    }
}
