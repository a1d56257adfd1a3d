//! 路径守卫：所有路径必须落在运行私有根目录内
//!
//! - `resolve`：已存在路径经 canonicalize 校验（防 ../ 与符号链接逃逸），供 read_file / list_files
//! - `check`：不要求存在，按词法归一化后校验，供导出等写路径
//! - `scan`：执行前扫描代码片段中出现的路径字面量，越界即拒绝执行

use std::path::{Component, Path, PathBuf};

use crate::core::SandboxError;

/// 片段分词时视为分隔的字符
const TOKEN_DELIMITERS: &[char] = &[
    ' ', '\t', '\n', '\r', '\'', '"', '`', '(', ')', ',', ';', '=', '[', ']', '{', '}', '<', '>',
    '|', '&',
];

#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 已存在路径：canonicalize 后必须以 root 开头
    pub fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let trimmed = path.trim();
        let full = if Path::new(trimmed).is_absolute() {
            PathBuf::from(trimmed)
        } else {
            self.root.join(trimmed.trim_start_matches("./"))
        };
        let canonical = full
            .canonicalize()
            .map_err(|_| SandboxError::Execution(format!("Path not found: {}", trimmed)))?;
        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            Err(SandboxError::PathEscape(trimmed.to_string()))
        }
    }

    /// 词法校验（不访问文件系统）
    pub fn check(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let trimmed = path.trim();
        if trimmed.starts_with('~') {
            return Err(SandboxError::PathEscape(trimmed.to_string()));
        }
        let candidate = Path::new(trimmed);
        let (base, rest): (PathBuf, &Path) = if candidate.is_absolute() {
            (PathBuf::new(), candidate)
        } else {
            (self.root.clone(), candidate)
        };
        let normalized = normalize(base, rest)
            .ok_or_else(|| SandboxError::PathEscape(trimmed.to_string()))?;
        if normalized.starts_with(&self.root) {
            Ok(normalized)
        } else {
            Err(SandboxError::PathEscape(trimmed.to_string()))
        }
    }

    /// 扫描代码中的路径字面量：`~`、绝对路径、含 `/` 或 `..` 的相对路径，
    /// 以及作为命令参数出现的裸 `/`（`cd /`、`ls /;`）
    pub fn scan(&self, code: &str) -> Result<(), SandboxError> {
        for (start, token) in tokens(code) {
            if token.chars().all(|c| c == '/') {
                if ends_statement(&code[start + token.len()..]) {
                    tracing::warn!("filesystem root referenced by code");
                    return Err(SandboxError::PathEscape(token.to_string()));
                }
                continue;
            }
            if !looks_like_path(token) {
                continue;
            }
            if let Err(e) = self.check(token) {
                tracing::warn!(token = %token, "path outside sandbox referenced by code");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// 按分隔符切词，保留每个词在原文中的字节偏移
fn tokens(code: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in code.char_indices() {
        if TOKEN_DELIMITERS.contains(&c) {
            if let Some(s) = start.take() {
                out.push((s, &code[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((s, &code[s..]));
    }
    out
}

/// 裸 `/` 之后直接是语句结束：这是命令参数，不是除号
fn ends_statement(rest: &str) -> bool {
    match rest.trim_start_matches([' ', '\t']).chars().next() {
        None => true,
        Some(c) => matches!(c, '\n' | '\r' | ';' | '&' | '|' | ')'),
    }
}

fn looks_like_path(token: &str) -> bool {
    if token.starts_with('~') || token == ".." {
        return true;
    }
    if let Some(rest) = token.strip_prefix('/') {
        // `//`、`/=` 等运算符不算路径
        return rest
            .chars()
            .next()
            .map(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
            .unwrap_or(false);
    }
    token.contains("..") && token.contains('/')
}

/// 逐段归一化；`..` 越过起点时返回 None
fn normalize(mut base: PathBuf, rest: &Path) -> Option<PathBuf> {
    let floor = base.components().count();
    for component in rest.components() {
        match component {
            Component::Prefix(p) => base.push(p.as_os_str()),
            Component::RootDir => base.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if base.components().count() <= floor.max(1) {
                    return None;
                }
                base.pop();
            }
            Component::Normal(part) => base.push(part),
        }
    }
    Some(base)
}
