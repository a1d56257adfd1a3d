//! 推理输出解析：抽取 JSON 块并按格式校验，不合法即 Malformed

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::ReasoningError;
use crate::reasoning::schema::{DecisionFormat, DecompositionFormat, ReflectionFormat};
use crate::reasoning::{Decision, ReflectionVerdict};

const FINISH: &str = "finish";

/// ```json 代码块优先，否则取第一个 `{` 到最后一个 `}`
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn parse_format<T: DeserializeOwned>(output: &str) -> Result<T, ReasoningError> {
    let json = extract_json(output)
        .ok_or_else(|| ReasoningError::Malformed(format!("no JSON object in reply: {}", preview(output))))?;
    serde_json::from_str(json).map_err(|e| ReasoningError::Malformed(format!("{}: {}", e, preview(json))))
}

pub fn parse_decision(output: &str) -> Result<Decision, ReasoningError> {
    let parsed: DecisionFormat = parse_format(output)?;
    let action = parsed.action.trim().to_string();
    let thought = parsed.thought.filter(|t| !t.trim().is_empty());
    if action.is_empty() {
        return Err(ReasoningError::Malformed("empty action name".to_string()));
    }
    if action == FINISH {
        return Ok(Decision::Finish { thought });
    }
    let args = match parsed.args {
        Value::Null => Value::Object(Default::default()),
        obj @ Value::Object(_) => obj,
        other => {
            return Err(ReasoningError::Malformed(format!(
                "args for {} must be an object, got {}",
                action, other
            )))
        }
    };
    Ok(Decision::Invoke {
        action,
        args,
        thought,
    })
}

/// 去掉空白项；全部为空时返回空列表
pub fn parse_subtasks(output: &str) -> Result<Vec<String>, ReasoningError> {
    let parsed: DecompositionFormat = parse_format(output)?;
    Ok(parsed
        .subtasks
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

pub fn parse_verdict(output: &str) -> Result<ReflectionVerdict, ReasoningError> {
    let parsed: ReflectionFormat = parse_format(output)?;
    Ok(ReflectionVerdict {
        is_solved: parsed.is_solved,
        issues: parsed.issues.filter(|i| !i.trim().is_empty()),
    })
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
