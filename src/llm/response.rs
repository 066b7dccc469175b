//! Turning untrusted completion text into JSON values
//!
//! Models wrap JSON in prose or code fences. We take the whole text if it
//! parses, otherwise the span from the first `{` to the last `}` (or `[`/`]`).

use serde_json::{Map, Value};
use thiserror::Error;

/// Backend text that could not be turned into the expected structure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no JSON object found in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

impl ParseFailure {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseFailure::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Pull the JSON payload out of a completion
pub fn extract_json(text: &str) -> Result<Value, ParseFailure> {
    extract_value(text, false)
}

fn extract_value(text: &str, object_first: bool) -> Result<Value, ParseFailure> {
    let trimmed = strip_code_fence(text.trim());
    if trimmed.is_empty() {
        return Err(ParseFailure::NoJson);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Ok(value);
        }
    }

    // Try the outermost span first: a list of objects starts with '['
    let mut spans = [('{', '}'), ('[', ']')];
    if let (false, Some(brace), Some(bracket)) = (object_first, trimmed.find('{'), trimmed.find('[')) {
        if bracket < brace {
            spans.reverse();
        }
    }

    let mut last_error = None;
    for (open, close) in spans {
        let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) else {
            continue;
        };
        if end <= start {
            continue;
        }
        match serde_json::from_str::<Value>(&trimmed[start..=end]) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    match last_error {
        Some(e) => Err(ParseFailure::InvalidJson(e)),
        None => Err(ParseFailure::NoJson),
    }
}

/// Extract and require a JSON object
pub fn extract_object(text: &str) -> Result<Map<String, Value>, ParseFailure> {
    match extract_value(text, true)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseFailure::NoJson),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Optional string field; non-strings are an error
pub fn opt_str(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, ParseFailure> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ParseFailure::invalid(field, "expected a string")),
    }
}

pub fn req_str(obj: &Map<String, Value>, field: &str) -> Result<String, ParseFailure> {
    opt_str(obj, field)?.ok_or_else(|| ParseFailure::MissingField(field.to_string()))
}

/// String list, tolerating a single bare string
pub fn str_list(obj: &Map<String, Value>, field: &str) -> Result<Vec<String>, ParseFailure> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ParseFailure::invalid(field, "expected a list of strings"))
            })
            .collect(),
        Some(_) => Err(ParseFailure::invalid(field, "expected a list of strings")),
    }
}

/// Non-negative integer count; accepts whole floats and numeric strings
pub fn opt_count(obj: &Map<String, Value>, field: &str) -> Result<Option<u32>, ParseFailure> {
    let value = match obj.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(Some(n as u32)),
        Some(_) => Err(ParseFailure::invalid(field, "expected a non-negative integer")),
        None => Err(ParseFailure::invalid(field, "expected a number")),
    }
}

/// Score in [0, 1]; out-of-range numbers are clamped
pub fn opt_unit(obj: &Map<String, Value>, field: &str) -> Result<Option<f64>, ParseFailure> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64().map(|v| v.clamp(0.0, 1.0))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|v| Some(v.clamp(0.0, 1.0)))
            .map_err(|_| ParseFailure::invalid(field, "expected a number")),
        Some(_) => Err(ParseFailure::invalid(field, "expected a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_plain_and_fenced() {
        assert_eq!(extract_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```").unwrap(), json!({"a": 1}));
        assert_eq!(extract_json("```\n[1, 2]\n```").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_extract_embedded() {
        let text = "Here is my analysis:\n{\"reasoning\": \"ok\", \"nested\": {\"x\": 1}}\nHope that helps.";
        assert_eq!(extract_json(text).unwrap()["nested"]["x"], 1);
    }

    #[test]
    fn test_extract_list_before_object() {
        let text = "Operations:\n[{\"type\": \"REMOVE\"}, {\"type\": \"TAG\"}]";
        assert_eq!(extract_json(text).unwrap(), json!([{"type": "REMOVE"}, {"type": "TAG"}]));

        // Objects are still found behind a bracketed citation
        let cited = "Per [nav-00001]: {\"reasoning\": \"ok\"}";
        assert_eq!(extract_json(cited).unwrap(), json!({"reasoning": "ok"}));
        assert_eq!(extract_object("[1] then {\"a\": 1}").unwrap()["a"], 1);
    }

    #[test]
    fn test_extract_failures() {
        assert_eq!(extract_json(""), Err(ParseFailure::NoJson));
        assert_eq!(extract_json("no structure here"), Err(ParseFailure::NoJson));
        assert!(matches!(extract_json("{ broken: "), Err(ParseFailure::NoJson)));
        assert!(matches!(extract_json("{ broken: }"), Err(ParseFailure::InvalidJson(_))));
        assert_eq!(extract_object("[1]"), Err(ParseFailure::NoJson));
    }

    #[test]
    fn test_field_helpers() {
        let obj = json!({
            "name": "x",
            "n": 3,
            "f": 2.0,
            "neg": -1,
            "s": "4",
            "ids": ["a", "b"],
            "one": "c",
            "score": 1.7
        });
        let obj = obj.as_object().unwrap();

        assert_eq!(req_str(obj, "name").unwrap(), "x");
        assert_eq!(req_str(obj, "missing"), Err(ParseFailure::MissingField("missing".into())));
        assert!(opt_str(obj, "n").is_err());
        assert_eq!(opt_count(obj, "n").unwrap(), Some(3));
        assert_eq!(opt_count(obj, "f").unwrap(), Some(2));
        assert_eq!(opt_count(obj, "s").unwrap(), Some(4));
        assert!(opt_count(obj, "neg").is_err());
        assert_eq!(str_list(obj, "ids").unwrap(), vec!["a", "b"]);
        assert_eq!(str_list(obj, "one").unwrap(), vec!["c"]);
        assert_eq!(opt_unit(obj, "score").unwrap(), Some(1.0));
    }
}
