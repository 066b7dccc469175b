//! Parsing curator output into typed operations
//!
//! Accepts `{"reasoning": ..., "operations": [...]}` or a bare array. Each
//! record carries a `type` (any case) plus its kind-specific fields; counts
//! may sit at top level or under `metadata`. A bad record is reported and
//! skipped, a bad document is a [`ParseFailure`].

use serde_json::{Map, Value};

use super::DeltaOperation;
use crate::llm::response::{extract_json, opt_count, opt_str, opt_unit, req_str, str_list, ParseFailure};

/// A parsed operation plus the backend's own atomicity estimate, if any
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateOperation {
    pub operation: DeltaOperation,
    pub atomicity_hint: Option<f64>,
}

/// Result of parsing one curator response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDelta {
    pub reasoning: String,
    pub candidates: Vec<CandidateOperation>,
    /// Records that could not be parsed: (position, problem)
    pub invalid: Vec<(usize, ParseFailure)>,
}

/// Parse untrusted completion text into candidate operations
pub fn parse_delta(text: &str) -> Result<ParsedDelta, ParseFailure> {
    let value = extract_json(text)?;

    let (reasoning, records) = match value {
        Value::Array(records) => (String::new(), records),
        Value::Object(obj) => {
            let reasoning = opt_str(&obj, "reasoning")?.unwrap_or_default();
            match obj.get("operations") {
                Some(Value::Array(records)) => (reasoning, records.clone()),
                Some(Value::Null) => (reasoning, Vec::new()),
                Some(_) => return Err(ParseFailure::invalid("operations", "expected a list")),
                None => return Err(ParseFailure::MissingField("operations".to_string())),
            }
        }
        _ => return Err(ParseFailure::NoJson),
    };

    let mut parsed = ParsedDelta {
        reasoning,
        ..Default::default()
    };
    for (index, record) in records.iter().enumerate() {
        match parse_operation(record) {
            Ok(candidate) => parsed.candidates.push(candidate),
            Err(failure) => parsed.invalid.push((index, failure)),
        }
    }
    Ok(parsed)
}

fn parse_operation(record: &Value) -> Result<CandidateOperation, ParseFailure> {
    let obj = record
        .as_object()
        .ok_or_else(|| ParseFailure::invalid("operation", "expected an object"))?;

    let kind = ["type", "op", "kind"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .ok_or_else(|| ParseFailure::MissingField("type".to_string()))?
        .trim()
        .to_lowercase();

    let operation = match kind.as_str() {
        "add" => DeltaOperation::Add {
            section: req_str(obj, "section")?,
            content: req_str(obj, "content")?,
            tags: str_list(obj, "tags")?,
        },
        "update" => DeltaOperation::Update {
            bullet_id: bullet_id(obj)?,
            content: req_str(obj, "content")?,
        },
        "tag" => {
            let metadata = match obj.get("metadata") {
                Some(Value::Object(m)) => Some(m),
                None | Some(Value::Null) => None,
                Some(_) => return Err(ParseFailure::invalid("metadata", "expected an object")),
            };
            let count = |field: &str| -> Result<u32, ParseFailure> {
                if let Some(n) = opt_count(obj, field)? {
                    return Ok(n);
                }
                match metadata {
                    Some(m) => Ok(opt_count(m, field)?.unwrap_or(0)),
                    None => Ok(0),
                }
            };
            DeltaOperation::Tag {
                bullet_id: bullet_id(obj)?,
                helpful: count("helpful")?,
                harmful: count("harmful")?,
            }
        }
        "remove" | "delete" => DeltaOperation::Remove {
            bullet_id: bullet_id(obj)?,
        },
        other => return Err(ParseFailure::invalid("type", format!("unknown operation '{}'", other))),
    };

    Ok(CandidateOperation {
        operation,
        atomicity_hint: opt_unit(obj, "atomicity_score")?,
    })
}

fn bullet_id(obj: &Map<String, Value>) -> Result<String, ParseFailure> {
    match opt_str(obj, "bullet_id")? {
        Some(id) => Ok(id.trim().to_string()),
        None => Ok(req_str(obj, "id")
            .map_err(|_| ParseFailure::MissingField("bullet_id".to_string()))?
            .trim()
            .to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_after_prose() {
        let text = "Here are the operations:\n[{\"type\": \"ADD\", \"section\": \"validation\", \"content\": \"Check for null before dereferencing\"}]";
        let parsed = parse_delta(text).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(
            parsed.candidates[0].operation,
            DeltaOperation::add("validation", "Check for null before dereferencing")
        );

        // An object holding a list still wins when it comes first
        let wrapped = r#"Delta: {"reasoning": "r", "operations": [{"type": "REMOVE", "bullet_id": "nav-00001"}]}"#;
        let parsed = parse_delta(wrapped).unwrap();
        assert_eq!(parsed.reasoning, "r");
        assert_eq!(parsed.candidates[0].operation, DeltaOperation::remove("nav-00001"));
    }

    #[test]
    fn test_parse_full_document() {
        let text = r#"Sure, here is the delta:
```json
{
  "reasoning": "Missing null check caused the crash",
  "operations": [
    {"type": "ADD", "section": "validation", "content": "Check for null before dereferencing", "atomicity_score": 0.9},
    {"type": "TAG", "bullet_id": "nav-00001", "metadata": {"helpful": 1, "harmful": 0}},
    {"type": "update", "id": "nav-00002", "content": "Wait for network idle"},
    {"type": "REMOVE", "bullet_id": "nav-00003"}
  ]
}
```"#;
        let parsed = parse_delta(text).unwrap();
        assert_eq!(parsed.reasoning, "Missing null check caused the crash");
        assert!(parsed.invalid.is_empty());
        let ops: Vec<&DeltaOperation> = parsed.candidates.iter().map(|c| &c.operation).collect();
        assert_eq!(
            ops,
            vec![
                &DeltaOperation::add("validation", "Check for null before dereferencing"),
                &DeltaOperation::tag("nav-00001", 1, 0),
                &DeltaOperation::update("nav-00002", "Wait for network idle"),
                &DeltaOperation::remove("nav-00003"),
            ]
        );
        assert_eq!(parsed.candidates[0].atomicity_hint, Some(0.9));
        assert_eq!(parsed.candidates[1].atomicity_hint, None);
    }

    #[test]
    fn test_parse_bare_array_and_top_level_counts() {
        let parsed = parse_delta(r#"[{"type": "tag", "bullet_id": "nav-00001", "harmful": 2}]"#).unwrap();
        assert_eq!(parsed.candidates[0].operation, DeltaOperation::tag("nav-00001", 0, 2));
    }

    #[test]
    fn test_bad_records_are_reported() {
        let parsed = parse_delta(
            r#"{"operations": [
                {"type": "merge", "bullet_id": "x-00001"},
                {"type": "add", "section": "nav"},
                {"type": "tag", "bullet_id": "nav-00001", "helpful": -1},
                "not an object",
                {"type": "remove", "bullet_id": "nav-00004"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        let positions: Vec<usize> = parsed.invalid.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert_eq!(parsed.invalid[1].1, ParseFailure::MissingField("content".into()));
    }

    #[test]
    fn test_bad_documents() {
        assert_eq!(parse_delta("I have no suggestions."), Err(ParseFailure::NoJson));
        assert_eq!(
            parse_delta(r#"{"reasoning": "nothing"}"#),
            Err(ParseFailure::MissingField("operations".into()))
        );
        assert!(matches!(parse_delta(r#"{"operations": 5}"#), Err(ParseFailure::InvalidField { .. })));
        assert!(parse_delta(r#"{"operations": []}"#).unwrap().candidates.is_empty());
    }
}
