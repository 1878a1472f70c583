//! Classification response parsing.
//!
//! Models wrap their JSON in prose or code fences often enough that the
//! payload is taken to be the span from the first `{` to the last `}`.

use serde_json::Value;
use tracing::warn;

use riskclause_shared::{CanonicalTermSet, PageClassification, Result, RiskClauseError};

/// The substring from the first `{` through the last `}` of `raw`.
pub fn extract_json_object(raw: &str) -> Result<&str> {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&raw[start..=end]),
        _ => Err(RiskClauseError::classification_parse(
            "response contains no JSON object",
        )),
    }
}

/// Parse a raw completion into a classification restricted to `terms`.
///
/// String values become one sentence, arrays contribute their string
/// elements. Blank strings, other value types and keys outside the term
/// set are dropped.
pub fn parse_classification(raw: &str, terms: &CanonicalTermSet) -> Result<PageClassification> {
    let json = extract_json_object(raw)?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| RiskClauseError::classification_parse(format!("invalid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(RiskClauseError::classification_parse(
            "response is not a JSON object",
        ));
    };

    let mut classification = PageClassification::new();
    for (key, value) in map {
        if !terms.contains(&key) {
            warn!(term = %key, "dropping term outside the risk table");
            continue;
        }
        let sentences = sentences(value);
        if !sentences.is_empty() {
            classification.insert(key, sentences);
        }
    }

    Ok(classification)
}

fn sentences(value: Value) -> Vec<String> {
    match value {
        Value::String(s) => non_blank(s).into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => non_blank(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}
