//! Best-effort parsers for free-text agent output.
//!
//! None of these return errors. A missing or malformed structure means "use
//! the default", never "abort the run".

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::types::{Plan, Reflection, Verdict};

static VERDICT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(PASS|FAIL)\b").expect("valid verdict regex"));

/// Slice from the first `{` to the last `}`.
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(json_object_span(text)?) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Wrap the Planner's output. Steps are extracted when `{"steps": [...]}` is present.
pub fn parse_plan(text: &str) -> Plan {
    let steps = parse_json_object(text)
        .map(|map| string_list(map.get("steps")))
        .unwrap_or_default();
    Plan {
        text: text.trim().to_string(),
        steps,
    }
}

/// Parse a Reflector response.
///
/// Accepts `shouldResearch`/`should_research`, `searchQueries`/`search_queries`,
/// and the older single `search_query` + `root_cause` shape, which implies research.
pub fn parse_reflection(text: &str) -> Option<Reflection> {
    let map = parse_json_object(text)?;

    let mut search_queries = string_list(map.get("searchQueries").or_else(|| map.get("search_queries")));
    let legacy_query = map
        .get("search_query")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty());
    if search_queries.is_empty() {
        if let Some(q) = legacy_query {
            search_queries.push(q.to_string());
        }
    }

    let should_research = map
        .get("shouldResearch")
        .or_else(|| map.get("should_research"))
        .and_then(Value::as_bool)
        .unwrap_or(legacy_query.is_some());

    let reason = ["reason", "root_cause", "missing_knowledge"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(Reflection {
        should_research,
        reason,
        search_queries,
    })
}

/// Parse a Reviewer response. The first standalone `PASS`/`FAIL` decides.
///
/// Output without either token is a rejection carrying the whole text.
pub fn parse_verdict(text: &str) -> Verdict {
    let trimmed = text.trim();
    match VERDICT_TOKEN.captures(trimmed) {
        Some(caps) if &caps[1] == "PASS" => Verdict::Accepted,
        Some(caps) => {
            let after = caps.get(0).map(|m| &trimmed[m.end()..]).unwrap_or_default();
            let issues = strip_separator(after);
            Verdict::Rejected {
                issues: if issues.trim().is_empty() {
                    trimmed.to_string()
                } else {
                    issues.trim_end().to_string()
                },
            }
        }
        None => Verdict::Rejected {
            issues: trimmed.to_string(),
        },
    }
}

/// Drop an optional `:` or `-` right after the verdict token (same line only)
/// and the whitespace that follows it. Bullet markers on later lines stay.
fn strip_separator(after: &str) -> &str {
    let rest = after.trim_start_matches([' ', '\t']);
    let rest = rest.strip_prefix([':', '-']).unwrap_or(rest);
    rest.trim_start()
}
