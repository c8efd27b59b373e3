//! Snippet extraction from DataForSEO SERP documents.
//!
//! Navigation is explicit: every step either finds the next node, reports it as
//! absent (a normal outcome, the snippet is simply not there), or fails with
//! `MalformedResponse` when a node exists but has the wrong JSON kind.

use crate::canon::{canonical_text, is_blank};
use serde_json::{Map, Value};
use serpsim_core::{Error, ExtractMode, Result, Snippet};

#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Found(T),
    /// Names the node that was missing.
    Absent(&'static str),
}

macro_rules! step {
    ($e:expr) => {
        match $e? {
            Step::Found(v) => v,
            Step::Absent(why) => return Ok(Step::Absent(why)),
        }
    };
}

/// Parse a response body. Anything that is not a JSON object is malformed.
pub fn parse_document(bytes: &[u8]) -> Result<Value> {
    let v: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::MalformedResponse(format!("response is not JSON: {e}")))?;
    if !v.is_object() {
        return Err(Error::MalformedResponse(
            "response top level is not an object".to_string(),
        ));
    }
    Ok(v)
}

fn root(doc: &Value) -> Result<&Map<String, Value>> {
    doc.as_object().ok_or_else(|| {
        Error::MalformedResponse("response top level is not an object".to_string())
    })
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<Step<&'a [Value]>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Step::Absent(key)),
        Some(Value::Array(a)) if a.is_empty() => Ok(Step::Absent(key)),
        Some(Value::Array(a)) => Ok(Step::Found(a.as_slice())),
        Some(_) => Err(Error::MalformedResponse(format!("`{key}` is not a list"))),
    }
}

fn object_at<'a>(
    items: &'a [Value],
    idx: usize,
    what: &'static str,
) -> Result<Step<&'a Map<String, Value>>> {
    match items.get(idx) {
        None | Some(Value::Null) => Ok(Step::Absent(what)),
        Some(Value::Object(o)) => Ok(Step::Found(o)),
        Some(_) => Err(Error::MalformedResponse(format!(
            "`{what}` entry {idx} is not an object"
        ))),
    }
}

/// `tasks[task_index].result[0]`
pub fn task_result(doc: &Value, task_index: usize) -> Result<Step<&Map<String, Value>>> {
    let top = root(doc)?;
    let tasks = step!(array_field(top, "tasks"));
    let task = step!(object_at(tasks, task_index, "tasks"));
    let results = step!(array_field(task, "result"));
    let first = step!(object_at(results, 0, "result"));
    Ok(Step::Found(first))
}

/// Extract from the first task (single-task responses).
pub fn extract(doc: &Value, mode: ExtractMode) -> Result<Snippet> {
    extract_task(doc, 0, mode)
}

pub fn extract_task(doc: &Value, task_index: usize, mode: ExtractMode) -> Result<Snippet> {
    let result = match task_result(doc, task_index)? {
        Step::Found(r) => r,
        Step::Absent(node) => {
            tracing::debug!(task_index, node, "no task result in response");
            return Ok(Snippet::absent());
        }
    };
    match mode {
        ExtractMode::AnswerBox => Ok(answer_box(result)),
        ExtractMode::AiOverview => ai_overview(result),
    }
}

fn answer_box(result: &Map<String, Value>) -> Snippet {
    match result.get("answer_box") {
        Some(v) if !is_blank(v) => Snippet::found(canonical_text(v), Some(v.clone())),
        _ => Snippet::absent(),
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn ai_overview(result: &Map<String, Value>) -> Result<Snippet> {
    let items = match array_field(result, "items")? {
        Step::Found(items) => items,
        Step::Absent(_) => return Ok(Snippet::absent()),
    };
    // Non-object entries and entries without `type` are skipped, not errors.
    let found = items.iter().filter_map(|v| v.as_object()).find(|o| {
        o.get("type").and_then(|t| t.as_str()) == Some("ai_overview")
    });
    let Some(block) = found else {
        return Ok(Snippet::absent());
    };

    let text = str_field(block, "text").unwrap_or_else(|| nested_text(block));
    let structured = serde_json::json!({
        "title": str_field(block, "title"),
        "url": str_field(block, "url"),
        "source": str_field(block, "source"),
        "text": text.clone(),
        "references": block.get("references").cloned().unwrap_or(Value::Null),
    });
    Ok(Snippet::found(text, Some(structured)))
}

// Some AI overview blocks carry their prose in nested `items[].text` instead of a top-level `text`.
fn nested_text(block: &Map<String, Value>) -> String {
    let Some(Value::Array(parts)) = block.get("items") else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|p| p.as_object())
        .filter_map(|p| str_field(p, "text"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `tasks[task_index].result[0].search_metadata.raw_html_file`, if any.
pub fn raw_html_file(doc: &Value, task_index: usize) -> Result<Option<String>> {
    let result = match task_result(doc, task_index)? {
        Step::Found(r) => r,
        Step::Absent(_) => return Ok(None),
    };
    let link = result
        .get("search_metadata")
        .and_then(|m| m.as_object())
        .and_then(|m| str_field(m, "raw_html_file"));
    Ok(link)
}

/// Task-level status reported by the API (`status_code`, `status_message`).
pub fn task_status(doc: &Value, task_index: usize) -> Option<(i64, String)> {
    let task = doc.get("tasks")?.as_array()?.get(task_index)?.as_object()?;
    let code = task.get("status_code")?.as_i64()?;
    let msg = task
        .get("status_message")
        .and_then(|m| m.as_str())
        .unwrap_or("")
        .to_string();
    Some((code, msg))
}
