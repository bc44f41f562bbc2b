//! Markdown and JSON rendering of command results.
//!
//! Envelopes render as a summary with their context fields followed by one
//! table per record list.

use crate::tasks::coordinator::HandlerInfo;
use crate::tasks::Envelope;
use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Keys rendered as tables rather than context fields.
const LIST_KEYS: [&str; 3] = ["entities", "items", "sample_investments"];

/// Generate pretty JSON for any result.
pub fn generate_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

/// Generate a Markdown rendering of a task envelope.
pub fn generate_markdown_envelope(title: &str, envelope: &Envelope) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", title));

    if let Some(ref error) = envelope.error {
        output.push_str(&format!("**Error:** {}\n\n", error));
    }
    if let Some(ref summary) = envelope.summary {
        output.push_str(summary);
        output.push_str("\n\n");
    }
    if let Some(ref note) = envelope.note {
        output.push_str(&format!("> **Note:** {}\n\n", note));
    }

    output.push_str(&generate_context_section(&envelope.body));

    for key in LIST_KEYS {
        if let Some(Value::Array(rows)) = envelope.get(key) {
            output.push_str(&format!("## {}\n\n", heading(key)));
            output.push_str(&generate_table(rows));
        }
    }

    output
}

/// Context fields in insertion order, skipping record lists.
fn generate_context_section(body: &Map<String, Value>) -> String {
    let mut section = String::new();

    for (key, value) in body {
        if LIST_KEYS.contains(&key.as_str()) {
            continue;
        }
        section.push_str(&format!("- **{}:** {}\n", key, cell(value)));
    }
    if !section.is_empty() {
        section.push('\n');
    }

    section
}

fn heading(key: &str) -> String {
    let mut words = key.replace('_', " ");
    if let Some(first) = words.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    words
}

/// Render rows as a table. Columns are the union of keys, first seen first.
fn generate_table(rows: &[Value]) -> String {
    if rows.is_empty() {
        return "No results.\n\n".to_string();
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(fields) = row {
            for key in fields.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key.as_str());
                }
            }
        }
    }
    if columns.is_empty() {
        let lines: Vec<String> = rows.iter().map(|r| format!("- {}", cell(r))).collect();
        return format!("{}\n\n", lines.join("\n"));
    }

    let mut table = String::new();
    table.push_str(&format!("| {} |\n", columns.join(" | ")));
    table.push_str(&format!("|{}\n", ":---|".repeat(columns.len())));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| row.get(*c).map(cell).unwrap_or_default())
            .collect();
        table.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    table.push('\n');

    table
}

/// One table cell: strings bare, null empty, everything else as compact JSON.
fn cell(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.replace('|', "\\|").replace('\n', " ")
}

/// Generate the task listing.
pub fn generate_markdown_tasks(handlers: &[HandlerInfo]) -> String {
    let mut output = String::from("# Tasks\n\n");

    for handler in handlers {
        output.push_str(&format!("## {}\n\n", handler.name));
        output.push_str("| Task | Description |\n");
        output.push_str("|:---|:---|\n");
        for task in &handler.tasks {
            output.push_str(&format!("| `{}` | {} |\n", task.name, task.description));
        }
        output.push('\n');
    }

    output
}

/// Generate a free-form answer section.
pub fn generate_markdown_answer(answer: &str, mode: &str) -> String {
    format!("# Answer\n\n{}\n\n*Mode: {}*\n", answer.trim_end(), mode)
}

/// Raw backend payloads as a fenced JSON block.
pub fn generate_markdown_raw(title: &str, value: &Value) -> Result<String> {
    Ok(format!("# {}\n\n```json\n{}\n```\n", title, generate_json(value)?))
}
