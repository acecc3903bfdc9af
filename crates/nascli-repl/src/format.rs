//! Text and JSON rendering of statement results.

use nascli_core::complete::Candidate;
use nascli_core::error::ShellError;
use nascli_core::output::{Output, ResultSet};
use nascli_core::remote::{ChildEntry, ChildKind};
use nascli_core::value::Value;

/// Render one result. `None` means there is nothing to print.
pub fn render(output: &Output, json: bool) -> Option<String> {
    match output {
        Output::None | Output::Exit => None,
        Output::Value(Value::Null) if !json => None,
        _ if json => Some(serde_json::to_string(output).unwrap_or_else(|e| e.to_string())),
        Output::Value(value) => Some(value.to_string()),
        Output::Item(path) => Some(path.to_string()),
        Output::Table(table) => Some(render_table(table)),
        Output::Listing(children) => Some(render_listing(children)),
    }
}

/// `Kind: message`, as text or a JSON object.
pub fn render_error(error: &ShellError, json: bool) -> String {
    if json {
        let mut object = serde_json::json!({
            "error": error.kind(),
            "message": error.to_string(),
        });
        if let Some(position) = error.position() {
            object["line"] = position.line.into();
            object["column"] = position.column.into();
        }
        return object.to_string();
    }
    format!("{}: {}", error.kind(), error)
}

pub fn render_candidates(candidates: &[Candidate], json: bool) -> String {
    if json {
        return serde_json::to_string(candidates).unwrap_or_else(|e| e.to_string());
    }
    candidates
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aligned columns under a header and a rule.
pub fn render_table(table: &ResultSet) -> String {
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| table.cells(row).map(cell).collect())
        .collect();

    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (width, text) in widths.iter_mut().zip(row) {
            *width = (*width).max(text.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(aligned(&table.columns, &widths));
    lines.push(aligned(
        &widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>(),
        &widths,
    ));
    for row in &cells {
        lines.push(aligned(row, &widths));
    }
    lines.join("\n")
}

fn render_listing(children: &[ChildEntry]) -> String {
    if children.is_empty() {
        return "(no children)".to_string();
    }
    let mut table = ResultSet::with_columns(&["name", "kind"]);
    for child in children {
        let kind = match child.kind {
            ChildKind::Config => "config",
            ChildKind::Collection => "collection",
            ChildKind::Entity => "entity",
        };
        table.push_row(vec![Value::from(child.name.as_str()), Value::from(kind)]);
    }
    render_table(&table)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn aligned(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(text, width)| format!("{:<width$}", text, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}
