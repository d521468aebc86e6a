//! `Release.md`: a human-readable table of every sprint.
//!
//! The table is found by its header row and patched one row at a time. Files
//! written with the older four-column header are migrated in place.

use crate::error::{Error, Result};
use crate::types::Sprint;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub const RELEASE_FILE: &str = "Release.md";

const HEADER: [&str; 7] = ["Sprint", "Name", "Status", "Start", "End", "Issues", "Velocity"];
const LEGACY_HEADER: [&str; 4] = ["Sprint", "Status", "Start", "End"];

struct Table {
    /// Line index of the header row.
    start: usize,
    /// One past the last table line.
    end: usize,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn escape(cell: &str) -> String {
    cell.replace('|', "\\|")
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                cell.push_str("\\|");
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

fn header_is(cells: &[String], expected: &[&str]) -> bool {
    cells.len() == expected.len()
        && cells
            .iter()
            .zip(expected)
            .all(|(c, e)| c.eq_ignore_ascii_case(e))
}

fn find_table(lines: &[&str]) -> Option<Table> {
    let start = lines.iter().position(|l| {
        l.trim_start().starts_with('|') && {
            let cells = split_row(l);
            header_is(&cells, &HEADER) || header_is(&cells, &LEGACY_HEADER)
        }
    })?;
    let header = split_row(lines[start]);

    let mut end = start + 1;
    while end < lines.len() && lines[end].trim_start().starts_with('|') {
        end += 1;
    }
    let rows = lines[start + 1..end]
        .iter()
        .filter(|l| !l.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ')))
        .map(|l| split_row(l))
        .collect();

    Some(Table {
        start,
        end,
        header,
        rows,
    })
}

impl Table {
    fn is_legacy(&self) -> bool {
        header_is(&self.header, &LEGACY_HEADER)
    }

    /// Rewrite rows into the current column layout, carrying cells by column name.
    fn migrate(&mut self) {
        let old = std::mem::take(&mut self.header);
        self.rows = self
            .rows
            .iter()
            .map(|row| {
                HEADER
                    .iter()
                    .map(|col| {
                        old.iter()
                            .position(|h| h.eq_ignore_ascii_case(col))
                            .and_then(|i| row.get(i).cloned())
                            .unwrap_or_else(|| "-".to_string())
                    })
                    .collect()
            })
            .collect();
        self.header = HEADER.iter().map(|h| h.to_string()).collect();
    }

    fn render(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.rows.len() + 2);
        out.push(format!("| {} |", self.header.join(" | ")));
        out.push(format!("|{}|", vec!["---"; self.header.len()].join("|")));
        for row in &self.rows {
            out.push(format!("| {} |", row.join(" | ")));
        }
        out
    }
}

/// Table cells for one sprint.
pub fn row_for(sprint: &Sprint) -> Vec<String> {
    vec![
        sprint.id.clone(),
        escape(&sprint.name),
        sprint.status.to_string(),
        sprint.start_date.to_string(),
        sprint
            .end_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
        sprint.issues.len().to_string(),
        sprint.velocity.to_string(),
    ]
}

pub fn new_document(project: &str) -> String {
    let table = Table {
        start: 0,
        end: 0,
        header: HEADER.iter().map(|h| h.to_string()).collect(),
        rows: Vec::new(),
    };
    format!("# Release: {}\n\n## Sprints\n\n{}\n", project, table.render().join("\n"))
}

fn patch<F>(content: &str, change: F) -> String
where
    F: FnOnce(&mut Vec<Vec<String>>),
{
    let lines: Vec<&str> = content.lines().collect();
    let (mut table, before, after) = match find_table(&lines) {
        Some(table) => {
            let before = lines[..table.start].join("\n");
            let after = lines[table.end..].join("\n");
            (table, before, after)
        }
        None => {
            let table = Table {
                start: lines.len(),
                end: lines.len(),
                header: HEADER.iter().map(|h| h.to_string()).collect(),
                rows: Vec::new(),
            };
            let before = format!("{}\n\n## Sprints\n", content.trim_end());
            (table, before, String::new())
        }
    };

    if table.is_legacy() {
        info!("Migrating Release.md to the current table layout");
        table.migrate();
    }
    change(&mut table.rows);

    let mut out = before;
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&table.render().join("\n"));
    out.push('\n');
    if !after.trim().is_empty() {
        out.push_str(&after);
        out.push('\n');
    }
    out
}

/// Insert or replace the row for `sprint`.
pub fn upsert_row(content: &str, sprint: &Sprint) -> String {
    let row = row_for(sprint);
    patch(content, |rows| {
        match rows
            .iter_mut()
            .find(|r| r.first().is_some_and(|id| id.eq_ignore_ascii_case(&sprint.id)))
        {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    })
}

pub fn remove_row(content: &str, sprint_id: &str) -> String {
    patch(content, |rows| {
        rows.retain(|r| !r.first().is_some_and(|id| id.eq_ignore_ascii_case(sprint_id)))
    })
}

fn read_or_new(path: &Path, project: &str) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(new_document(project)),
        Err(e) => Err(Error::fs("read", path, e)),
    }
}

/// Create `Release.md` if it is missing.
pub fn ensure(path: &Path, project: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::write(path, new_document(project)).map_err(|e| Error::fs("write", path, e))
}

pub fn upsert(path: &Path, project: &str, sprint: &Sprint) -> Result<()> {
    let content = read_or_new(path, project)?;
    fs::write(path, upsert_row(&content, sprint)).map_err(|e| Error::fs("write", path, e))?;
    debug!(sprint = %sprint.id, "Updated release table");
    Ok(())
}

pub fn remove(path: &Path, project: &str, sprint_id: &str) -> Result<()> {
    let content = read_or_new(path, project)?;
    fs::write(path, remove_row(&content, sprint_id)).map_err(|e| Error::fs("write", path, e))?;
    debug!(sprint = sprint_id, "Removed sprint from release table");
    Ok(())
}
