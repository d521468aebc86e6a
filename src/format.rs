//! Markdown spec files for issues and sprints.
//!
//! A spec file is modelled as a [`SpecDocument`]: a title, free-form preamble,
//! and an ordered list of `## Heading` sections. The `Details`, `Children` and
//! `Issues` sections are machine-owned and regenerated from metadata; every
//! other section belongs to the user and is carried through untouched.

use crate::types::{Issue, Sprint};
use chrono::{DateTime, Utc};

pub const SPEC_FILE: &str = "spec.md";

pub const DETAILS: &str = "Details";
pub const DESCRIPTION: &str = "Description";
pub const COMMENTS: &str = "Comments";
pub const CHILDREN: &str = "Children";
pub const ISSUES: &str = "Issues";

const NOT_FOUND: &str = "(not found)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecDocument {
    pub title: String,
    /// Content between the title and the first section.
    pub preamble: String,
    pub sections: Vec<Section>,
}

/// Where a section goes when it has to be inserted rather than replaced.
fn rank(heading: &str) -> u8 {
    match heading {
        DETAILS => 0,
        DESCRIPTION | ISSUES => 1,
        COMMENTS => 3,
        CHILDREN => 4,
        _ => 2,
    }
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Drop leading blank lines and trailing whitespace, keep everything else.
fn normalize_body(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    lines[start..].join("\n").trim_end().to_string()
}

impl SpecDocument {
    pub fn parse(content: &str) -> Self {
        let mut doc = SpecDocument::default();
        let mut in_fence = false;
        let mut seen_title = false;
        let mut current: Option<String> = None;
        let mut buffer: Vec<&str> = Vec::new();

        for line in content.lines() {
            if is_fence(line) {
                in_fence = !in_fence;
            }

            if !in_fence && !is_fence(line) {
                if !seen_title && current.is_none() && buffer.iter().all(|l| l.trim().is_empty()) {
                    if let Some(title) = line.strip_prefix("# ") {
                        doc.title = title.trim().to_string();
                        seen_title = true;
                        buffer.clear();
                        continue;
                    }
                }
                if let Some(heading) = line.strip_prefix("## ") {
                    match current.take() {
                        Some(prev) => doc.sections.push(Section {
                            heading: prev,
                            body: normalize_body(&buffer),
                        }),
                        None => doc.preamble = normalize_body(&buffer),
                    }
                    buffer.clear();
                    current = Some(heading.trim().to_string());
                    continue;
                }
            }

            buffer.push(line);
        }

        match current {
            Some(heading) => doc.sections.push(Section {
                heading,
                body: normalize_body(&buffer),
            }),
            None => doc.preamble = normalize_body(&buffer),
        }
        doc
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# ");
        out.push_str(&self.title);
        out.push('\n');

        if !self.preamble.is_empty() {
            out.push('\n');
            out.push_str(&self.preamble);
            out.push('\n');
        }

        for section in &self.sections {
            out.push_str("\n## ");
            out.push_str(&section.heading);
            out.push('\n');
            if !section.body.is_empty() {
                out.push('\n');
                out.push_str(&section.body);
                out.push('\n');
            }
        }
        out
    }

    pub fn section(&self, heading: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.heading == heading)
    }

    /// Replace a section body in place, or insert it at its usual position.
    pub fn set_section(&mut self, heading: &str, body: &str) {
        let body = normalize_body(&body.lines().collect::<Vec<_>>());
        if let Some(existing) = self.sections.iter_mut().find(|s| s.heading == heading) {
            existing.body = body;
            return;
        }
        let position = self
            .sections
            .iter()
            .position(|s| rank(&s.heading) > rank(heading))
            .unwrap_or(self.sections.len());
        self.sections.insert(
            position,
            Section {
                heading: heading.to_string(),
                body,
            },
        );
    }

    pub fn remove_section(&mut self, heading: &str) {
        self.sections.retain(|s| s.heading != heading);
    }
}

/// Demote headings in user-supplied prose so they cannot split the document.
pub fn sanitize_section_content(content: &str) -> String {
    let mut in_fence = false;
    content
        .lines()
        .map(|line| {
            if is_fence(line) {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                return line.to_string();
            }
            let hashes = line.chars().take_while(|c| *c == '#').count();
            if (hashes == 1 || hashes == 2) && line[hashes..].starts_with(' ') {
                format!("###{}", &line[hashes..])
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// The machine-owned `Details` block, in fixed field order.
pub fn issue_details(issue: &Issue) -> String {
    let labels = issue.labels.iter().cloned().collect::<Vec<_>>().join(", ");
    [
        format!("- **ID**: {}", issue.id),
        format!("- **Type**: {}", issue.issue_type),
        format!("- **Status**: {}", issue.status),
        format!("- **Priority**: {}", issue.priority),
        format!("- **Assignee**: {}", or_dash(&issue.assignee)),
        format!("- **Reporter**: {}", or_dash(&issue.reporter)),
        format!("- **Labels**: {}", or_dash(&labels)),
        format!("- **Parent**: {}", or_dash(issue.parent_id.as_deref().unwrap_or(""))),
        format!("- **Sprint**: {}", or_dash(issue.sprint_id.as_deref().unwrap_or(""))),
        format!("- **Created**: {}", timestamp(&issue.created_at)),
        format!("- **Updated**: {}", timestamp(&issue.updated_at)),
    ]
    .join("\n")
}

/// A child entry for the `Children` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLink {
    pub id: String,
    pub name: String,
    /// Folder name relative to the parent's folder, if it could be resolved.
    pub folder: Option<String>,
}

pub fn children_list(children: &[ChildLink]) -> String {
    children
        .iter()
        .map(|c| match &c.folder {
            Some(folder) => format!("- [{}: {}]({}/{})", c.id, c.name, folder, SPEC_FILE),
            None => format!("- {}: {} {}", c.id, c.name, NOT_FOUND),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Spec file for a brand-new issue.
pub fn render_issue_spec(issue: &Issue, description: Option<&str>, children: &[ChildLink]) -> String {
    let mut doc = SpecDocument {
        title: issue.name.clone(),
        ..Default::default()
    };
    doc.set_section(DETAILS, &issue_details(issue));
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        doc.set_section(DESCRIPTION, &sanitize_section_content(description));
    }
    if !children.is_empty() {
        doc.set_section(CHILDREN, &children_list(children));
    }
    doc.render()
}

/// Regenerate the machine-owned parts of an existing issue spec.
///
/// `description` replaces the Description section when given (an empty string
/// removes it). `children` refreshes the Children section when given.
pub fn merge_issue_spec(
    existing: &str,
    issue: &Issue,
    description: Option<&str>,
    children: Option<&[ChildLink]>,
) -> String {
    let mut doc = SpecDocument::parse(existing);
    doc.title = issue.name.clone();
    doc.set_section(DETAILS, &issue_details(issue));

    if let Some(description) = description {
        if description.trim().is_empty() {
            doc.remove_section(DESCRIPTION);
        } else {
            doc.set_section(DESCRIPTION, &sanitize_section_content(description));
        }
    }

    if let Some(children) = children {
        if children.is_empty() {
            doc.remove_section(CHILDREN);
        } else {
            doc.set_section(CHILDREN, &children_list(children));
        }
    }
    doc.render()
}

/// A member entry for a sprint's `Issues` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintMember {
    pub id: String,
    /// Name of the symlink (or folder) inside the sprint folder.
    pub link: Option<String>,
    pub done: bool,
}

pub fn sprint_details(sprint: &Sprint) -> String {
    [
        format!("- **ID**: {}", sprint.id),
        format!("- **Status**: {}", sprint.status),
        format!("- **Start**: {}", sprint.start_date),
        format!(
            "- **End**: {}",
            sprint
                .end_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("- **Issues**: {}", sprint.issues.len()),
        format!("- **Velocity**: {}", sprint.velocity),
    ]
    .join("\n")
}

pub fn members_list(members: &[SprintMember]) -> String {
    members
        .iter()
        .map(|m| {
            let check = if m.done { "x" } else { " " };
            match &m.link {
                Some(link) => format!("- [{}] [{}]({}/{})", check, link, link, SPEC_FILE),
                None => format!("- [{}] {} {}", check, m.id, NOT_FOUND),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sprint spec, merged into `existing` when the file is already there.
pub fn render_sprint_spec(existing: Option<&str>, sprint: &Sprint, members: &[SprintMember]) -> String {
    let mut doc = existing.map(SpecDocument::parse).unwrap_or_default();
    doc.title = format!("Sprint {}: {}", sprint.id, sprint.name);
    doc.set_section(DETAILS, &sprint_details(sprint));
    doc.set_section(ISSUES, &members_list(members));
    doc.render()
}
