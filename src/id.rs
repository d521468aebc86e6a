//! Hierarchical id scheme.
//!
//! An issue id is a type prefix (`F`, `T` or `B`) followed by one 2-digit group
//! per nesting level: `F01` is a top-level feature, `F0102` its second child
//! feature, `T010203` a task three levels down. Sprints use `S<NN>`.
//!
//! Everything here is pure string work; no I/O.

use crate::error::{Error, Result};

/// Deepest level a feature id may reach.
pub const MAX_FEATURE_LEVEL: usize = 3;

/// Largest counter value that fits in one 2-digit group.
pub const MAX_GROUP: u32 = 99;

/// Canonical (trimmed, uppercase) form of an id.
pub fn normalize(id: &str) -> String {
    id.trim().to_uppercase()
}

fn invalid(id: &str, reason: impl Into<String>) -> Error {
    Error::InvalidIdFormat {
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Split an id into its prefix letter and digit string, validating both.
pub fn split(id: &str) -> Result<(char, String)> {
    let id = normalize(id);
    let mut chars = id.chars();
    let prefix = chars.next().ok_or_else(|| invalid(&id, "empty id"))?;
    if !matches!(prefix, 'F' | 'T' | 'B') {
        return Err(invalid(&id, "prefix must be one of F, T, B"));
    }

    let digits: String = chars.collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(&id, "expected digits after the prefix"));
    }
    if digits.len() % 2 != 0 {
        return Err(invalid(&id, "digit count must be even"));
    }
    if prefix == 'F' && digits.len() > MAX_FEATURE_LEVEL * 2 {
        return Err(invalid(
            &id,
            format!("features nest at most {} levels", MAX_FEATURE_LEVEL),
        ));
    }
    if digits.as_bytes().chunks(2).any(|g| g == b"00") {
        return Err(invalid(&id, "digit groups start at 01"));
    }

    Ok((prefix, digits))
}

/// Nesting level: 2 digits is level 1, 4 digits level 2, and so on.
pub fn level_of(id: &str) -> Result<usize> {
    let (_, digits) = split(id)?;
    Ok(digits.len() / 2)
}

/// Structural parent derived from the id alone.
///
/// Features drop their last group. Tasks and bugs drop their last group and
/// take the `F` prefix. The metadata `parent_id` stays authoritative: a task
/// nested under another task has a `T` parent that this cannot express.
pub fn parent_of(id: &str) -> Result<Option<String>> {
    let (_, digits) = split(id)?;
    let remainder = &digits[..digits.len() - 2];
    if remainder.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("F{}", remainder)))
}

/// Prefix plus the 2-digit group for exactly `level` (1-based).
pub fn level_segment(id: &str, level: usize) -> Result<String> {
    let (prefix, digits) = split(id)?;
    let levels = digits.len() / 2;
    if level == 0 || level > levels {
        return Err(invalid(
            id,
            format!("has {} levels, asked for level {}", levels, level),
        ));
    }
    let start = (level - 1) * 2;
    Ok(format!("{}{}", prefix, &digits[start..start + 2]))
}

/// The segment an issue contributes to its own folder name.
pub fn own_segment(id: &str) -> Result<String> {
    level_segment(id, level_of(id)?)
}

/// Digit string of an id, used to key child counters.
pub fn digits_of(id: &str) -> Result<String> {
    split(id).map(|(_, digits)| digits)
}

/// Mint the id of the `counter`-th child under `parent_id`.
pub fn next_child_id(prefix: char, parent_id: Option<&str>, counter: u32) -> Result<String> {
    let parent_label = parent_id.map(normalize).unwrap_or_else(|| "root".to_string());
    if counter == 0 || counter > MAX_GROUP {
        return Err(Error::CounterExhausted {
            parent: parent_label,
        });
    }

    let parent_digits = match parent_id {
        Some(parent) => digits_of(parent)?,
        None if prefix == 'F' => String::new(),
        None => {
            return Err(Error::HierarchyViolation(format!(
                "{} ids need a parent",
                prefix
            )))
        }
    };

    if prefix == 'F' && parent_digits.len() / 2 >= MAX_FEATURE_LEVEL {
        return Err(Error::HierarchyViolation(format!(
            "feature {} is already at level {}",
            parent_label, MAX_FEATURE_LEVEL
        )));
    }

    let id = format!("{}{}{:02}", prefix, parent_digits, counter);
    split(&id)?;
    Ok(id)
}

/// Sprint id for the n-th sprint.
pub fn sprint_id(n: u32) -> String {
    format!("S{:02}", n)
}

/// Accept `1`, `s1`, `S01` and friends as the same sprint id.
pub fn normalize_sprint_id(id: &str) -> String {
    let upper = normalize(id);
    let digits = upper.strip_prefix('S').unwrap_or(&upper);
    match digits.parse::<u32>() {
        Ok(n) if digits.chars().all(|c| c.is_ascii_digit()) => sprint_id(n),
        _ => upper,
    }
}
