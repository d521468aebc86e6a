//! Keyword slugs for folder names.
//!
//! A slug is derived from an issue name either by a pluggable generator (an
//! external command configured in `config.yaml`) or by the local heuristic,
//! which is always available and deterministic.

use anyhow::{Context, Result};
use regex::Regex;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Most tokens the local heuristic keeps.
const MAX_TOKENS: usize = 4;

/// Longest slug accepted from any generator.
const MAX_SLUG_LEN: usize = 48;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "into",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will",
    "with", "should", "must", "can", "we", "our", "when", "all", "new", "add", "implement",
];

/// Turns an issue name into a short slug.
pub trait KeywordGenerator {
    fn generate(&self, name: &str) -> Result<String>;
}

/// Deterministic local generator: drop stopwords, keep a few tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicKeywords;

impl KeywordGenerator for HeuristicKeywords {
    fn generate(&self, name: &str) -> Result<String> {
        Ok(fallback_keywords(name))
    }
}

/// Runs an external program with the name on stdin and reads the slug from stdout.
#[derive(Debug, Clone)]
pub struct CommandKeywords {
    pub program: String,
    pub args: Vec<String>,
}

impl KeywordGenerator for CommandKeywords {
    fn generate(&self, name: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run keyword command '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A generator may ignore stdin and exit early.
            if let Err(e) = stdin.write_all(name.as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e).context("Failed to write issue name to keyword command");
                }
            }
        }

        let output = child
            .wait_with_output()
            .context("Failed to read keyword command output")?;
        if !output.status.success() {
            anyhow::bail!(
                "keyword command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let slug = sanitize_slug(&String::from_utf8_lossy(&output.stdout));
        if slug.is_empty() {
            anyhow::bail!("keyword command produced no usable slug");
        }
        Ok(slug)
    }
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("token pattern is valid"))
}

/// Local slug heuristic: lowercase, strip stopwords, keep at most four tokens.
pub fn fallback_keywords(name: &str) -> String {
    let tokens: Vec<String> = token_regex()
        .find_iter(name)
        .map(|m| m.as_str().to_lowercase())
        .collect();

    let meaningful: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !STOPWORDS.contains(t))
        .take(MAX_TOKENS)
        .collect();

    let chosen: Vec<&str> = if meaningful.is_empty() {
        tokens.iter().map(String::as_str).take(MAX_TOKENS).collect()
    } else {
        meaningful
    };

    let slug = sanitize_slug(&chosen.join("_"));
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Reduce arbitrary generator output to a folder-safe slug.
pub fn sanitize_slug(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut slug = String::new();
    for c in line.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let mut slug = slug.trim_end_matches('_').to_string();
    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
        slug = slug.trim_end_matches('_').to_string();
    }
    slug
}

/// Ask `generator` for a slug, falling back to the heuristic on any failure.
pub fn keywords_for(generator: &dyn KeywordGenerator, name: &str) -> String {
    match generator.generate(name) {
        Ok(slug) if !slug.is_empty() => {
            debug!(name, slug = %slug, "Generated keywords");
            slug
        }
        Ok(_) => fallback_keywords(name),
        Err(e) => {
            warn!(name, error = %e, "Keyword generator failed, using local heuristic");
            fallback_keywords(name)
        }
    }
}
