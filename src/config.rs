//! Per-project settings in `.ppp/config.yaml`.

use crate::database::BACKUP_FILE;
use crate::error::{Error, Result};
use crate::keywords::{CommandKeywords, HeuristicKeywords, KeywordGenerator};
use crate::types::Priority;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub const CONFIG_FILE: &str = "config.yaml";
pub const HISTORY_FILE: &str = "command_history.log";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProjectConfig {
    /// External program that turns an issue name into a folder slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keyword_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_reporter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_priority: Option<Priority>,
}

impl ProjectConfig {
    /// Read the config, or defaults if the file does not exist.
    pub fn load(ppp_dir: &Path) -> Result<Self> {
        let path = ppp_dir.join(CONFIG_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::fs("read", &path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, ppp_dir: &Path) -> Result<()> {
        let path = ppp_dir.join(CONFIG_FILE);
        let yaml = serde_yaml::to_string(self)?;
        fs::write(&path, yaml).map_err(|e| Error::fs("write", &path, e))
    }

    pub fn keyword_generator(&self) -> Box<dyn KeywordGenerator> {
        match &self.keyword_command {
            Some(program) if !program.trim().is_empty() => Box::new(CommandKeywords {
                program: program.clone(),
                args: self.keyword_args.clone(),
            }),
            _ => Box::new(HeuristicKeywords),
        }
    }
}

/// Ensure .gitignore exists and contains required entries
pub fn ensure_gitignore(ppp_dir: &Path) -> Result<()> {
    let gitignore_path = ppp_dir.join(".gitignore");
    let required_entries = [HISTORY_FILE, BACKUP_FILE];

    let mut existing_lines = Vec::new();
    if gitignore_path.exists() {
        let file =
            fs::File::open(&gitignore_path).map_err(|e| Error::fs("read", &gitignore_path, e))?;
        for line in BufReader::new(file).lines() {
            existing_lines.push(line?);
        }
    }

    let missing_entries: Vec<&str> = required_entries
        .iter()
        .copied()
        .filter(|entry| !existing_lines.iter().any(|line| line.trim() == *entry))
        .collect();
    if missing_entries.is_empty() {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&gitignore_path)
        .map_err(|e| Error::fs("open", &gitignore_path, e))?;

    // Add a newline before our entries if file already had content
    if existing_lines.last().is_some_and(|l| !l.is_empty()) {
        writeln!(file)?;
    }
    for entry in missing_entries {
        writeln!(file, "{}", entry)?;
    }
    Ok(())
}
