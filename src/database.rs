//! The YAML database: authoritative metadata for issues, sprints, the release
//! and the feature bill, plus the counters used to mint new ids.
//!
//! [`Database`] holds the in-memory model and all relationship bookkeeping.
//! [`MetadataStore`] loads and saves it, caching by file modification time.

use crate::error::{Error, Result};
use crate::id;
use crate::types::{FeatureBillEntry, Issue, IssueType, Sprint, SprintStatus};
use chrono::{DateTime, Utc};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DATABASE_FILE: &str = "database.yaml";
pub const BACKUP_FILE: &str = "database.yaml.backup";
pub const SCHEMA_VERSION: &str = "1.0";

const REQUIRED_KEYS: [&str; 4] = ["metadata", "project", "issues", "sprints"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCounters {
    #[serde(default)]
    pub level1: u32,
    #[serde(default)]
    pub level2: BTreeMap<String, u32>,
    #[serde(default)]
    pub level3: BTreeMap<String, u32>,
}

/// Monotonic per-parent counters. Only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    #[serde(default)]
    pub features: FeatureCounters,
    #[serde(default)]
    pub tasks: BTreeMap<String, u32>,
    #[serde(default)]
    pub bugs: BTreeMap<String, u32>,
    #[serde(default)]
    pub sprints: u32,
}

fn bump(counter: &mut u32) -> u32 {
    *counter += 1;
    *counter
}

impl Counters {
    pub fn next_feature_id(&mut self, parent_id: Option<&str>) -> Result<String> {
        match parent_id {
            None => {
                let n = bump(&mut self.features.level1);
                id::next_child_id('F', None, n)
            }
            Some(parent) => {
                let parent = id::normalize(parent);
                let bucket = match id::level_of(&parent)? {
                    1 => &mut self.features.level2,
                    2 => &mut self.features.level3,
                    level => {
                        return Err(Error::HierarchyViolation(format!(
                            "feature {} is at level {}; features nest at most {} levels",
                            parent,
                            level,
                            id::MAX_FEATURE_LEVEL
                        )))
                    }
                };
                let n = bump(bucket.entry(parent.clone()).or_insert(0));
                id::next_child_id('F', Some(&parent), n)
            }
        }
    }

    pub fn next_task_id(&mut self, parent_id: &str) -> Result<String> {
        let parent = id::normalize(parent_id);
        let n = bump(self.tasks.entry(parent.clone()).or_insert(0));
        id::next_child_id('T', Some(&parent), n)
    }

    pub fn next_bug_id(&mut self, parent_id: &str) -> Result<String> {
        let parent = id::normalize(parent_id);
        let n = bump(self.bugs.entry(parent.clone()).or_insert(0));
        id::next_child_id('B', Some(&parent), n)
    }

    pub fn next_sprint_id(&mut self) -> String {
        id::sprint_id(bump(&mut self.sprints))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub sprints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_sprint: Option<String>,
}

/// The whole database file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub metadata: Metadata,
    #[serde(default)]
    pub counters: Counters,
    pub project: Project,
    pub issues: BTreeMap<String, Issue>,
    pub sprints: BTreeMap<String, Sprint>,
    #[serde(default)]
    pub release: Release,
    #[serde(default)]
    pub feature_bill: BTreeMap<String, FeatureBillEntry>,
}

impl Database {
    pub fn new(project_name: &str) -> Self {
        let now = Utc::now();
        Self {
            metadata: Metadata {
                version: SCHEMA_VERSION.to_string(),
                created: now,
                updated: now,
            },
            counters: Counters::default(),
            project: Project {
                name: project_name.to_string(),
                description: String::new(),
            },
            issues: BTreeMap::new(),
            sprints: BTreeMap::new(),
            release: Release::default(),
            feature_bill: BTreeMap::new(),
        }
    }

    /// Storage key for an issue id, matched case-insensitively.
    pub fn issue_key(&self, id: &str) -> Option<String> {
        let canonical = id::normalize(id);
        if self.issues.contains_key(&canonical) {
            return Some(canonical);
        }
        self.issues
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&canonical))
            .cloned()
    }

    pub fn get_issue(&self, id: &str) -> Option<&Issue> {
        self.issue_key(id).and_then(|k| self.issues.get(&k))
    }

    pub fn require_issue(&self, id: &str) -> Result<&Issue> {
        self.get_issue(id).ok_or_else(|| Error::IssueNotFound {
            id: id::normalize(id),
        })
    }

    pub fn sprint_key(&self, id: &str) -> Option<String> {
        let canonical = id::normalize_sprint_id(id);
        if self.sprints.contains_key(&canonical) {
            return Some(canonical);
        }
        self.sprints
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&canonical))
            .cloned()
    }

    pub fn get_sprint(&self, id: &str) -> Option<&Sprint> {
        self.sprint_key(id).and_then(|k| self.sprints.get(&k))
    }

    pub fn require_sprint(&self, id: &str) -> Result<&Sprint> {
        self.get_sprint(id).ok_or_else(|| Error::SprintNotFound {
            id: id::normalize_sprint_id(id),
        })
    }

    /// Check that an issue of `issue_type` may be created under `parent_id`.
    ///
    /// Returns the canonical parent id.
    pub fn validate_parent(
        &self,
        issue_type: IssueType,
        parent_id: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(parent_id) = parent_id else {
            if issue_type == IssueType::Feature {
                return Ok(None);
            }
            return Err(Error::HierarchyViolation(format!(
                "a {} must have a feature or task parent",
                issue_type
            )));
        };

        id::split(parent_id)?;
        let parent = self
            .get_issue(parent_id)
            .ok_or_else(|| Error::ParentNotFound {
                id: id::normalize(parent_id),
            })?;

        if !issue_type.accepts_parent(parent.issue_type) {
            return Err(Error::HierarchyViolation(format!(
                "a {} cannot be placed under {} {}",
                issue_type, parent.issue_type, parent.id
            )));
        }
        if issue_type == IssueType::Feature {
            // A moved feature keeps its id, so the id level can understate the depth
            let depth = self.chain(&parent.id).len().max(id::level_of(&parent.id)?);
            if depth >= id::MAX_FEATURE_LEVEL {
                return Err(Error::HierarchyViolation(format!(
                    "feature {} is at depth {}; features nest at most {} levels",
                    parent.id,
                    depth,
                    id::MAX_FEATURE_LEVEL
                )));
            }
        }

        Ok(Some(parent.id.clone()))
    }

    /// Mint a fresh id, skipping any that are already taken.
    pub fn mint_issue_id(&mut self, issue_type: IssueType, parent_id: Option<&str>) -> Result<String> {
        loop {
            let minted = match (issue_type, parent_id) {
                (IssueType::Feature, parent) => self.counters.next_feature_id(parent)?,
                (_, None) => {
                    return Err(Error::HierarchyViolation(format!(
                        "a {} must have a parent",
                        issue_type
                    )))
                }
                (IssueType::Bug, Some(parent)) => self.counters.next_bug_id(parent)?,
                (IssueType::Story | IssueType::Task, Some(parent)) => {
                    self.counters.next_task_id(parent)?
                }
            };
            if self.issues.contains_key(&minted) {
                debug!(id = %minted, "Skipping id that is already in use");
                continue;
            }
            if self.segment_taken(parent_id, &minted)? {
                debug!(id = %minted, "Skipping id whose folder segment a moved sibling holds");
                continue;
            }
            return Ok(minted);
        }
    }

    /// Whether a child of `parent_id` (or a root issue) already uses the
    /// folder segment of `candidate`.
    fn segment_taken(&self, parent_id: Option<&str>, candidate: &str) -> Result<bool> {
        let segment = id::own_segment(candidate)?;
        let siblings: Vec<&str> = match parent_id {
            Some(parent) => self
                .get_issue(parent)
                .map(|p| p.children.iter().map(String::as_str).collect())
                .unwrap_or_default(),
            None => self
                .issues
                .values()
                .filter(|i| i.parent_id.is_none())
                .map(|i| i.id.as_str())
                .collect(),
        };
        Ok(siblings.into_iter().any(|sibling| {
            id::own_segment(sibling).is_ok_and(|s| s.eq_ignore_ascii_case(&segment))
        }))
    }

    pub fn insert_issue(&mut self, issue: Issue) -> Result<()> {
        if self.issues.contains_key(&issue.id) {
            return Err(Error::InvalidValue(format!("Issue {} already exists", issue.id)));
        }
        let parent_key = match issue.parent_id.as_deref() {
            Some(parent) => Some(self.issue_key(parent).ok_or_else(|| Error::ParentNotFound {
                id: id::normalize(parent),
            })?),
            None => None,
        };

        let id = issue.id.clone();
        self.issues.insert(id.clone(), issue);

        if let Some(key) = parent_key {
            if let Some(parent) = self.issues.get_mut(&key) {
                if !parent.children.iter().any(|c| c.eq_ignore_ascii_case(&id)) {
                    parent.children.push(id.clone());
                    parent.updated_at = Utc::now();
                }
            }
            self.refresh_feature_bill(&key);
        }
        self.refresh_feature_bill(&id);
        Ok(())
    }

    /// Apply `change` to an issue, bumping `updated_at` and the feature bill.
    pub fn update_issue<F>(&mut self, id: &str, change: F) -> Result<Issue>
    where
        F: FnOnce(&mut Issue),
    {
        let key = self.issue_key(id).ok_or_else(|| Error::IssueNotFound {
            id: id::normalize(id),
        })?;
        let issue = self
            .issues
            .get_mut(&key)
            .ok_or_else(|| Error::IssueNotFound { id: key.clone() })?;
        change(issue);
        issue.updated_at = Utc::now();
        let updated = issue.clone();
        self.refresh_feature_bill(&key);
        Ok(updated)
    }

    /// Remove an issue that has no children, cleaning back-references.
    pub fn remove_issue(&mut self, id: &str) -> Result<Issue> {
        let key = self.issue_key(id).ok_or_else(|| Error::IssueNotFound {
            id: id::normalize(id),
        })?;
        let issue = self.issues.get(&key).ok_or_else(|| Error::IssueNotFound {
            id: key.clone(),
        })?;
        if !issue.children.is_empty() {
            return Err(Error::IssueHasChildren {
                id: key,
                children: issue.children.clone(),
            });
        }

        let issue = match self.issues.remove(&key) {
            Some(issue) => issue,
            None => return Err(Error::IssueNotFound { id: key }),
        };

        if let Some(parent_key) = issue.parent_id.as_deref().and_then(|p| self.issue_key(p)) {
            if let Some(parent) = self.issues.get_mut(&parent_key) {
                parent.children.retain(|c| !c.eq_ignore_ascii_case(&key));
                parent.updated_at = Utc::now();
            }
            self.refresh_feature_bill(&parent_key);
        }
        if let Some(sprint_key) = issue.sprint_id.as_deref().and_then(|s| self.sprint_key(s)) {
            if let Some(sprint) = self.sprints.get_mut(&sprint_key) {
                sprint.issues.retain(|i| !i.eq_ignore_ascii_case(&key));
                sprint.updated_at = Utc::now();
            }
        }
        self.feature_bill.remove(&key);
        Ok(issue)
    }

    /// Move an issue under a new parent, keeping its id.
    pub fn reparent_issue(&mut self, id: &str, new_parent_id: &str) -> Result<Issue> {
        let issue = self.require_issue(id)?.clone();
        let new_parent = self
            .validate_parent(issue.issue_type, Some(new_parent_id))?
            .ok_or_else(|| Error::ParentNotFound {
                id: id::normalize(new_parent_id),
            })?;

        if issue
            .parent_id
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(&new_parent))
        {
            return Ok(issue);
        }
        if new_parent == issue.id || self.descendants(&issue.id).contains(&new_parent) {
            return Err(Error::HierarchyViolation(format!(
                "cannot move {} under itself or one of its descendants",
                issue.id
            )));
        }

        let segment = id::own_segment(&issue.id)?;
        let parent = self.require_issue(&new_parent)?;
        for sibling in &parent.children {
            if id::own_segment(sibling)?.eq_ignore_ascii_case(&segment) {
                return Err(Error::HierarchyViolation(format!(
                    "{} already has a child with segment {} ({})",
                    new_parent, segment, sibling
                )));
            }
        }

        if issue.issue_type == IssueType::Feature {
            let depth = self.chain(&new_parent).len() + self.feature_height(&issue.id);
            if depth > id::MAX_FEATURE_LEVEL {
                return Err(Error::HierarchyViolation(format!(
                    "moving {} under {} would nest features {} levels deep",
                    issue.id, new_parent, depth
                )));
            }
        }

        if let Some(old_key) = issue.parent_id.as_deref().and_then(|p| self.issue_key(p)) {
            if let Some(old_parent) = self.issues.get_mut(&old_key) {
                old_parent.children.retain(|c| !c.eq_ignore_ascii_case(&issue.id));
                old_parent.updated_at = Utc::now();
            }
            self.refresh_feature_bill(&old_key);
        }
        if let Some(parent) = self.issues.get_mut(&new_parent) {
            parent.children.push(issue.id.clone());
            parent.updated_at = Utc::now();
        }
        self.refresh_feature_bill(&new_parent);

        self.update_issue(&issue.id, |i| i.parent_id = Some(new_parent.clone()))
    }

    /// Ids from the root ancestor down to `id` itself.
    ///
    /// Empty if any link in the chain is missing or the chain loops.
    pub fn chain(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get_issue(id);
        while let Some(issue) = current {
            if !seen.insert(issue.id.clone()) {
                return Vec::new();
            }
            chain.push(issue.id.clone());
            current = match issue.parent_id.as_deref() {
                Some(parent) => match self.get_issue(parent) {
                    Some(p) => Some(p),
                    None => return Vec::new(),
                },
                None => None,
            };
        }
        chain.reverse();
        chain
    }

    /// Every descendant of `id`, depth first.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<String> = self
            .get_issue(id)
            .map(|i| i.children.iter().rev().cloned().collect())
            .unwrap_or_default();
        let mut seen = HashSet::new();
        while let Some(child) = stack.pop() {
            if !seen.insert(child.clone()) {
                continue;
            }
            if let Some(issue) = self.get_issue(&child) {
                stack.extend(issue.children.iter().rev().cloned());
            }
            out.push(child);
        }
        out
    }

    /// Levels of feature nesting at and below `id` (1 for a leaf feature).
    fn feature_height(&self, id: &str) -> usize {
        self.feature_height_bounded(id, self.issues.len())
    }

    fn feature_height_bounded(&self, id: &str, budget: usize) -> usize {
        let Some(issue) = self.get_issue(id) else {
            return 0;
        };
        if issue.issue_type != IssueType::Feature || budget == 0 {
            return 0;
        }
        1 + issue
            .children
            .iter()
            .map(|c| self.feature_height_bounded(c, budget - 1))
            .max()
            .unwrap_or(0)
    }

    /// Recompute the feature-bill entry for `id`, dropping it for non-features.
    pub fn refresh_feature_bill(&mut self, id: &str) {
        let entry = match self.get_issue(id) {
            None => Err(id::normalize(id)),
            Some(issue) if issue.issue_type != IssueType::Feature => Err(issue.id.clone()),
            Some(issue) => Ok(FeatureBillEntry {
                id: issue.id.clone(),
                name: issue.name.clone(),
                keywords: issue.keywords.clone(),
                status: issue.status,
                priority: issue.priority,
                level: id::level_of(&issue.id).unwrap_or(0),
                parent_id: issue.parent_id.clone(),
                children: issue.children.clone(),
                sprint_id: issue.sprint_id.clone(),
                updated_at: issue.updated_at,
            }),
        };
        match entry {
            Ok(entry) => {
                self.feature_bill.insert(entry.id.clone(), entry);
            }
            Err(key) => {
                self.feature_bill.remove(&key);
            }
        }
    }

    pub fn insert_sprint(&mut self, sprint: Sprint) -> Result<()> {
        if self.sprints.contains_key(&sprint.id) {
            return Err(Error::InvalidValue(format!("Sprint {} already exists", sprint.id)));
        }
        if !self.release.sprints.contains(&sprint.id) {
            self.release.sprints.push(sprint.id.clone());
        }
        self.sprints.insert(sprint.id.clone(), sprint);
        Ok(())
    }

    pub fn update_sprint<F>(&mut self, id: &str, change: F) -> Result<Sprint>
    where
        F: FnOnce(&mut Sprint),
    {
        let key = self.sprint_key(id).ok_or_else(|| Error::SprintNotFound {
            id: id::normalize_sprint_id(id),
        })?;
        let sprint = self
            .sprints
            .get_mut(&key)
            .ok_or_else(|| Error::SprintNotFound { id: key.clone() })?;
        change(sprint);
        sprint.updated_at = Utc::now();
        Ok(sprint.clone())
    }

    /// Remove a sprint, clearing `sprint_id` on every member issue.
    pub fn remove_sprint(&mut self, id: &str) -> Result<Sprint> {
        let key = self.sprint_key(id).ok_or_else(|| Error::SprintNotFound {
            id: id::normalize_sprint_id(id),
        })?;
        let sprint = self
            .sprints
            .remove(&key)
            .ok_or_else(|| Error::SprintNotFound { id: key.clone() })?;

        let members: Vec<String> = self
            .issues
            .values()
            .filter(|i| {
                i.sprint_id
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(&key))
            })
            .map(|i| i.id.clone())
            .collect();
        for member in members {
            self.update_issue(&member, |i| i.sprint_id = None)?;
        }

        self.release.sprints.retain(|s| !s.eq_ignore_ascii_case(&key));
        if self
            .release
            .current_sprint
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(&key))
        {
            self.release.current_sprint = None;
        }
        Ok(sprint)
    }

    /// Put an issue in a sprint, updating both sides.
    ///
    /// Returns the sprint the issue was previously in, if it was moved.
    pub fn assign_to_sprint(&mut self, issue_id: &str, sprint_id: &str) -> Result<Option<String>> {
        let issue = self.require_issue(issue_id)?.clone();
        let sprint = self.require_sprint(sprint_id)?.clone();
        if !sprint.status.is_open() {
            return Err(Error::SprintClosed {
                id: sprint.id,
                status: sprint.status.to_string(),
            });
        }

        let previous = issue
            .sprint_id
            .clone()
            .filter(|s| !s.eq_ignore_ascii_case(&sprint.id));
        if let Some(prev) = &previous {
            if let Some(prev_key) = self.sprint_key(prev) {
                self.update_sprint(&prev_key, |s| {
                    s.issues.retain(|i| !i.eq_ignore_ascii_case(&issue.id))
                })?;
            }
        }

        if !sprint.issues.iter().any(|i| i.eq_ignore_ascii_case(&issue.id)) {
            self.update_sprint(&sprint.id, |s| s.issues.push(issue.id.clone()))?;
        }
        if issue.sprint_id.as_deref() != Some(sprint.id.as_str()) {
            self.update_issue(&issue.id, |i| i.sprint_id = Some(sprint.id.clone()))?;
        }
        Ok(previous)
    }

    /// Take an issue out of a sprint. Returns false when it was not a member.
    pub fn remove_from_sprint(&mut self, issue_id: &str, sprint_id: &str) -> Result<bool> {
        let issue = self.require_issue(issue_id)?.clone();
        let sprint = self.require_sprint(sprint_id)?.clone();

        let was_member = sprint.issues.iter().any(|i| i.eq_ignore_ascii_case(&issue.id));
        if was_member {
            self.update_sprint(&sprint.id, |s| {
                s.issues.retain(|i| !i.eq_ignore_ascii_case(&issue.id))
            })?;
        }
        let points_here = issue
            .sprint_id
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(&sprint.id));
        if points_here {
            self.update_issue(&issue.id, |i| i.sprint_id = None)?;
        }
        Ok(was_member || points_here)
    }

    pub fn active_sprint(&self) -> Option<&Sprint> {
        self.sprints
            .values()
            .find(|s| s.status == SprintStatus::Active)
    }

    /// Count of a sprint's member issues that are done.
    pub fn velocity_of(&self, sprint_id: &str) -> u32 {
        self.get_sprint(sprint_id)
            .map(|s| {
                s.issues
                    .iter()
                    .filter_map(|i| self.get_issue(i))
                    .filter(|i| i.status == crate::types::Status::Done)
                    .count() as u32
            })
            .unwrap_or(0)
    }
}

struct CachedDatabase {
    mtime: FileTime,
    db: Database,
}

/// Loads and saves the database file.
pub struct MetadataStore {
    path: PathBuf,
    backup_path: PathBuf,
    cache: RefCell<Option<CachedDatabase>>,
}

impl MetadataStore {
    pub fn new(ppp_dir: &Path) -> Self {
        Self {
            path: ppp_dir.join(DATABASE_FILE),
            backup_path: ppp_dir.join(BACKUP_FILE),
            cache: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the database, reusing the cached copy if the file is unchanged.
    pub fn load(&self) -> Result<Database> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DatabaseNotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(Error::fs("stat", &self.path, e)),
        };
        let mtime = FileTime::from_last_modification_time(&meta);

        if let Some(cached) = self.cache.borrow().as_ref() {
            if cached.mtime == mtime {
                return Ok(cached.db.clone());
            }
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| Error::fs("read", &self.path, e))?;
        let db = self.parse(&content)?;
        debug!(path = %self.path.display(), issues = db.issues.len(), "Loaded database");

        *self.cache.borrow_mut() = Some(CachedDatabase {
            mtime,
            db: db.clone(),
        });
        Ok(db)
    }

    fn parse(&self, content: &str) -> Result<Database> {
        let corrupt = |reason: String| Error::DatabaseCorrupt {
            path: self.path.clone(),
            reason,
        };

        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| corrupt(e.to_string()))?;
        let mapping = value
            .as_mapping()
            .ok_or_else(|| corrupt("top level is not a mapping".to_string()))?;
        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| !mapping.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(corrupt(format!(
                "missing required keys: {}",
                missing.join(", ")
            )));
        }

        serde_yaml::from_value(value).map_err(|e| corrupt(e.to_string()))
    }

    /// Back up the current file, then atomically replace it with `db`.
    pub fn save(&self, db: &mut Database) -> Result<()> {
        db.metadata.updated = Utc::now();
        let yaml = serde_yaml::to_string(&*db)?;

        if self.path.exists() {
            fs::copy(&self.path, &self.backup_path)
                .map_err(|e| Error::fs("back up", &self.backup_path, e))?;
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::fs("create temp file in", dir, e))?;
        tmp.write_all(yaml.as_bytes())
            .map_err(|e| Error::fs("write", tmp.path().to_path_buf(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::fs("replace", &self.path, e.error))?;

        let meta = fs::metadata(&self.path).map_err(|e| Error::fs("stat", &self.path, e))?;
        *self.cache.borrow_mut() = Some(CachedDatabase {
            mtime: FileTime::from_last_modification_time(&meta),
            db: db.clone(),
        });
        Ok(())
    }

    /// Load, apply `change`, and save only if it succeeded.
    pub fn update<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        let mut db = self.load()?;
        let out = change(&mut db)?;
        self.save(&mut db)?;
        Ok(out)
    }

    pub fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        Ok(self.load()?.get_issue(id).cloned())
    }

    pub fn create_issue(&self, issue: Issue) -> Result<()> {
        self.update(|db| db.insert_issue(issue))
    }

    pub fn delete_issue(&self, id: &str) -> Result<Issue> {
        self.update(|db| db.remove_issue(id))
    }

    pub fn delete_sprint(&self, id: &str) -> Result<Sprint> {
        self.update(|db| db.remove_sprint(id))
    }

    pub fn get_active_sprint(&self) -> Result<Option<Sprint>> {
        Ok(self.load()?.active_sprint().cloned())
    }
}
