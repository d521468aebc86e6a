//! Coordinator that keeps the database and the folder tree moving together.
//!
//! Metadata is written first and is authoritative. Folder and markdown work
//! follows it and is idempotent, so a command that fails halfway is completed
//! by [`HybridManager::repair`] or by the next write touching the same issue.

use crate::config::{self, ProjectConfig};
use crate::database::{Database, MetadataStore};
use crate::error::{Error, Result};
use crate::folders::Folders;
use crate::format::{self, ChildLink, SprintMember, SPEC_FILE};
use crate::id;
use crate::keywords::{self, KeywordGenerator};
use crate::release::{self, RELEASE_FILE};
use crate::types::{
    FeatureBillEntry, HierarchyEntry, Issue, IssueFilter, IssuePatch, IssueType, NewIssue,
    NewSprint, ProjectStatus, RepairReport, Sprint, SprintStatus, Status,
};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the project directory.
pub const PPP_DIR: &str = ".ppp";

pub struct HybridManager {
    ppp_dir: PathBuf,
    store: MetadataStore,
    folders: Folders,
    config: ProjectConfig,
    keywords: Box<dyn KeywordGenerator>,
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidValue("Name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| Error::fs("write", path, e))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::fs("read", path, e)),
    }
}

fn collect_descendants(
    db: &Database,
    issue: &Issue,
    depth: usize,
    filter: &IssueFilter,
    seen: &mut HashSet<String>,
    out: &mut Vec<HierarchyEntry>,
) {
    let mut children: Vec<&Issue> = issue
        .children
        .iter()
        .filter_map(|c| db.get_issue(c))
        .collect();
    children.sort_by(|a, b| a.id.cmp(&b.id));

    for child in children {
        if !seen.insert(child.id.clone()) {
            continue;
        }
        if filter.matches(child) {
            out.push(HierarchyEntry {
                depth,
                matched: true,
                issue: child.clone(),
            });
        }
        collect_descendants(db, child, depth + 1, filter, seen, out);
    }
}

impl HybridManager {
    /// Create a new project directory with an empty database.
    pub fn init(ppp_dir: impl Into<PathBuf>, project_name: &str) -> Result<Self> {
        let ppp_dir = ppp_dir.into();
        let store = MetadataStore::new(&ppp_dir);
        if store.exists() {
            return Err(Error::AlreadyInitialized { path: ppp_dir });
        }

        fs::create_dir_all(&ppp_dir).map_err(|e| Error::fs("create", &ppp_dir, e))?;
        store.save(&mut Database::new(project_name))?;
        if !ppp_dir.join(config::CONFIG_FILE).exists() {
            ProjectConfig::default().save(&ppp_dir)?;
        }
        config::ensure_gitignore(&ppp_dir)?;
        release::ensure(&ppp_dir.join(RELEASE_FILE), project_name)?;

        info!(path = %ppp_dir.display(), project = project_name, "Initialized project");
        Self::open(ppp_dir)
    }

    pub fn open(ppp_dir: impl Into<PathBuf>) -> Result<Self> {
        let ppp_dir = ppp_dir.into();
        let store = MetadataStore::new(&ppp_dir);
        if !store.exists() {
            return Err(Error::DatabaseNotFound {
                path: store.path().to_path_buf(),
            });
        }
        let config = ProjectConfig::load(&ppp_dir)?;
        let keywords = config.keyword_generator();
        Ok(Self {
            folders: Folders::new(ppp_dir.clone()),
            store,
            config,
            keywords,
            ppp_dir,
        })
    }

    pub fn with_keyword_generator(mut self, generator: Box<dyn KeywordGenerator>) -> Self {
        self.keywords = generator;
        self
    }

    pub fn ppp_dir(&self) -> &Path {
        &self.ppp_dir
    }

    pub fn folders(&self) -> &Folders {
        &self.folders
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn load(&self) -> Result<Database> {
        self.store.load()
    }

    fn release_path(&self) -> PathBuf {
        self.ppp_dir.join(RELEASE_FILE)
    }

    // ---- issues ----

    pub fn create_issue(&self, request: NewIssue) -> Result<Issue> {
        let NewIssue {
            issue_type,
            name,
            parent_id,
            priority,
            assignee,
            reporter,
            labels,
            description,
        } = request;
        let name = validate_name(&name)?;

        let mut db = self.store.load()?;
        let parent_id = db.validate_parent(issue_type, parent_id.as_deref())?;
        let id = db.mint_issue_id(issue_type, parent_id.as_deref())?;
        let keywords = keywords::keywords_for(self.keywords.as_ref(), &name);

        let mut issue = Issue::new(id, issue_type, name, keywords);
        issue.parent_id = parent_id.clone();
        issue.priority = priority.or(self.config.default_priority).unwrap_or_default();
        issue.assignee = assignee.unwrap_or_default();
        issue.reporter = reporter
            .or_else(|| self.config.default_reporter.clone())
            .unwrap_or_default();
        issue.labels = labels;

        db.insert_issue(issue.clone())?;
        self.store.save(&mut db)?;
        info!(id = %issue.id, name = %issue.name, "Created issue");

        self.write_issue_spec(&db, &issue.id, description.as_deref(), false)?;
        if let Some(parent) = parent_id.as_deref() {
            self.write_issue_spec(&db, parent, None, true)?;
        }
        Ok(issue)
    }

    pub fn update_issue(&self, id: &str, patch: IssuePatch) -> Result<Issue> {
        let IssuePatch {
            name,
            status,
            priority,
            assignee,
            reporter,
            labels,
            description,
            parent_id,
        } = patch;

        let mut db = self.store.load()?;
        let current = db.require_issue(id)?.clone();
        let name = name.as_deref().map(validate_name).transpose()?;
        let keywords = name
            .as_deref()
            .filter(|n| *n != current.name)
            .map(|n| keywords::keywords_for(self.keywords.as_ref(), n));

        // Must be resolved while the old parent chain is still in metadata
        let old_folder = self.folders.resolve(&db, &current.id);

        let moved = match parent_id.as_deref() {
            Some(new_parent) => {
                let after = db.reparent_issue(&current.id, new_parent)?;
                after.parent_id != current.parent_id
            }
            None => false,
        };

        let issue = db.update_issue(&current.id, |i| {
            if let Some(name) = name {
                i.name = name;
            }
            if let Some(keywords) = keywords {
                i.keywords = keywords;
            }
            if let Some(status) = status {
                i.status = status;
            }
            if let Some(priority) = priority {
                i.priority = priority;
            }
            if let Some(assignee) = assignee {
                i.assignee = assignee;
            }
            if let Some(reporter) = reporter {
                i.reporter = reporter;
            }
            if let Some(labels) = labels {
                i.labels = labels;
            }
        })?;
        self.store.save(&mut db)?;
        info!(id = %issue.id, moved, "Updated issue");

        let relocated = moved || issue.keywords != current.keywords;
        if relocated {
            if let Some(parent) = issue.parent_id.as_deref() {
                self.ensure_folder(&db, parent)?;
            }
            self.folders.reconcile_from(&db, &issue, old_folder)?;
        }
        self.write_issue_spec(&db, &issue.id, description.as_deref(), false)?;

        if relocated {
            // Parents link to children by folder name
            let parents: BTreeSet<String> = current
                .parent_id
                .iter()
                .chain(issue.parent_id.iter())
                .cloned()
                .collect();
            for parent in &parents {
                if db.get_issue(parent).is_some() {
                    self.write_issue_spec(&db, parent, None, true)?;
                }
            }
            let mut affected = vec![issue.id.clone()];
            affected.extend(db.descendants(&issue.id));
            self.sync_sprints_of(&db, &affected)?;
        } else if let Some(sprint) = issue.sprint_id.as_deref() {
            self.write_sprint_spec(&db, sprint)?;
        }

        Ok(issue)
    }

    pub fn delete_issue(&self, id: &str) -> Result<Issue> {
        let mut db = self.store.load()?;
        let folder = {
            let issue = db.require_issue(id)?;
            self.folders.resolve(&db, &issue.id)
        };

        let removed = db.remove_issue(id)?;
        self.store.save(&mut db)?;
        info!(id = %removed.id, "Deleted issue");

        if let Some(sprint) = removed.sprint_id.as_deref() {
            self.folders
                .unlink_issue(sprint, &removed.id, folder.as_deref())?;
            if db.get_sprint(sprint).is_some() {
                self.refresh_sprint_files(&db, sprint)?;
            }
        }
        if let Some(folder) = &folder {
            self.folders.archive(folder)?;
        }
        if let Some(parent) = removed.parent_id.as_deref() {
            if db.get_issue(parent).is_some() {
                self.write_issue_spec(&db, parent, None, true)?;
            }
        }
        Ok(removed)
    }

    pub fn get_issue(&self, id: &str) -> Result<Option<Issue>> {
        self.store.get_issue(id)
    }

    /// Current folder of an issue, if it can be found.
    pub fn issue_folder(&self, id: &str) -> Result<Option<PathBuf>> {
        let db = self.store.load()?;
        let issue = db.require_issue(id)?;
        Ok(self.folders.resolve(&db, &issue.id))
    }

    /// Issues matching `filter`, in id order.
    pub fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let db = self.store.load()?;
        let filter = filter.clone().normalized();
        Ok(db
            .issues
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    /// Depth-first listing from `root` (or every top-level issue).
    ///
    /// Roots are always listed. The filter only selects descendants, and
    /// traversal continues below descendants that do not match.
    pub fn list_issues_hierarchical(
        &self,
        root: Option<&str>,
        filter: &IssueFilter,
    ) -> Result<Vec<HierarchyEntry>> {
        let db = self.store.load()?;
        let filter = filter.clone().normalized();

        let roots: Vec<&Issue> = match root {
            Some(root) => vec![db.require_issue(root)?],
            None => db
                .issues
                .values()
                .filter(|i| {
                    i.parent_id
                        .as_deref()
                        .map_or(true, |p| db.get_issue(p).is_none())
                })
                .collect(),
        };

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            seen.insert(root.id.clone());
            out.push(HierarchyEntry {
                depth: 0,
                matched: filter.matches(root),
                issue: root.clone(),
            });
            collect_descendants(&db, root, 1, &filter, &mut seen, &mut out);
        }
        Ok(out)
    }

    // ---- sprints ----

    pub fn create_sprint(&self, request: NewSprint) -> Result<Sprint> {
        let name = validate_name(&request.name)?;
        let start = request.start_date.unwrap_or_else(|| Utc::now().date_naive());
        if let Some(end) = request.end_date {
            if end < start {
                return Err(Error::InvalidValue(format!(
                    "Sprint end {} is before its start {}",
                    end, start
                )));
            }
        }

        let mut db = self.store.load()?;
        let id = loop {
            let candidate = db.counters.next_sprint_id();
            if !db.sprints.contains_key(&candidate) {
                break candidate;
            }
        };
        let mut sprint = Sprint::new(id, name, start);
        sprint.end_date = request.end_date;
        db.insert_sprint(sprint.clone())?;
        self.store.save(&mut db)?;
        info!(sprint = %sprint.id, name = %sprint.name, "Created sprint");

        self.refresh_sprint_files(&db, &sprint.id)?;
        Ok(sprint)
    }

    /// Make `id` the active sprint, completing whichever sprint was active.
    ///
    /// Every member issue moves to `in_progress`. Re-running on an already
    /// active sprint finishes an interrupted activation.
    pub fn activate_sprint(&self, id: &str) -> Result<Sprint> {
        let mut db = self.store.load()?;
        let target = db.require_sprint(id)?.clone();
        if target.status != SprintStatus::Active
            && !target.status.can_transition_to(SprintStatus::Active)
        {
            return Err(Error::InvalidTransition {
                id: target.id,
                from: target.status.to_string(),
                to: SprintStatus::Active.to_string(),
            });
        }

        let others: Vec<String> = db
            .sprints
            .values()
            .filter(|s| s.status == SprintStatus::Active && s.id != target.id)
            .map(|s| s.id.clone())
            .collect();
        for other in &others {
            Self::complete_in(&mut db, other)?;
        }

        db.update_sprint(&target.id, |s| s.status = SprintStatus::Active)?;
        db.release.current_sprint = Some(target.id.clone());
        let members: Vec<String> = target
            .issues
            .iter()
            .filter(|m| db.get_issue(m).is_some())
            .cloned()
            .collect();
        for member in &members {
            db.update_issue(member, |i| i.status = Status::InProgress)?;
        }
        self.store.save(&mut db)?;
        info!(sprint = %target.id, completed = ?others, "Activated sprint");

        for other in &others {
            self.refresh_sprint_files(&db, other)?;
        }
        for member in &members {
            self.write_issue_spec(&db, member, None, false)?;
        }
        self.refresh_sprint_files(&db, &target.id)?;
        Ok(db.require_sprint(&target.id)?.clone())
    }

    fn complete_in(db: &mut Database, id: &str) -> Result<Sprint> {
        let velocity = db.velocity_of(id);
        let today = Utc::now().date_naive();
        let sprint = db.update_sprint(id, |s| {
            s.status = SprintStatus::Completed;
            s.velocity = velocity;
            s.end_date.get_or_insert(today);
        })?;
        if db
            .release
            .current_sprint
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(&sprint.id))
        {
            db.release.current_sprint = None;
        }
        debug!(sprint = %sprint.id, velocity, "Completed sprint");
        Ok(sprint)
    }

    pub fn complete_sprint(&self, id: &str) -> Result<Sprint> {
        let mut db = self.store.load()?;
        let sprint = db.require_sprint(id)?.clone();
        if !sprint.status.can_transition_to(SprintStatus::Completed) {
            return Err(Error::InvalidTransition {
                id: sprint.id,
                from: sprint.status.to_string(),
                to: SprintStatus::Completed.to_string(),
            });
        }
        let completed = Self::complete_in(&mut db, &sprint.id)?;
        self.store.save(&mut db)?;
        info!(sprint = %completed.id, velocity = completed.velocity, "Completed sprint");

        self.refresh_sprint_files(&db, &completed.id)?;
        Ok(completed)
    }

    pub fn archive_sprint(&self, id: &str) -> Result<Sprint> {
        let mut db = self.store.load()?;
        let sprint = db.require_sprint(id)?.clone();
        if !sprint.status.can_transition_to(SprintStatus::Archived) {
            return Err(Error::InvalidTransition {
                id: sprint.id,
                from: sprint.status.to_string(),
                to: SprintStatus::Archived.to_string(),
            });
        }
        let archived = db.update_sprint(&sprint.id, |s| s.status = SprintStatus::Archived)?;
        self.store.save(&mut db)?;
        info!(sprint = %archived.id, "Archived sprint");

        self.refresh_sprint_files(&db, &archived.id)?;
        Ok(archived)
    }

    pub fn delete_sprint(&self, id: &str) -> Result<Sprint> {
        let mut db = self.store.load()?;
        let sprint = db.remove_sprint(id)?;
        self.store.save(&mut db)?;
        info!(sprint = %sprint.id, "Deleted sprint");

        for member in &sprint.issues {
            if db.get_issue(member).is_some() {
                self.write_issue_spec(&db, member, None, false)?;
            }
        }
        self.folders.archive(&self.folders.sprint_dir(&sprint.id))?;
        release::remove(&self.release_path(), &db.project.name, &sprint.id)?;
        Ok(sprint)
    }

    /// Put an issue into a sprint, taking it out of any previous one.
    pub fn assign_issue_to_sprint(&self, issue_id: &str, sprint_id: &str) -> Result<Sprint> {
        let mut db = self.store.load()?;
        let previous = db.assign_to_sprint(issue_id, sprint_id)?;
        self.store.save(&mut db)?;

        let issue = db.require_issue(issue_id)?.clone();
        let sprint = db.require_sprint(sprint_id)?.clone();
        info!(issue = %issue.id, sprint = %sprint.id, previous = ?previous, "Assigned issue");

        let folder = self.ensure_folder(&db, &issue.id)?;
        if let Some(previous) = previous.as_deref() {
            self.folders.unlink_issue(previous, &issue.id, Some(&folder))?;
            if db.get_sprint(previous).is_some() {
                self.refresh_sprint_files(&db, previous)?;
            }
        }
        self.folders.link_issue(&sprint.id, &issue.id, &folder)?;
        self.write_issue_spec(&db, &issue.id, None, false)?;
        self.refresh_sprint_files(&db, &sprint.id)?;
        Ok(sprint)
    }

    /// Take an issue out of a sprint. Returns false if it was not a member.
    pub fn remove_issue_from_sprint(&self, issue_id: &str, sprint_id: &str) -> Result<bool> {
        let mut db = self.store.load()?;
        if !db.remove_from_sprint(issue_id, sprint_id)? {
            return Ok(false);
        }
        self.store.save(&mut db)?;

        let issue = db.require_issue(issue_id)?.clone();
        let sprint = db.require_sprint(sprint_id)?.clone();
        info!(issue = %issue.id, sprint = %sprint.id, "Removed issue from sprint");

        let folder = self.folders.resolve(&db, &issue.id);
        self.folders
            .unlink_issue(&sprint.id, &issue.id, folder.as_deref())?;
        self.write_issue_spec(&db, &issue.id, None, false)?;
        self.refresh_sprint_files(&db, &sprint.id)?;
        Ok(true)
    }

    pub fn list_sprints(&self) -> Result<Vec<Sprint>> {
        Ok(self.store.load()?.sprints.into_values().collect())
    }

    pub fn get_sprint(&self, id: &str) -> Result<Option<Sprint>> {
        Ok(self.store.load()?.get_sprint(id).cloned())
    }

    pub fn get_active_sprint(&self) -> Result<Option<Sprint>> {
        self.store.get_active_sprint()
    }

    // ---- reporting ----

    pub fn feature_bill(&self) -> Result<Vec<FeatureBillEntry>> {
        Ok(self.store.load()?.feature_bill.into_values().collect())
    }

    pub fn status(&self) -> Result<ProjectStatus> {
        let db = self.store.load()?;
        let by_status = Status::ALL
            .iter()
            .map(|s| {
                let n = db.issues.values().filter(|i| i.status == *s).count();
                (s.to_string(), n)
            })
            .collect();
        let by_type = IssueType::ALL
            .iter()
            .map(|t| {
                let n = db.issues.values().filter(|i| i.issue_type == *t).count();
                (t.to_string(), n)
            })
            .collect();
        Ok(ProjectStatus {
            project: db.project.name.clone(),
            total_issues: db.issues.len(),
            by_status,
            by_type,
            sprints: db.sprints.len(),
            active_sprint: db.active_sprint().map(|s| s.id.clone()),
        })
    }

    /// Replay every idempotent filesystem step from metadata.
    ///
    /// Folders are reconciled parents first, spec files are written or
    /// merged, and every sprint's links, spec and release row are rebuilt.
    pub fn repair(&self) -> Result<RepairReport> {
        let mut db = self.store.load()?;
        let mut report = RepairReport::default();

        let bill_before = db.feature_bill.clone();
        let ids: Vec<String> = db.issues.keys().cloned().collect();
        for id in &ids {
            db.refresh_feature_bill(id);
        }
        db.feature_bill.retain(|k, _| db.issues.contains_key(k));
        if db.feature_bill != bill_before {
            self.store.save(&mut db)?;
        }

        let mut ordered: Vec<(usize, String)> = ids
            .iter()
            .map(|id| (db.chain(id).len(), id.clone()))
            .collect();
        ordered.sort();

        for (depth, id) in ordered {
            if depth == 0 {
                warn!(id = %id, "Parent chain is broken, skipping");
                report.skipped.push(id);
                continue;
            }
            let issue = db.require_issue(&id)?;
            let before = self.folders.resolve(&db, &id);
            let folder = self.folders.reconcile(&db, issue)?;
            if before.as_ref() != Some(&folder) {
                report.folders += 1;
            }
            if folder.join(SPEC_FILE).exists() {
                report.specs_updated += 1;
            } else {
                report.specs_created += 1;
            }
            self.write_issue_spec(&db, &id, None, true)?;
        }

        for sprint_id in db.sprints.keys() {
            self.sync_sprint(&db, sprint_id)?;
            self.update_release(&db, sprint_id)?;
            report.sprints += 1;
        }
        info!(?report, "Repair finished");
        Ok(report)
    }

    // ---- filesystem helpers ----

    /// Reconcile the folders of an issue and its ancestors, root first.
    fn ensure_folder(&self, db: &Database, id: &str) -> Result<PathBuf> {
        let issue = db.require_issue(id)?;
        let chain = db.chain(&issue.id);
        let Some((_, ancestors)) = chain.split_last() else {
            return Err(Error::ParentFolderMissing {
                id: issue.parent_id.clone().unwrap_or_else(|| issue.id.clone()),
            });
        };

        for ancestor_id in ancestors {
            let ancestor = db.require_issue(ancestor_id)?;
            let folder = self.folders.reconcile(db, ancestor)?;
            let spec = folder.join(SPEC_FILE);
            if !spec.exists() {
                let children = self.child_links(db, ancestor, &folder);
                write_file(&spec, &format::render_issue_spec(ancestor, None, &children))?;
            }
        }
        self.folders.reconcile(db, issue)
    }

    fn child_links(&self, db: &Database, issue: &Issue, folder: &Path) -> Vec<ChildLink> {
        let mut children = issue.children.clone();
        children.sort();
        children
            .iter()
            .map(|child_id| {
                let child = db.get_issue(child_id);
                let child_dir = child
                    .and_then(|c| id::own_segment(&c.id).ok())
                    .and_then(|segment| Folders::find_child_dir(folder, &segment))
                    .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
                if child_dir.is_none() {
                    warn!(parent = %issue.id, child = %child_id, "Child folder not found");
                }
                ChildLink {
                    id: child_id.clone(),
                    name: child.map(|c| c.name.clone()).unwrap_or_default(),
                    folder: child_dir,
                }
            })
            .collect()
    }

    /// Write an issue's spec file, merging into the existing one if present.
    fn write_issue_spec(
        &self,
        db: &Database,
        id: &str,
        description: Option<&str>,
        refresh_children: bool,
    ) -> Result<PathBuf> {
        let issue = db.require_issue(id)?;
        let folder = self.ensure_folder(db, &issue.id)?;
        let path = folder.join(SPEC_FILE);
        let children = self.child_links(db, issue, &folder);

        let content = match read_optional(&path)? {
            Some(existing) => format::merge_issue_spec(
                &existing,
                issue,
                description,
                refresh_children.then_some(children.as_slice()),
            ),
            None => format::render_issue_spec(issue, description, &children),
        };
        write_file(&path, &content)?;
        debug!(id = %issue.id, path = %path.display(), "Wrote spec");
        Ok(path)
    }

    fn write_sprint_spec(&self, db: &Database, sprint_id: &str) -> Result<()> {
        let sprint = db.require_sprint(sprint_id)?;
        let dir = self.folders.ensure_sprint_dir(&sprint.id)?;
        let members: Vec<SprintMember> = sprint
            .issues
            .iter()
            .map(|issue_id| {
                let link = self
                    .folders
                    .resolve(db, issue_id)
                    .and_then(|folder| self.folders.find_sprint_link(&sprint.id, &folder))
                    .and_then(|l| l.file_name().map(|n| n.to_string_lossy().into_owned()));
                SprintMember {
                    id: issue_id.clone(),
                    link,
                    done: db
                        .get_issue(issue_id)
                        .is_some_and(|i| i.status == Status::Done),
                }
            })
            .collect();

        let path = dir.join(SPEC_FILE);
        let existing = read_optional(&path)?;
        write_file(
            &path,
            &format::render_sprint_spec(existing.as_deref(), sprint, &members),
        )
    }

    fn update_release(&self, db: &Database, sprint_id: &str) -> Result<()> {
        let sprint = db.require_sprint(sprint_id)?;
        release::upsert(&self.release_path(), &db.project.name, sprint)
    }

    fn refresh_sprint_files(&self, db: &Database, sprint_id: &str) -> Result<()> {
        self.write_sprint_spec(db, sprint_id)?;
        self.update_release(db, sprint_id)
    }

    /// Rebuild a sprint's links from its members, then its spec.
    fn sync_sprint(&self, db: &Database, sprint_id: &str) -> Result<()> {
        let sprint = db.require_sprint(sprint_id)?;
        let members: Vec<(String, PathBuf)> = sprint
            .issues
            .iter()
            .filter_map(|m| self.folders.resolve(db, m).map(|f| (m.clone(), f)))
            .collect();
        self.folders.sync_sprint_links(&sprint.id, &members)?;
        self.write_sprint_spec(db, &sprint.id)
    }

    fn sync_sprints_of(&self, db: &Database, issue_ids: &[String]) -> Result<()> {
        let sprints: BTreeSet<String> = issue_ids
            .iter()
            .filter_map(|id| db.get_issue(id))
            .filter_map(|i| i.sprint_id.clone())
            .collect();
        for sprint in &sprints {
            if db.get_sprint(sprint).is_some() {
                self.sync_sprint(db, sprint)?;
            }
        }
        Ok(())
    }
}
