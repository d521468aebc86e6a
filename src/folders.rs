//! On-disk folder tree for issues and sprints.
//!
//! Folder paths are never stored. An issue's folder is found by walking its
//! parent chain from the project root and matching each level segment against
//! `<SEGMENT>-` directory prefixes, so renaming a folder only ever touches one
//! directory entry.
//!
//! Resolution misses are logged and reported as `None`; only failures of an
//! actual write (rename, mkdir, symlink) are errors.

use crate::database::Database;
use crate::error::{Error, Result};
use crate::id;
use crate::types::Issue;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ARCHIVE_DIR: &str = "_archived";

/// Placeholder keywords for an ancestor folder that cannot be found.
const PLACEHOLDER: &str = "folder";

pub struct Folders {
    root: PathBuf,
}

fn segment_matches(name: &str, segment: &str) -> bool {
    let prefix = format!("{}-", segment.to_lowercase());
    name.to_lowercase().starts_with(&prefix)
}

/// Keywords part of a folder name (`F01-user_management` -> `user_management`).
pub fn folder_keywords(folder: &Path) -> Option<String> {
    let name = folder.file_name()?.to_str()?;
    name.split_once('-').map(|(_, rest)| rest.to_string())
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(unix)]
fn remove_link(link: &Path) -> std::io::Result<()> {
    fs::remove_file(link)
}

#[cfg(windows)]
fn remove_link(link: &Path) -> std::io::Result<()> {
    fs::remove_dir(link).or_else(|_| fs::remove_file(link))
}

impl Folders {
    /// `root` is the project directory (`.ppp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First immediate subdirectory of `dir` named `<segment>-...`.
    ///
    /// Several matches mean two issues share a segment; the first in sorted
    /// order wins and the rest are reported.
    pub fn find_child_dir(dir: &Path, segment: &str) -> Option<PathBuf> {
        let entries = fs::read_dir(dir).ok()?;
        let mut matches: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|e| segment_matches(&e.file_name().to_string_lossy(), segment))
            .map(|e| e.path())
            .collect();
        matches.sort();
        if matches.len() > 1 {
            let candidates: Vec<String> = matches.iter().map(|p| p.display().to_string()).collect();
            warn!(segment, ?candidates, "Several folders match one segment, using the first");
        }
        matches.into_iter().next()
    }

    /// Level segments from the root ancestor down to `id`.
    fn segments(db: &Database, id: &str) -> Option<Vec<String>> {
        let chain = db.chain(id);
        if chain.is_empty() {
            return None;
        }
        chain.iter().map(|c| id::own_segment(c).ok()).collect()
    }

    /// Current folder of an issue, if it can be found on disk.
    pub fn resolve(&self, db: &Database, id: &str) -> Option<PathBuf> {
        let Some(segments) = Self::segments(db, id) else {
            warn!(id, "Parent chain is broken, cannot resolve folder");
            return None;
        };

        let mut current = self.root.clone();
        for segment in &segments {
            match Self::find_child_dir(&current, segment) {
                Some(next) => current = next,
                None => {
                    warn!(id, segment = %segment, dir = %current.display(), "Folder not found");
                    return None;
                }
            }
        }
        Some(current)
    }

    /// Where an issue's folder should live given its current keywords.
    pub fn generate(&self, db: &Database, issue: &Issue) -> Result<PathBuf> {
        let name = format!("{}-{}", id::own_segment(&issue.id)?, issue.keywords);

        if let Some(parent) = issue.parent_id.as_deref() {
            let parent_dir = self
                .resolve(db, parent)
                .ok_or_else(|| Error::ParentFolderMissing {
                    id: id::normalize(parent),
                })?;
            return Ok(parent_dir.join(name));
        }

        let level = id::level_of(&issue.id)?;
        let mut path = self.root.clone();
        for l in 1..level {
            let segment = id::level_segment(&issue.id, l)?;
            path = match Self::find_child_dir(&path, &segment) {
                Some(existing) => existing,
                None => path.join(format!("{}-{}", segment, PLACEHOLDER)),
            };
        }
        Ok(path.join(name))
    }

    /// Make the folder match the issue's keywords, renaming or creating it.
    pub fn reconcile(&self, db: &Database, issue: &Issue) -> Result<PathBuf> {
        let current = self.resolve(db, &issue.id);
        self.reconcile_from(db, issue, current)
    }

    /// Like [`Folders::reconcile`], with the current folder already known.
    ///
    /// Used when the parent chain changed, so the old folder can no longer be
    /// found from metadata.
    pub fn reconcile_from(
        &self,
        db: &Database,
        issue: &Issue,
        current: Option<PathBuf>,
    ) -> Result<PathBuf> {
        let desired = self.generate(db, issue)?;

        let Some(current) = current.filter(|c| c.is_dir()) else {
            fs::create_dir_all(&desired).map_err(|e| Error::fs("create", &desired, e))?;
            debug!(id = %issue.id, path = %desired.display(), "Created folder");
            return Ok(desired);
        };

        if current == desired {
            return Ok(current);
        }
        if desired.exists() {
            warn!(
                id = %issue.id,
                from = %current.display(),
                to = %desired.display(),
                "Rename target already exists, keeping current folder"
            );
            return Ok(current);
        }

        if let Some(parent) = desired.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::fs("create", parent, e))?;
        }
        fs::rename(&current, &desired).map_err(|e| Error::fs("rename", &current, e))?;
        info!(
            id = %issue.id,
            from = %current.display(),
            to = %desired.display(),
            "Moved folder"
        );
        Ok(desired)
    }

    /// Move a folder under `_archived/` with a timestamp suffix.
    ///
    /// Returns `None` when there was nothing to archive.
    pub fn archive(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.exists() {
            debug!(path = %path.display(), "Nothing to archive");
            return Ok(None);
        }
        let archive_dir = self.root.join(ARCHIVE_DIR);
        fs::create_dir_all(&archive_dir).map_err(|e| Error::fs("create", &archive_dir, e))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "folder".to_string());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let mut dest = archive_dir.join(format!("{}_{}", name, stamp));
        let mut n = 1;
        while dest.exists() {
            dest = archive_dir.join(format!("{}_{}_{}", name, stamp, n));
            n += 1;
        }

        fs::rename(path, &dest).map_err(|e| Error::fs("archive", path, e))?;
        info!(from = %path.display(), to = %dest.display(), "Archived folder");
        Ok(Some(dest))
    }

    pub fn sprint_dir(&self, sprint_id: &str) -> PathBuf {
        self.root.join(id::normalize_sprint_id(sprint_id))
    }

    pub fn ensure_sprint_dir(&self, sprint_id: &str) -> Result<PathBuf> {
        let dir = self.sprint_dir(sprint_id);
        fs::create_dir_all(&dir).map_err(|e| Error::fs("create", &dir, e))?;
        Ok(dir)
    }

    /// Symlinks in a sprint folder with their resolved targets (`None` if dangling).
    pub fn sprint_links(&self, sprint_id: &str) -> Vec<(PathBuf, Option<PathBuf>)> {
        let Ok(entries) = fs::read_dir(self.sprint_dir(sprint_id)) else {
            return Vec::new();
        };
        let mut links: Vec<(PathBuf, Option<PathBuf>)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_symlink())
            .map(|p| {
                let target = fs::canonicalize(&p).ok();
                (p, target)
            })
            .collect();
        links.sort();
        links
    }

    /// The link in a sprint folder that points at `target`, matched by resolved path.
    pub fn find_sprint_link(&self, sprint_id: &str, target: &Path) -> Option<PathBuf> {
        let target = fs::canonicalize(target).ok()?;
        self.sprint_links(sprint_id)
            .into_iter()
            .find(|(_, resolved)| resolved.as_deref() == Some(target.as_path()))
            .map(|(link, _)| link)
    }

    fn link_target(&self, sprint_id: &str, folder: &Path) -> PathBuf {
        match folder.strip_prefix(&self.root) {
            Ok(rel) => Path::new("..").join(rel),
            Err(_) => {
                debug!(sprint = sprint_id, folder = %folder.display(), "Linking by absolute path");
                folder.to_path_buf()
            }
        }
    }

    /// Link an issue folder into a sprint folder. No-op if a link to it exists.
    pub fn link_issue(&self, sprint_id: &str, issue_id: &str, folder: &Path) -> Result<PathBuf> {
        if let Some(existing) = self.find_sprint_link(sprint_id, folder) {
            return Ok(existing);
        }
        let dir = self.ensure_sprint_dir(sprint_id)?;
        let name = match folder_keywords(folder) {
            Some(keywords) => format!("{}-{}", issue_id, keywords),
            None => issue_id.to_string(),
        };
        let link = dir.join(name);

        if link.is_symlink() {
            remove_link(&link).map_err(|e| Error::fs("remove link", &link, e))?;
        } else if link.exists() {
            warn!(link = %link.display(), "A non-link entry is in the way, not linking");
            return Ok(link);
        }

        let target = self.link_target(sprint_id, folder);
        make_link(&target, &link).map_err(|e| Error::fs("symlink", &link, e))?;
        debug!(sprint = sprint_id, issue = issue_id, link = %link.display(), "Linked issue");
        Ok(link)
    }

    /// Remove an issue's link from a sprint folder.
    ///
    /// Matches by resolved target and also by `<issueId>-` name, so links left
    /// dangling by a moved or archived folder are removed too.
    pub fn unlink_issue(&self, sprint_id: &str, issue_id: &str, folder: Option<&Path>) -> Result<bool> {
        let target = folder.and_then(|f| fs::canonicalize(f).ok());
        let prefix = format!("{}-", issue_id.to_lowercase());
        let mut removed = false;

        for (link, resolved) in self.sprint_links(sprint_id) {
            let by_target = target.is_some() && resolved == target;
            let by_name = link
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .is_some_and(|n| n.starts_with(&prefix) || n == issue_id.to_lowercase());
            if by_target || by_name {
                remove_link(&link).map_err(|e| Error::fs("remove link", &link, e))?;
                removed = true;
            }
        }
        Ok(removed)
    }

    /// Bring a sprint folder's links in line with its members.
    ///
    /// Dangling links and links to non-members are removed; every member with
    /// a resolvable folder gets a link.
    pub fn sync_sprint_links(&self, sprint_id: &str, members: &[(String, PathBuf)]) -> Result<()> {
        let wanted: Vec<PathBuf> = members
            .iter()
            .filter_map(|(_, folder)| fs::canonicalize(folder).ok())
            .collect();

        for (link, resolved) in self.sprint_links(sprint_id) {
            let keep = resolved.as_ref().is_some_and(|r| wanted.contains(r));
            if !keep {
                remove_link(&link).map_err(|e| Error::fs("remove link", &link, e))?;
                debug!(link = %link.display(), "Pruned sprint link");
            }
        }
        for (issue_id, folder) in members {
            self.link_issue(sprint_id, issue_id, folder)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssueType;
    use tempfile::TempDir;

    fn add(db: &mut Database, issue_type: IssueType, parent: Option<&str>, keywords: &str) -> Issue {
        let parent = db.validate_parent(issue_type, parent).unwrap();
        let id = db.mint_issue_id(issue_type, parent.as_deref()).unwrap();
        let mut issue = Issue::new(id.clone(), issue_type, keywords.into(), keywords.into());
        issue.parent_id = parent;
        db.insert_issue(issue.clone()).unwrap();
        issue
    }

    fn setup() -> (TempDir, Folders, Database) {
        let dir = TempDir::new().unwrap();
        let folders = Folders::new(dir.path());
        (dir, folders, Database::new("demo"))
    }

    #[test]
    fn test_generate_and_resolve_nested() {
        let (_dir, folders, mut db) = setup();
        let f = add(&mut db, IssueType::Feature, None, "user_management");
        let t = add(&mut db, IssueType::Task, Some("F01"), "login_form");

        let f_path = folders.reconcile(&db, &f).unwrap();
        assert_eq!(f_path, folders.root().join("F01-user_management"));
        let t_path = folders.reconcile(&db, &t).unwrap();
        assert_eq!(t_path, f_path.join("T01-login_form"));

        assert_eq!(folders.resolve(&db, "t0101"), Some(t_path));
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let (_dir, folders, mut db) = setup();
        add(&mut db, IssueType::Feature, None, "x");
        fs::create_dir_all(folders.root().join("f01-Hand_Made")).unwrap();
        assert_eq!(
            folders.resolve(&db, "F01"),
            Some(folders.root().join("f01-Hand_Made"))
        );
    }

    #[test]
    fn test_ambiguous_segment_picks_first_sorted() {
        let (dir, _folders, _db) = setup();
        fs::create_dir_all(dir.path().join("T01-zeta")).unwrap();
        fs::create_dir_all(dir.path().join("T01-alpha")).unwrap();
        fs::create_dir_all(dir.path().join("T010-other")).unwrap();
        assert_eq!(
            Folders::find_child_dir(dir.path(), "T01"),
            Some(dir.path().join("T01-alpha"))
        );
    }

    #[test]
    fn test_resolve_missing_folder_is_none() {
        let (_dir, folders, mut db) = setup();
        add(&mut db, IssueType::Feature, None, "x");
        assert_eq!(folders.resolve(&db, "F01"), None);
        assert_eq!(folders.resolve(&db, "F99"), None);
    }

    #[test]
    fn test_generate_requires_parent_folder() {
        let (_dir, folders, mut db) = setup();
        add(&mut db, IssueType::Feature, None, "x");
        let t = add(&mut db, IssueType::Task, Some("F01"), "t");
        assert!(matches!(
            folders.generate(&db, &t),
            Err(Error::ParentFolderMissing { .. })
        ));
    }

    #[test]
    fn test_rename_keeps_children_resolvable() {
        let (_dir, folders, mut db) = setup();
        let f = add(&mut db, IssueType::Feature, None, "old_name");
        let t = add(&mut db, IssueType::Task, Some("F01"), "child");
        folders.reconcile(&db, &f).unwrap();
        folders.reconcile(&db, &t).unwrap();

        let renamed = db.update_issue("F01", |i| i.keywords = "new_name".into()).unwrap();
        let moved = folders.reconcile(&db, &renamed).unwrap();
        assert_eq!(moved, folders.root().join("F01-new_name"));
        assert!(!folders.root().join("F01-old_name").exists());
        assert_eq!(
            folders.resolve(&db, &t.id),
            Some(moved.join("T01-child"))
        );

        // Second call is a no-op
        assert_eq!(folders.reconcile(&db, &renamed).unwrap(), moved);
    }

    #[test]
    fn test_rename_onto_existing_keeps_current() {
        let (_dir, folders, mut db) = setup();
        let f = add(&mut db, IssueType::Feature, None, "a");
        folders.reconcile(&db, &f).unwrap();
        fs::create_dir_all(folders.root().join("F01-b")).unwrap();

        let renamed = db.update_issue("F01", |i| i.keywords = "b".into()).unwrap();
        // F01-a sorts first, so it stays the resolved folder
        let kept = folders.reconcile(&db, &renamed).unwrap();
        assert_eq!(kept, folders.root().join("F01-a"));
        assert!(kept.exists());
    }

    #[test]
    fn test_archive_moves_folder() {
        let (_dir, folders, mut db) = setup();
        let f = add(&mut db, IssueType::Feature, None, "gone");
        let path = folders.reconcile(&db, &f).unwrap();
        fs::write(path.join("spec.md"), "# gone\n").unwrap();

        let archived = folders.archive(&path).unwrap().unwrap();
        assert!(!path.exists());
        assert!(archived.starts_with(folders.root().join(ARCHIVE_DIR)));
        assert!(archived.join("spec.md").exists());

        assert_eq!(folders.archive(&path).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_sprint_links_are_idempotent() {
        let (_dir, folders, mut db) = setup();
        let f = add(&mut db, IssueType::Feature, None, "feature");
        let t = add(&mut db, IssueType::Task, Some("F01"), "login_form");
        folders.reconcile(&db, &f).unwrap();
        let t_path = folders.reconcile(&db, &t).unwrap();

        let first = folders.link_issue("S01", &t.id, &t_path).unwrap();
        let second = folders.link_issue("S01", &t.id, &t_path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "T0101-login_form");
        assert_eq!(folders.sprint_links("S01").len(), 1);
        assert_eq!(
            fs::read_link(&first).unwrap(),
            Path::new("../F01-feature/T01-login_form")
        );

        assert!(folders.unlink_issue("S01", &t.id, Some(&t_path)).unwrap());
        assert!(!folders.unlink_issue("S01", &t.id, Some(&t_path)).unwrap());
        assert!(folders.sprint_links("S01").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_relinks_after_rename() {
        let (_dir, folders, mut db) = setup();
        let f = add(&mut db, IssueType::Feature, None, "before");
        let path = folders.reconcile(&db, &f).unwrap();
        folders.link_issue("S01", "F01", &path).unwrap();

        let renamed = db.update_issue("F01", |i| i.keywords = "after".into()).unwrap();
        let moved = folders.reconcile(&db, &renamed).unwrap();
        assert_eq!(folders.sprint_links("S01")[0].1, None);

        folders
            .sync_sprint_links("S01", &[("F01".to_string(), moved.clone())])
            .unwrap();
        let links = folders.sprint_links("S01");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0.file_name().unwrap(), "F01-after");
        assert_eq!(links[0].1, Some(fs::canonicalize(&moved).unwrap()));
    }
}
