//! Random ppp action generator for property-based testing
//!
//! [`ActionGenerator`] produces sequences of actions that are valid against
//! its own reference model, which it updates as it goes. Because ids are
//! minted from per-parent counters, the model can predict the id every create
//! will produce.
//!
//! ## Verification Strategy
//!
//! [`ActionExecutor`] replays a sequence against a real [`HybridManager`]:
//! 1. Each `Create`/`CreateSprint` carries an `expected_id`
//! 2. The executor asserts the minted id equals the prediction
//! 3. [`snapshot`] projects the database into the reference model's shape so
//!    the two can be compared wholesale
//! 4. [`check_invariants`] audits relationships and the folder tree
//!
//! Generation is restricted to moves the model can validate cheaply: tasks
//! and bugs live under features, and only tasks and bugs are ever moved.

use crate::format::SPEC_FILE;
use crate::id;
use crate::manager::HybridManager;
use crate::types::{IssuePatch, IssueType, NewIssue, NewSprint, SprintStatus, Status};
use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

const WORDS: &[&str] = &[
    "login", "payment", "search", "report", "export", "profile", "cache", "invoice", "upload",
    "billing", "audit", "session", "widget", "schedule", "import", "alert",
];

/// Represents a ppp command
#[derive(Debug, Clone, PartialEq)]
pub enum PppAction {
    Create {
        expected_id: String,
        issue_type: IssueType,
        parent_id: Option<String>,
        name: String,
    },
    Rename {
        issue_id: String,
        name: String,
    },
    SetStatus {
        issue_id: String,
        status: Status,
    },
    Move {
        issue_id: String,
        new_parent: String,
    },
    Delete {
        issue_id: String,
    },
    CreateSprint {
        expected_id: String,
        name: String,
    },
    Assign {
        issue_id: String,
        sprint_id: String,
    },
    Unassign {
        issue_id: String,
        sprint_id: String,
    },
    Activate {
        sprint_id: String,
    },
    Complete {
        sprint_id: String,
    },
    Repair,
}

impl std::fmt::Display for PppAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PppAction::Create {
                expected_id,
                issue_type,
                parent_id,
                name,
            } => match parent_id {
                Some(p) => write!(f, "create {} {} '{}' under {}", issue_type, expected_id, name, p),
                None => write!(f, "create {} {} '{}'", issue_type, expected_id, name),
            },
            PppAction::Rename { issue_id, name } => write!(f, "rename {} to '{}'", issue_id, name),
            PppAction::SetStatus { issue_id, status } => {
                write!(f, "update {} status:{}", issue_id, status)
            }
            PppAction::Move {
                issue_id,
                new_parent,
            } => write!(f, "move {} under {}", issue_id, new_parent),
            PppAction::Delete { issue_id } => write!(f, "delete {}", issue_id),
            PppAction::CreateSprint { expected_id, name } => {
                write!(f, "sprint create {} '{}'", expected_id, name)
            }
            PppAction::Assign {
                issue_id,
                sprint_id,
            } => write!(f, "sprint assign {} {}", sprint_id, issue_id),
            PppAction::Unassign {
                issue_id,
                sprint_id,
            } => write!(f, "sprint remove {} {}", sprint_id, issue_id),
            PppAction::Activate { sprint_id } => write!(f, "sprint activate {}", sprint_id),
            PppAction::Complete { sprint_id } => write!(f, "sprint complete {}", sprint_id),
            PppAction::Repair => write!(f, "repair"),
        }
    }
}

/// Expected state of one issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceIssue {
    pub issue_type: IssueType,
    pub name: String,
    pub status: Status,
    pub parent_id: Option<String>,
    pub sprint_id: Option<String>,
}

/// Expected state of one sprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSprint {
    pub status: SprintStatus,
    pub issues: Vec<String>,
}

/// Reference model the generator keeps in step with the actions it emits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceState {
    pub issues: BTreeMap<String, ReferenceIssue>,
    pub sprints: BTreeMap<String, ReferenceSprint>,
    counters: BTreeMap<(char, String), u32>,
    sprint_counter: u32,
}

impl ReferenceState {
    /// Id the next create of this kind will mint, if the counter has room.
    ///
    /// Like the real counter, skips ids whose folder segment a sibling moved in
    /// from elsewhere already holds.
    fn peek_id(&self, prefix: char, parent: Option<&str>) -> Option<String> {
        let key = (prefix, parent.unwrap_or("").to_string());
        let mut n = self.counters.get(&key).copied().unwrap_or(0) + 1;
        loop {
            let candidate = id::next_child_id(prefix, parent, n).ok()?;
            let segment = id::own_segment(&candidate).ok()?;
            let taken = self.issues.contains_key(&candidate)
                || self
                    .issues
                    .iter()
                    .filter(|(_, i)| i.parent_id.as_deref() == parent)
                    .any(|(sibling, _)| id::own_segment(sibling).is_ok_and(|s| s == segment));
            if !taken {
                return Some(candidate);
            }
            n += 1;
        }
    }

    fn children_of(&self, parent: &str) -> Vec<&String> {
        self.issues
            .iter()
            .filter(|(_, i)| i.parent_id.as_deref() == Some(parent))
            .map(|(id, _)| id)
            .collect()
    }

    fn detach_from_sprint(&mut self, issue_id: &str) {
        let previous = self
            .issues
            .get(issue_id)
            .and_then(|i| i.sprint_id.clone());
        if let Some(prev) = previous {
            if let Some(sprint) = self.sprints.get_mut(&prev) {
                sprint.issues.retain(|i| i != issue_id);
            }
        }
        if let Some(issue) = self.issues.get_mut(issue_id) {
            issue.sprint_id = None;
        }
    }

    /// Apply an action to the model
    pub fn apply(&mut self, action: &PppAction) {
        match action {
            PppAction::Create {
                expected_id,
                issue_type,
                parent_id,
                name,
            } => {
                let key = (issue_type.prefix(), parent_id.clone().unwrap_or_default());
                let minted = id::digits_of(expected_id)
                    .ok()
                    .and_then(|d| d.get(d.len().saturating_sub(2)..).and_then(|g| g.parse().ok()))
                    .unwrap_or(0);
                let counter = self.counters.entry(key).or_insert(0);
                *counter = (*counter + 1).max(minted);
                self.issues.insert(
                    expected_id.clone(),
                    ReferenceIssue {
                        issue_type: *issue_type,
                        name: name.clone(),
                        status: Status::New,
                        parent_id: parent_id.clone(),
                        sprint_id: None,
                    },
                );
            }
            PppAction::Rename { issue_id, name } => {
                if let Some(issue) = self.issues.get_mut(issue_id) {
                    issue.name = name.clone();
                }
            }
            PppAction::SetStatus { issue_id, status } => {
                if let Some(issue) = self.issues.get_mut(issue_id) {
                    issue.status = *status;
                }
            }
            PppAction::Move {
                issue_id,
                new_parent,
            } => {
                if let Some(issue) = self.issues.get_mut(issue_id) {
                    issue.parent_id = Some(new_parent.clone());
                }
            }
            PppAction::Delete { issue_id } => {
                self.detach_from_sprint(issue_id);
                self.issues.remove(issue_id);
            }
            PppAction::CreateSprint { expected_id, .. } => {
                self.sprint_counter += 1;
                self.sprints.insert(
                    expected_id.clone(),
                    ReferenceSprint {
                        status: SprintStatus::Planned,
                        issues: Vec::new(),
                    },
                );
            }
            PppAction::Assign {
                issue_id,
                sprint_id,
            } => {
                let already = self
                    .issues
                    .get(issue_id)
                    .is_some_and(|i| i.sprint_id.as_deref() == Some(sprint_id.as_str()));
                if !already {
                    self.detach_from_sprint(issue_id);
                    if let Some(sprint) = self.sprints.get_mut(sprint_id) {
                        sprint.issues.push(issue_id.clone());
                    }
                    if let Some(issue) = self.issues.get_mut(issue_id) {
                        issue.sprint_id = Some(sprint_id.clone());
                    }
                }
            }
            PppAction::Unassign { issue_id, .. } => self.detach_from_sprint(issue_id),
            PppAction::Activate { sprint_id } => {
                for (id, sprint) in self.sprints.iter_mut() {
                    if sprint.status == SprintStatus::Active && id != sprint_id {
                        sprint.status = SprintStatus::Completed;
                    }
                }
                let members = match self.sprints.get_mut(sprint_id) {
                    Some(sprint) => {
                        sprint.status = SprintStatus::Active;
                        sprint.issues.clone()
                    }
                    None => Vec::new(),
                };
                for member in members {
                    if let Some(issue) = self.issues.get_mut(&member) {
                        issue.status = Status::InProgress;
                    }
                }
            }
            PppAction::Complete { sprint_id } => {
                if let Some(sprint) = self.sprints.get_mut(sprint_id) {
                    sprint.status = SprintStatus::Completed;
                }
            }
            PppAction::Repair => {}
        }
    }
}

/// Generates random ppp action sequences
///
/// Maintains a reference model so every action is valid when emitted:
/// only existing issues are updated, only leaves are deleted, only open
/// sprints receive issues.
pub struct ActionGenerator {
    rng: StdRng,
    state: ReferenceState,
}

impl ActionGenerator {
    /// Create a new generator with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            state: ReferenceState::default(),
        }
    }

    /// Expected state after every action generated so far
    pub fn state(&self) -> &ReferenceState {
        &self.state
    }

    pub fn generate_sequence(&mut self, num_actions: usize) -> Vec<PppAction> {
        (0..num_actions).map(|_| self.generate_action()).collect()
    }

    /// Generate a single random action based on current state
    pub fn generate_action(&mut self) -> PppAction {
        let action = (0..10)
            .find_map(|_| {
                let roll = if self.state.issues.is_empty() {
                    0
                } else {
                    self.rng.gen_range(0..100)
                };
                match roll {
                    0..=29 => self.generate_create(),
                    30..=39 => self.generate_rename(),
                    40..=54 => self.generate_status(),
                    55..=59 => self.generate_move(),
                    60..=66 => self.generate_delete(),
                    67..=72 => self.generate_create_sprint(),
                    73..=84 => self.generate_assign(),
                    85..=88 => self.generate_unassign(),
                    89..=93 => self.generate_activate(),
                    94..=96 => self.generate_complete(),
                    _ => Some(PppAction::Repair),
                }
            })
            .unwrap_or(PppAction::Repair);

        self.state.apply(&action);
        action
    }

    fn random_name(&mut self) -> String {
        let a = WORDS[self.rng.gen_range(0..WORDS.len())];
        let b = WORDS[self.rng.gen_range(0..WORDS.len())];
        format!("{} {} {}", a, b, self.rng.gen_range(100..999))
    }

    fn pick<T: Clone>(&mut self, items: &[T]) -> Option<T> {
        if items.is_empty() {
            None
        } else {
            Some(items[self.rng.gen_range(0..items.len())].clone())
        }
    }

    fn issues_where<F>(&self, keep: F) -> Vec<String>
    where
        F: Fn(&ReferenceIssue) -> bool,
    {
        self.state
            .issues
            .iter()
            .filter(|(_, i)| keep(*i))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn sprints_where<F>(&self, keep: F) -> Vec<String>
    where
        F: Fn(&ReferenceSprint) -> bool,
    {
        self.state
            .sprints
            .iter()
            .filter(|(_, s)| keep(*s))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn generate_create(&mut self) -> Option<PppAction> {
        let features = self.issues_where(|i| i.issue_type == IssueType::Feature);
        let roll = self.rng.gen_range(0..10);

        let (issue_type, parent_id) = if features.is_empty() || roll < 3 {
            (IssueType::Feature, None)
        } else {
            let parent = self.pick(&features)?;
            let issue_type = match roll {
                3..=4 if id::level_of(&parent).ok()? < id::MAX_FEATURE_LEVEL => IssueType::Feature,
                3..=6 => IssueType::Task,
                7 => IssueType::Story,
                _ => IssueType::Bug,
            };
            (issue_type, Some(parent))
        };

        let expected_id = self
            .state
            .peek_id(issue_type.prefix(), parent_id.as_deref())?;
        Some(PppAction::Create {
            expected_id,
            issue_type,
            parent_id,
            name: self.random_name(),
        })
    }

    fn generate_rename(&mut self) -> Option<PppAction> {
        let ids: Vec<String> = self.state.issues.keys().cloned().collect();
        let issue_id = self.pick(&ids)?;
        Some(PppAction::Rename {
            issue_id,
            name: self.random_name(),
        })
    }

    fn generate_status(&mut self) -> Option<PppAction> {
        let ids: Vec<String> = self.state.issues.keys().cloned().collect();
        let issue_id = self.pick(&ids)?;
        let status = self.pick(&Status::ALL)?;
        Some(PppAction::SetStatus { issue_id, status })
    }

    fn generate_move(&mut self) -> Option<PppAction> {
        let movable = self.issues_where(|i| i.issue_type != IssueType::Feature);
        let issue_id = self.pick(&movable)?;
        let current = self.state.issues.get(&issue_id)?.parent_id.clone();
        let features = self.issues_where(|i| i.issue_type == IssueType::Feature);
        let new_parent = self.pick(&features)?;
        if current.as_deref() == Some(new_parent.as_str()) {
            return None;
        }

        // The new parent must not already have a child with the same folder segment
        let segment = id::own_segment(&issue_id).ok()?;
        let clash = self
            .state
            .children_of(&new_parent)
            .iter()
            .any(|c| id::own_segment(c).is_ok_and(|s| s == segment));
        if clash {
            return None;
        }
        Some(PppAction::Move {
            issue_id,
            new_parent,
        })
    }

    fn generate_delete(&mut self) -> Option<PppAction> {
        let leaves: Vec<String> = self
            .state
            .issues
            .keys()
            .filter(|id| self.state.children_of(id).is_empty())
            .cloned()
            .collect();
        let issue_id = self.pick(&leaves)?;
        Some(PppAction::Delete { issue_id })
    }

    fn generate_create_sprint(&mut self) -> Option<PppAction> {
        let n = self.state.sprint_counter + 1;
        if n > id::MAX_GROUP {
            return None;
        }
        Some(PppAction::CreateSprint {
            expected_id: id::sprint_id(n),
            name: format!("Sprint {}", n),
        })
    }

    fn generate_assign(&mut self) -> Option<PppAction> {
        let open = self.sprints_where(|s| s.status.is_open());
        let sprint_id = self.pick(&open)?;
        let ids: Vec<String> = self.state.issues.keys().cloned().collect();
        let issue_id = self.pick(&ids)?;
        Some(PppAction::Assign {
            issue_id,
            sprint_id,
        })
    }

    fn generate_unassign(&mut self) -> Option<PppAction> {
        let assigned = self.issues_where(|i| i.sprint_id.is_some());
        let issue_id = self.pick(&assigned)?;
        let sprint_id = self.state.issues.get(&issue_id)?.sprint_id.clone()?;
        Some(PppAction::Unassign {
            issue_id,
            sprint_id,
        })
    }

    fn generate_activate(&mut self) -> Option<PppAction> {
        let planned = self.sprints_where(|s| s.status == SprintStatus::Planned);
        let sprint_id = self.pick(&planned)?;
        Some(PppAction::Activate { sprint_id })
    }

    fn generate_complete(&mut self) -> Option<PppAction> {
        let active = self.sprints_where(|s| s.status == SprintStatus::Active);
        let sprint_id = self.pick(&active)?;
        Some(PppAction::Complete { sprint_id })
    }
}

/// Executes ppp actions against a manager in-process
pub struct ActionExecutor<'a> {
    manager: &'a HybridManager,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(manager: &'a HybridManager) -> Self {
        Self { manager }
    }

    /// Execute a single action
    ///
    /// For creates, verifies that the minted id matches `expected_id`
    pub fn execute(&self, action: &PppAction) -> Result<()> {
        let m = self.manager;
        match action {
            PppAction::Create {
                expected_id,
                issue_type,
                parent_id,
                name,
            } => {
                let mut request = NewIssue::new(*issue_type, name.clone());
                request.parent_id = parent_id.clone();
                let issue = m.create_issue(request).context("create failed")?;
                if issue.id != *expected_id {
                    bail!(
                        "Predicted id {} but the manager minted {}",
                        expected_id,
                        issue.id
                    );
                }
            }
            PppAction::Rename { issue_id, name } => {
                m.update_issue(
                    issue_id,
                    IssuePatch {
                        name: Some(name.clone()),
                        ..Default::default()
                    },
                )?;
            }
            PppAction::SetStatus { issue_id, status } => {
                m.update_issue(
                    issue_id,
                    IssuePatch {
                        status: Some(*status),
                        ..Default::default()
                    },
                )?;
            }
            PppAction::Move {
                issue_id,
                new_parent,
            } => {
                m.update_issue(
                    issue_id,
                    IssuePatch {
                        parent_id: Some(new_parent.clone()),
                        ..Default::default()
                    },
                )?;
            }
            PppAction::Delete { issue_id } => {
                m.delete_issue(issue_id)?;
            }
            PppAction::CreateSprint { expected_id, name } => {
                let sprint = m.create_sprint(NewSprint::named(name.clone()))?;
                if sprint.id != *expected_id {
                    bail!(
                        "Predicted sprint {} but the manager minted {}",
                        expected_id,
                        sprint.id
                    );
                }
            }
            PppAction::Assign {
                issue_id,
                sprint_id,
            } => {
                m.assign_issue_to_sprint(issue_id, sprint_id)?;
            }
            PppAction::Unassign {
                issue_id,
                sprint_id,
            } => {
                m.remove_issue_from_sprint(issue_id, sprint_id)?;
            }
            PppAction::Activate { sprint_id } => {
                m.activate_sprint(sprint_id)?;
            }
            PppAction::Complete { sprint_id } => {
                m.complete_sprint(sprint_id)?;
            }
            PppAction::Repair => {
                m.repair()?;
            }
        }
        Ok(())
    }

    pub fn execute_sequence(&self, actions: &[PppAction]) -> Result<()> {
        for (step, action) in actions.iter().enumerate() {
            self.execute(action)
                .with_context(|| format!("step {}: {}", step + 1, action))?;
        }
        Ok(())
    }
}

/// Project the manager's database into the reference model's shape.
pub fn snapshot(manager: &HybridManager) -> Result<ReferenceState> {
    let db = manager.load()?;
    let issues = db
        .issues
        .values()
        .map(|i| {
            (
                i.id.clone(),
                ReferenceIssue {
                    issue_type: i.issue_type,
                    name: i.name.clone(),
                    status: i.status,
                    parent_id: i.parent_id.clone(),
                    sprint_id: i.sprint_id.clone(),
                },
            )
        })
        .collect();
    let sprints = db
        .sprints
        .values()
        .map(|s| {
            (
                s.id.clone(),
                ReferenceSprint {
                    status: s.status,
                    issues: s.issues.clone(),
                },
            )
        })
        .collect();
    Ok(ReferenceState {
        issues,
        sprints,
        ..Default::default()
    })
}

/// Check relationship and folder-tree invariants.
pub fn check_invariants(manager: &HybridManager) -> Result<()> {
    let db = manager.load()?;
    let folders = manager.folders();

    let active = db
        .sprints
        .values()
        .filter(|s| s.status == SprintStatus::Active)
        .count();
    if active > 1 {
        bail!("{} sprints are active at once", active);
    }

    let mut claimed: HashMap<PathBuf, String> = HashMap::new();
    for issue in db.issues.values() {
        if issue.issue_type == IssueType::Feature {
            let depth = db.chain(&issue.id).len();
            if depth > id::MAX_FEATURE_LEVEL || id::level_of(&issue.id)? > id::MAX_FEATURE_LEVEL {
                bail!("feature {} nests too deep (chain depth {})", issue.id, depth);
            }
        }
        if let Some(parent) = issue.parent_id.as_deref() {
            let parent = db
                .get_issue(parent)
                .with_context(|| format!("{} points at missing parent {}", issue.id, parent))?;
            if !parent.children.contains(&issue.id) {
                bail!("{} is not listed among {}'s children", issue.id, parent.id);
            }
        }
        for child in &issue.children {
            let child_issue = db
                .get_issue(child)
                .with_context(|| format!("{} lists missing child {}", issue.id, child))?;
            if child_issue.parent_id.as_deref() != Some(issue.id.as_str()) {
                bail!("{} lists {} but its parent is {:?}", issue.id, child, child_issue.parent_id);
            }
        }

        let folder = folders
            .resolve(&db, &issue.id)
            .with_context(|| format!("folder for {} does not resolve", issue.id))?;
        if !folder.join(SPEC_FILE).is_file() {
            bail!("{} has no {}", folder.display(), SPEC_FILE);
        }
        if let Some(other) = claimed.insert(folder.clone(), issue.id.clone()) {
            bail!("{} and {} both resolve to {}", other, issue.id, folder.display());
        }

        if let Some(sprint_id) = issue.sprint_id.as_deref() {
            let sprint = db
                .get_sprint(sprint_id)
                .with_context(|| format!("{} points at missing sprint {}", issue.id, sprint_id))?;
            if !sprint.issues.contains(&issue.id) {
                bail!("{} is not listed in sprint {}", issue.id, sprint.id);
            }
        }
    }

    for sprint in db.sprints.values() {
        for member in &sprint.issues {
            let issue = db
                .get_issue(member)
                .with_context(|| format!("sprint {} lists missing issue {}", sprint.id, member))?;
            if issue.sprint_id.as_deref() != Some(sprint.id.as_str()) {
                bail!("{} is in sprint {} but points at {:?}", member, sprint.id, issue.sprint_id);
            }
        }

        if cfg!(unix) {
            let links = folders.sprint_links(&sprint.id);
            if links.len() != sprint.issues.len() {
                bail!(
                    "sprint {} has {} members but {} links",
                    sprint.id,
                    sprint.issues.len(),
                    links.len()
                );
            }
            for member in &sprint.issues {
                let folder = folders
                    .resolve(&db, member)
                    .with_context(|| format!("folder for {} does not resolve", member))?;
                if folders.find_sprint_link(&sprint.id, &folder).is_none() {
                    bail!("sprint {} has no link to {}", sprint.id, member);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let a = ActionGenerator::new(7).generate_sequence(50);
        let b = ActionGenerator::new(7).generate_sequence(50);
        assert_eq!(a, b);
    }

    #[test]
    fn test_first_action_creates_a_feature() {
        let actions = ActionGenerator::new(1).generate_sequence(1);
        assert!(matches!(
            &actions[0],
            PppAction::Create { expected_id, issue_type: IssueType::Feature, .. } if expected_id == "F01"
        ));
    }

    #[test]
    fn test_model_predicts_ids_per_parent() {
        let mut state = ReferenceState::default();
        for action in [
            PppAction::Create {
                expected_id: "F01".into(),
                issue_type: IssueType::Feature,
                parent_id: None,
                name: "a".into(),
            },
            PppAction::Create {
                expected_id: "T0101".into(),
                issue_type: IssueType::Task,
                parent_id: Some("F01".into()),
                name: "b".into(),
            },
        ] {
            state.apply(&action);
        }
        assert_eq!(state.peek_id('T', Some("F01")).as_deref(), Some("T0102"));
        assert_eq!(state.peek_id('B', Some("F01")).as_deref(), Some("B0101"));
        assert_eq!(state.peek_id('F', None).as_deref(), Some("F02"));
        assert_eq!(state.peek_id('F', Some("F01")).as_deref(), Some("F0101"));
    }

    #[test]
    fn test_model_skips_segment_held_by_moved_sibling() {
        let mut state = ReferenceState::default();
        for action in [
            PppAction::Create {
                expected_id: "F01".into(),
                issue_type: IssueType::Feature,
                parent_id: None,
                name: "a".into(),
            },
            PppAction::Create {
                expected_id: "F02".into(),
                issue_type: IssueType::Feature,
                parent_id: None,
                name: "b".into(),
            },
            PppAction::Create {
                expected_id: "T0101".into(),
                issue_type: IssueType::Task,
                parent_id: Some("F01".into()),
                name: "c".into(),
            },
            PppAction::Move {
                issue_id: "T0101".into(),
                new_parent: "F02".into(),
            },
        ] {
            state.apply(&action);
        }
        assert_eq!(state.peek_id('T', Some("F02")).as_deref(), Some("T0202"));

        state.apply(&PppAction::Create {
            expected_id: "T0202".into(),
            issue_type: IssueType::Task,
            parent_id: Some("F02".into()),
            name: "d".into(),
        });
        assert_eq!(state.peek_id('T', Some("F02")).as_deref(), Some("T0203"));
    }

    #[test]
    fn test_model_activation_completes_previous() {
        let mut state = ReferenceState::default();
        state.apply(&PppAction::CreateSprint {
            expected_id: "S01".into(),
            name: "one".into(),
        });
        state.apply(&PppAction::CreateSprint {
            expected_id: "S02".into(),
            name: "two".into(),
        });
        state.apply(&PppAction::Activate {
            sprint_id: "S01".into(),
        });
        state.apply(&PppAction::Activate {
            sprint_id: "S02".into(),
        });
        assert_eq!(state.sprints["S01"].status, SprintStatus::Completed);
        assert_eq!(state.sprints["S02"].status, SprintStatus::Active);
    }
}
