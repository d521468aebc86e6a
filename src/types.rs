use crate::error::Error;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Issue status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    InProgress,
    Done,
    Blocked,
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::New,
        Status::InProgress,
        Status::Done,
        Status::Blocked,
        Status::Cancelled,
    ];

    /// Get the string representation of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Blocked => "blocked",
            Status::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(Status::New),
            "in_progress" | "in-progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            "blocked" => Ok(Status::Blocked),
            "cancelled" | "canceled" => Ok(Status::Cancelled),
            _ => Err(Error::InvalidValue(format!(
                "Invalid status: '{}'. Valid values are: new, in_progress, done, blocked, cancelled",
                s
            ))),
        }
    }
}

/// Issue priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(Error::InvalidValue(format!(
                "Invalid priority: '{}'. Valid values are: high, medium, low",
                s
            ))),
        }
    }
}

/// Issue type
///
/// Stories and tasks share the `T` id prefix and the same hierarchy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Feature,
    Story,
    Task,
    Bug,
}

impl IssueType {
    pub const ALL: [IssueType; 4] = [
        IssueType::Feature,
        IssueType::Story,
        IssueType::Task,
        IssueType::Bug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Feature => "feature",
            IssueType::Story => "story",
            IssueType::Task => "task",
            IssueType::Bug => "bug",
        }
    }

    /// Id prefix letter for this type
    pub fn prefix(&self) -> char {
        match self {
            IssueType::Feature => 'F',
            IssueType::Story | IssueType::Task => 'T',
            IssueType::Bug => 'B',
        }
    }

    /// Whether an issue of this type may live under a parent of type `parent`.
    pub fn accepts_parent(&self, parent: IssueType) -> bool {
        match self {
            IssueType::Feature => parent == IssueType::Feature,
            IssueType::Story | IssueType::Task | IssueType::Bug => matches!(
                parent,
                IssueType::Feature | IssueType::Story | IssueType::Task
            ),
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IssueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feature" | "f" => Ok(IssueType::Feature),
            "story" => Ok(IssueType::Story),
            "task" | "t" => Ok(IssueType::Task),
            "bug" | "b" => Ok(IssueType::Bug),
            _ => Err(Error::InvalidValue(format!(
                "Invalid issue type: '{}'. Valid values are: feature, story, task, bug",
                s
            ))),
        }
    }
}

/// Sprint lifecycle: planned -> active -> completed -> archived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintStatus {
    Planned,
    Active,
    Completed,
    Archived,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Planned => "planned",
            SprintStatus::Active => "active",
            SprintStatus::Completed => "completed",
            SprintStatus::Archived => "archived",
        }
    }

    /// The only state this one may move to, if any.
    pub fn successor(&self) -> Option<SprintStatus> {
        match self {
            SprintStatus::Planned => Some(SprintStatus::Active),
            SprintStatus::Active => Some(SprintStatus::Completed),
            SprintStatus::Completed => Some(SprintStatus::Archived),
            SprintStatus::Archived => None,
        }
    }

    pub fn can_transition_to(&self, next: SprintStatus) -> bool {
        self.successor() == Some(next)
    }

    /// Planned and active sprints still accept new members.
    pub fn is_open(&self) -> bool {
        matches!(self, SprintStatus::Planned | SprintStatus::Active)
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SprintStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planned" => Ok(SprintStatus::Planned),
            "active" => Ok(SprintStatus::Active),
            "completed" => Ok(SprintStatus::Completed),
            "archived" => Ok(SprintStatus::Archived),
            _ => Err(Error::InvalidValue(format!(
                "Invalid sprint status: '{}'. Valid values are: planned, active, completed, archived",
                s
            ))),
        }
    }
}

/// Issue metadata as stored in the database.
///
/// The on-disk folder is never stored here; it is derived from the parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub name: String,
    pub keywords: String,
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporter: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(id: String, issue_type: IssueType, name: String, keywords: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            issue_type,
            name,
            keywords,
            status: Status::New,
            priority: Priority::Medium,
            assignee: String::new(),
            reporter: String::new(),
            labels: BTreeSet::new(),
            parent_id: None,
            sprint_id: None,
            children: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sprint metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    pub id: String,
    pub name: String,
    pub status: SprintStatus,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub velocity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sprint {
    pub fn new(id: String, name: String, start_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            status: SprintStatus::Planned,
            start_date,
            end_date: None,
            issues: Vec::new(),
            velocity: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lightweight per-feature rollup kept next to the issue map for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBillEntry {
    pub id: String,
    pub name: String,
    pub keywords: String,
    pub status: Status,
    pub priority: Priority,
    pub level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create an issue
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub issue_type: IssueType,
    pub name: String,
    pub parent_id: Option<String>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub labels: BTreeSet<String>,
    pub description: Option<String>,
}

impl NewIssue {
    pub fn new(issue_type: IssueType, name: impl Into<String>) -> Self {
        Self {
            issue_type,
            name: name.into(),
            parent_id: None,
            priority: None,
            assignee: None,
            reporter: None,
            labels: BTreeSet::new(),
            description: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Partial update of an issue. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct IssuePatch {
    pub name: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub labels: Option<BTreeSet<String>>,
    pub description: Option<String>,
    /// New parent id; moving is only allowed between legal parents.
    pub parent_id: Option<String>,
}

/// Request to create a sprint
#[derive(Debug, Clone)]
pub struct NewSprint {
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl NewSprint {
    /// A sprint starting today with no end date.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_date: None,
            end_date: None,
        }
    }
}

/// Explicit issue filter; every set field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub parent_id: Option<String>,
    pub issue_type: Option<IssueType>,
    pub status: Option<Status>,
    pub assignee: Option<String>,
    pub labels: BTreeSet<String>,
    pub sprint_id: Option<String>,
}

impl IssueFilter {
    /// Canonicalize id fields once at the boundary.
    pub fn normalized(mut self) -> Self {
        self.parent_id = self.parent_id.map(|p| crate::id::normalize(&p));
        self.sprint_id = self.sprint_id.map(|s| crate::id::normalize_sprint_id(&s));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == IssueFilter::default()
    }

    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(parent) = &self.parent_id {
            if !issue
                .parent_id
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(parent))
            {
                return false;
            }
        }
        if let Some(t) = self.issue_type {
            if issue.issue_type != t {
                return false;
            }
        }
        if let Some(s) = self.status {
            if issue.status != s {
                return false;
            }
        }
        if let Some(a) = &self.assignee {
            if issue.assignee != *a {
                return false;
            }
        }
        if !self.labels.is_subset(&issue.labels) {
            return false;
        }
        if let Some(sprint) = &self.sprint_id {
            if !issue
                .sprint_id
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(sprint))
            {
                return false;
            }
        }
        true
    }
}

/// One row of a hierarchical listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyEntry {
    pub depth: usize,
    /// False for nodes shown only because they are the root of the listing.
    pub matched: bool,
    #[serde(flatten)]
    pub issue: Issue,
}

/// Project statistics
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub project: String,
    pub total_issues: usize,
    pub by_status: Vec<(String, usize)>,
    pub by_type: Vec<(String, usize)>,
    pub sprints: usize,
    pub active_sprint: Option<String>,
}

/// What a repair pass touched
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub folders: usize,
    pub specs_created: usize,
    pub specs_updated: usize,
    pub sprints: usize,
    /// Issues whose parent chain is broken and could not be placed.
    pub skipped: Vec<String>,
}
