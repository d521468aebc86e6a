//! Coordinator behaviour against a real project directory.

use ppp::format::{SpecDocument, DETAILS, SPEC_FILE};
use ppp::folders::ARCHIVE_DIR;
use ppp::keywords::KeywordGenerator;
use ppp::manager::HybridManager;
use ppp::release::RELEASE_FILE;
use ppp::types::{
    IssueFilter, IssuePatch, IssueType, NewIssue, NewSprint, Priority, SprintStatus, Status,
};
use ppp::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn setup() -> (TempDir, HybridManager) {
    let dir = TempDir::new().unwrap();
    let manager = HybridManager::init(dir.path().join(".ppp"), "demo").unwrap();
    (dir, manager)
}

fn feature(manager: &HybridManager, name: &str, parent: Option<&str>) -> String {
    let mut request = NewIssue::new(IssueType::Feature, name);
    request.parent_id = parent.map(str::to_string);
    manager.create_issue(request).unwrap().id
}

fn task(manager: &HybridManager, name: &str, parent: &str) -> String {
    manager
        .create_issue(NewIssue::new(IssueType::Task, name).with_parent(parent))
        .unwrap()
        .id
}

fn set_status(manager: &HybridManager, id: &str, status: Status) {
    let patch = IssuePatch {
        status: Some(status),
        ..Default::default()
    };
    manager.update_issue(id, patch).unwrap();
}

fn folder(manager: &HybridManager, id: &str) -> PathBuf {
    manager.issue_folder(id).unwrap().expect("folder resolves")
}

fn dir_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn test_init_creates_project_files() {
    let (dir, manager) = setup();
    let ppp_dir = dir.path().join(".ppp");
    assert_eq!(manager.ppp_dir(), ppp_dir.as_path());
    assert!(ppp_dir.join("database.yaml").exists());
    assert!(ppp_dir.join("config.yaml").exists());
    assert!(ppp_dir.join(".gitignore").exists());

    let release = fs::read_to_string(ppp_dir.join(RELEASE_FILE)).unwrap();
    assert!(release.starts_with("# Release: demo"));

    let err = HybridManager::init(&ppp_dir, "demo").err().unwrap();
    assert!(matches!(err, Error::AlreadyInitialized { .. }));
}

#[test]
fn test_open_without_database_fails() {
    let dir = TempDir::new().unwrap();
    let err = HybridManager::open(dir.path().join(".ppp")).err().unwrap();
    assert!(matches!(err, Error::DatabaseNotFound { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_feature_ids_follow_parent_counters() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "User management", None);
    let f0101 = feature(&manager, "Login flow", Some(&f01));
    let f02 = feature(&manager, "Reporting", None);
    let f0102 = feature(&manager, "Password reset", Some(&f01));

    assert_eq!(f01, "F01");
    assert_eq!(f0101, "F0101");
    assert_eq!(f02, "F02");
    assert_eq!(f0102, "F0102");

    let parent = manager.get_issue("f01").unwrap().unwrap();
    assert_eq!(parent.children, vec!["F0101", "F0102"]);
}

#[test]
fn test_folders_nest_by_parent_chain() {
    let (dir, manager) = setup();
    let f01 = feature(&manager, "User management", None);
    let f0101 = feature(&manager, "Login flow", Some(&f01));
    let t = task(&manager, "Write the form", &f0101);
    assert_eq!(t, "T010101");

    let expected = dir
        .path()
        .join(".ppp")
        .join("F01-user_management")
        .join("F01-login_flow")
        .join("T01-write_form");
    assert_eq!(folder(&manager, &t), expected);
    assert!(expected.join(SPEC_FILE).exists());
}

#[test]
fn test_feature_nesting_is_limited_to_three_levels() {
    let (_dir, manager) = setup();
    let f1 = feature(&manager, "One", None);
    let f2 = feature(&manager, "Two", Some(&f1));
    let f3 = feature(&manager, "Three", Some(&f2));
    assert_eq!(f3, "F010101");

    let err = manager
        .create_issue(NewIssue::new(IssueType::Feature, "Four").with_parent(&f3))
        .unwrap_err();
    assert!(matches!(err, Error::HierarchyViolation(_)));

    // Tasks may still go below a level-3 feature
    assert_eq!(task(&manager, "Deep task", &f3), "T01010101");
}

#[test]
fn test_tasks_and_bugs_need_a_parent() {
    let (_dir, manager) = setup();
    for issue_type in [IssueType::Task, IssueType::Story, IssueType::Bug] {
        let err = manager
            .create_issue(NewIssue::new(issue_type, "Orphan"))
            .unwrap_err();
        assert!(matches!(err, Error::HierarchyViolation(_)), "{:?}", issue_type);
    }
    assert!(manager.list_issues(&IssueFilter::default()).unwrap().is_empty());
}

#[test]
fn test_invalid_parents_are_rejected_before_any_change() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Task", &f01);

    let err = manager
        .create_issue(NewIssue::new(IssueType::Feature, "Nested").with_parent(&t))
        .unwrap_err();
    assert!(matches!(err, Error::HierarchyViolation(_)));

    let err = manager
        .create_issue(NewIssue::new(IssueType::Task, "Lost").with_parent("F09"))
        .unwrap_err();
    assert!(matches!(err, Error::ParentNotFound { .. }));

    let err = manager
        .create_issue(NewIssue::new(IssueType::Task, "Bad").with_parent("F0"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidIdFormat { .. }));

    let ids: Vec<String> = manager
        .list_issues(&IssueFilter::default())
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(ids, vec!["F01", "T0101"]);
}

#[test]
fn test_tasks_and_bugs_can_nest_under_tasks() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Task", &f01);
    let sub = task(&manager, "Subtask", &t);
    let bug = manager
        .create_issue(NewIssue::new(IssueType::Bug, "Crash").with_parent(&t))
        .unwrap();
    assert_eq!(sub, "T010101");
    assert_eq!(bug.id, "B010101");
    assert!(folder(&manager, &bug.id).starts_with(folder(&manager, &t)));
}

#[test]
fn test_delete_with_children_is_blocked() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    task(&manager, "Child", &f01);

    let err = manager.delete_issue(&f01).unwrap_err();
    assert!(matches!(err, Error::IssueHasChildren { .. }));
    assert_eq!(err.exit_code(), 5);
    assert!(manager.get_issue(&f01).unwrap().is_some());
}

#[test]
fn test_delete_leaf_cleans_references_and_archives_folder() {
    let (dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Leaf work", &f01);
    let sprint = manager.create_sprint(NewSprint::named("Sprint one")).unwrap();
    manager.assign_issue_to_sprint(&t, &sprint.id).unwrap();
    let old_folder = folder(&manager, &t);

    let removed = manager.delete_issue(&t).unwrap();
    assert_eq!(removed.id, t);
    assert!(manager.get_issue(&t).unwrap().is_none());
    assert!(manager.get_issue(&f01).unwrap().unwrap().children.is_empty());
    assert!(manager.get_sprint(&sprint.id).unwrap().unwrap().issues.is_empty());

    assert!(!old_folder.exists());
    let archived: Vec<String> = fs::read_dir(dir.path().join(".ppp").join(ARCHIVE_DIR))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].starts_with("T01-leaf_work_"));

    let parent_spec = fs::read_to_string(folder(&manager, &f01).join(SPEC_FILE)).unwrap();
    assert!(!parent_spec.contains("T0101"));
}

#[test]
fn test_deleted_ids_are_not_reused() {
    let (_dir, manager) = setup();
    feature(&manager, "One", None);
    let f02 = feature(&manager, "Two", None);
    manager.delete_issue(&f02).unwrap();
    assert_eq!(feature(&manager, "Three", None), "F03");
}

#[test]
fn test_delete_when_folder_is_gone_still_succeeds() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    fs::remove_dir_all(folder(&manager, &f01)).unwrap();
    manager.delete_issue(&f01).unwrap();
    assert!(manager.get_issue(&f01).unwrap().is_none());
}

#[test]
fn test_rename_moves_folder_and_keeps_descendants_resolvable() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "User management", None);
    let f0101 = feature(&manager, "Login flow", Some(&f01));
    let t = task(&manager, "Write form", &f0101);
    let old_root = folder(&manager, &f01);

    let patch = IssuePatch {
        name: Some("Account administration".to_string()),
        ..Default::default()
    };
    let renamed = manager.update_issue(&f01, patch).unwrap();
    assert_eq!(renamed.keywords, "account_administration");

    let new_root = folder(&manager, &f01);
    assert_ne!(new_root, old_root);
    assert!(!old_root.exists());
    assert_eq!(dir_name(&new_root), "F01-account_administration");

    let task_folder = folder(&manager, &t);
    assert!(task_folder.starts_with(&new_root));
    assert!(task_folder.join(SPEC_FILE).exists());

    let spec = fs::read_to_string(new_root.join(SPEC_FILE)).unwrap();
    assert!(spec.starts_with("# Account administration\n"));
}

#[test]
fn test_status_update_preserves_custom_sections() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let spec_path = folder(&manager, &f01).join(SPEC_FILE);

    let custom = "## Design Notes\n\nHand-written prose.\n\n```sh\n## not a heading\n```\n- keep me";
    let mut content = fs::read_to_string(&spec_path).unwrap();
    content.push('\n');
    content.push_str(custom);
    content.push('\n');
    fs::write(&spec_path, &content).unwrap();

    let patch = IssuePatch {
        status: Some(Status::InProgress),
        priority: Some(Priority::High),
        ..Default::default()
    };
    manager.update_issue(&f01, patch).unwrap();

    let updated = fs::read_to_string(&spec_path).unwrap();
    assert!(updated.contains(custom), "custom section lost:\n{}", updated);

    let doc = SpecDocument::parse(&updated);
    let details = &doc.section(DETAILS).unwrap().body;
    assert!(details.contains("- **Status**: in_progress"));
    assert!(details.contains("- **Priority**: high"));
}

#[test]
fn test_description_is_written_and_replaced() {
    let (_dir, manager) = setup();
    let mut request = NewIssue::new(IssueType::Feature, "Root");
    request.description = Some("First draft.".to_string());
    let f01 = manager.create_issue(request).unwrap().id;
    let spec_path = folder(&manager, &f01).join(SPEC_FILE);
    assert!(fs::read_to_string(&spec_path).unwrap().contains("## Description\n\nFirst draft."));

    let patch = IssuePatch {
        description: Some("Second draft.".to_string()),
        ..Default::default()
    };
    manager.update_issue(&f01, patch).unwrap();
    let content = fs::read_to_string(&spec_path).unwrap();
    assert!(content.contains("Second draft."));
    assert!(!content.contains("First draft."));
}

#[test]
fn test_parent_spec_lists_children() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    task(&manager, "Build the parser", &f01);

    let spec = fs::read_to_string(folder(&manager, &f01).join(SPEC_FILE)).unwrap();
    assert!(spec.contains("## Children"));
    assert!(spec.contains("- [T0101: Build the parser](T01-build_parser/spec.md)"));
}

#[test]
fn test_reparent_moves_folder_and_children_lists() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Source", None);
    let f02 = feature(&manager, "Destination", None);
    let t = task(&manager, "Movable", &f01);
    let sub = task(&manager, "Nested", &t);

    let patch = IssuePatch {
        parent_id: Some(f02.clone()),
        ..Default::default()
    };
    let moved = manager.update_issue(&t, patch).unwrap();
    assert_eq!(moved.id, t);
    assert_eq!(moved.parent_id.as_deref(), Some(f02.as_str()));

    assert!(manager.get_issue(&f01).unwrap().unwrap().children.is_empty());
    assert_eq!(manager.get_issue(&f02).unwrap().unwrap().children, vec![t.clone()]);

    let task_folder = folder(&manager, &t);
    assert!(task_folder.starts_with(folder(&manager, &f02)));
    assert!(folder(&manager, &sub).starts_with(&task_folder));

    let old_parent_spec = fs::read_to_string(folder(&manager, &f01).join(SPEC_FILE)).unwrap();
    assert!(!old_parent_spec.contains("Movable"));
    let new_parent_spec = fs::read_to_string(folder(&manager, &f02).join(SPEC_FILE)).unwrap();
    assert!(new_parent_spec.contains("Movable"));
}

#[test]
fn test_sibling_created_after_a_move_gets_its_own_folder() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Alpha", None);
    let f02 = feature(&manager, "Beta", None);
    let moved = task(&manager, "Moved task", &f01);
    let patch = IssuePatch {
        parent_id: Some(f02.clone()),
        ..Default::default()
    };
    manager.update_issue(&moved, patch).unwrap();

    let fresh = task(&manager, "Fresh task", &f02);
    assert_eq!(fresh, "T0202");

    let moved_folder = folder(&manager, &moved);
    let fresh_folder = folder(&manager, &fresh);
    assert_ne!(moved_folder, fresh_folder);
    assert!(dir_name(&moved_folder).starts_with("T01-"));
    assert!(dir_name(&fresh_folder).starts_with("T02-"));
    assert!(fs::read_to_string(moved_folder.join(SPEC_FILE))
        .unwrap()
        .contains("Moved task"));
    assert!(fs::read_to_string(fresh_folder.join(SPEC_FILE))
        .unwrap()
        .contains("Fresh task"));
}

#[test]
fn test_moved_feature_subtree_keeps_the_depth_limit() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Outer", None);
    let f0101 = feature(&manager, "Inner", Some(&f01));
    let f02 = feature(&manager, "Host", None);
    let patch = IssuePatch {
        parent_id: Some(f02.clone()),
        ..Default::default()
    };
    manager.update_issue(&f01, patch).unwrap();
    assert!(folder(&manager, &f0101).starts_with(folder(&manager, &f02)));

    let err = manager
        .create_issue(NewIssue::new(IssueType::Feature, "Too deep").with_parent(&f0101))
        .unwrap_err();
    assert!(matches!(err, Error::HierarchyViolation(_)));
    assert_eq!(task(&manager, "Still fine", &f0101), "T010101");
}

#[test]
fn test_reparent_rejects_cycles() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Task", &f01);
    let sub = task(&manager, "Sub", &t);

    let patch = IssuePatch {
        parent_id: Some(sub),
        ..Default::default()
    };
    let err = manager.update_issue(&t, patch).unwrap_err();
    assert!(matches!(err, Error::HierarchyViolation(_)));
}

#[test]
fn test_activating_a_sprint_completes_the_active_one() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let a = task(&manager, "A", &f01);
    let b = task(&manager, "B", &f01);
    let c = task(&manager, "C", &f01);

    let s01 = manager.create_sprint(NewSprint::named("First")).unwrap();
    let s02 = manager.create_sprint(NewSprint::named("Second")).unwrap();
    assert_eq!((s01.id.as_str(), s02.id.as_str()), ("S01", "S02"));

    manager.assign_issue_to_sprint(&a, &s01.id).unwrap();
    manager.assign_issue_to_sprint(&b, &s01.id).unwrap();
    manager.assign_issue_to_sprint(&c, &s02.id).unwrap();
    manager.activate_sprint(&s01.id).unwrap();
    set_status(&manager, &a, Status::Done);

    let active = manager.activate_sprint(&s02.id).unwrap();
    assert_eq!(active.status, SprintStatus::Active);

    let sprints = manager.list_sprints().unwrap();
    let actives: Vec<&str> = sprints
        .iter()
        .filter(|s| s.status == SprintStatus::Active)
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(actives, vec!["S02"]);

    let first = manager.get_sprint("s01").unwrap().unwrap();
    assert_eq!(first.status, SprintStatus::Completed);
    assert_eq!(first.velocity, 1);
    assert!(first.end_date.is_some());

    let member = manager.get_issue(&c).unwrap().unwrap();
    assert_eq!(member.status, Status::InProgress);
    assert_eq!(manager.get_active_sprint().unwrap().unwrap().id, "S02");
}

#[test]
fn test_sprint_state_machine_has_no_skips_or_back_edges() {
    let (_dir, manager) = setup();
    let sprint = manager.create_sprint(NewSprint::named("Only")).unwrap();

    let err = manager.complete_sprint(&sprint.id).unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    let err = manager.archive_sprint(&sprint.id).unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    manager.activate_sprint(&sprint.id).unwrap();
    let completed = manager.complete_sprint(&sprint.id).unwrap();
    assert_eq!(completed.status, SprintStatus::Completed);

    let err = manager.activate_sprint(&sprint.id).unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let archived = manager.archive_sprint(&sprint.id).unwrap();
    assert_eq!(archived.status, SprintStatus::Archived);
    assert!(manager.get_active_sprint().unwrap().is_none());
}

#[test]
fn test_closed_sprints_reject_new_members() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let sprint = manager.create_sprint(NewSprint::named("Done soon")).unwrap();
    manager.activate_sprint(&sprint.id).unwrap();
    manager.complete_sprint(&sprint.id).unwrap();

    let err = manager.assign_issue_to_sprint(&f01, &sprint.id).unwrap_err();
    assert!(matches!(err, Error::SprintClosed { .. }));
}

#[test]
fn test_sprint_end_before_start_is_rejected() {
    let (_dir, manager) = setup();
    let request = NewSprint {
        name: "Backwards".to_string(),
        start_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 10),
        end_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1),
    };
    let err = manager.create_sprint(request).unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
}

#[test]
fn test_hierarchical_list_keeps_root_and_walks_through_non_matches() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let f0101 = feature(&manager, "Middle", Some(&f01));
    let deep = task(&manager, "Deep", &f0101);
    let other = task(&manager, "Other", &f01);
    set_status(&manager, &deep, Status::Done);

    let filter = IssueFilter {
        status: Some(Status::Done),
        ..Default::default()
    };
    let entries = manager.list_issues_hierarchical(Some("f01"), &filter).unwrap();
    let listed: Vec<(&str, usize, bool)> = entries
        .iter()
        .map(|e| (e.issue.id.as_str(), e.depth, e.matched))
        .collect();
    assert_eq!(listed, vec![(f01.as_str(), 0, false), (deep.as_str(), 2, true)]);
    assert!(!entries.iter().any(|e| e.issue.id == other || e.issue.id == f0101));
}

#[test]
fn test_hierarchical_list_is_depth_first_in_id_order() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "One", None);
    let f02 = feature(&manager, "Two", None);
    let f0101 = feature(&manager, "One one", Some(&f01));
    let t0101 = task(&manager, "Task", &f01);
    let t010101 = task(&manager, "Inner", &f0101);

    let entries = manager
        .list_issues_hierarchical(None, &IssueFilter::default())
        .unwrap();
    let order: Vec<&str> = entries.iter().map(|e| e.issue.id.as_str()).collect();
    assert_eq!(
        order,
        vec![
            f01.as_str(),
            f0101.as_str(),
            t010101.as_str(),
            t0101.as_str(),
            f02.as_str()
        ]
    );
}

#[test]
fn test_flat_list_filters() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let mut request = NewIssue::new(IssueType::Bug, "Crash").with_parent(&f01);
    request.assignee = Some("sam".to_string());
    request.labels = ["urgent".to_string()].into_iter().collect();
    let bug = manager.create_issue(request).unwrap();
    task(&manager, "Quiet", &f01);

    let by_type = IssueFilter {
        issue_type: Some(IssueType::Bug),
        ..Default::default()
    };
    let by_assignee = IssueFilter {
        assignee: Some("sam".to_string()),
        ..Default::default()
    };
    let by_label = IssueFilter {
        labels: ["urgent".to_string()].into_iter().collect(),
        ..Default::default()
    };
    let by_parent = IssueFilter {
        parent_id: Some("f01".to_string()),
        ..Default::default()
    };
    for filter in [by_type, by_assignee, by_label] {
        let ids: Vec<String> = manager
            .list_issues(&filter)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![bug.id.clone()]);
    }
    assert_eq!(manager.list_issues(&by_parent).unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn test_assigning_twice_is_idempotent() {
    let (dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Sprint work", &f01);
    let sprint = manager.create_sprint(NewSprint::named("One")).unwrap();

    manager.assign_issue_to_sprint(&t, &sprint.id).unwrap();
    manager.assign_issue_to_sprint(&t, &sprint.id).unwrap();

    let sprint = manager.get_sprint(&sprint.id).unwrap().unwrap();
    assert_eq!(sprint.issues, vec![t.clone()]);

    let links = manager.folders().sprint_links(&sprint.id);
    assert_eq!(links.len(), 1);
    let (link, target) = &links[0];
    assert_eq!(dir_name(link), "T0101-sprint_work");
    assert_eq!(
        target.as_deref(),
        Some(fs::canonicalize(folder(&manager, &t)).unwrap().as_path())
    );

    let spec = fs::read_to_string(dir.path().join(".ppp/S01").join(SPEC_FILE)).unwrap();
    assert!(spec.starts_with("# Sprint S01: One"));
    assert!(spec.contains("- [ ] [T0101-sprint_work](T0101-sprint_work/spec.md)"));
}

#[cfg(unix)]
#[test]
fn test_assigning_to_another_sprint_moves_the_link() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Hop", &f01);
    let s01 = manager.create_sprint(NewSprint::named("One")).unwrap();
    let s02 = manager.create_sprint(NewSprint::named("Two")).unwrap();

    manager.assign_issue_to_sprint(&t, &s01.id).unwrap();
    manager.assign_issue_to_sprint(&t, &s02.id).unwrap();

    assert!(manager.get_sprint(&s01.id).unwrap().unwrap().issues.is_empty());
    assert_eq!(manager.get_sprint(&s02.id).unwrap().unwrap().issues, vec![t.clone()]);
    assert_eq!(manager.get_issue(&t).unwrap().unwrap().sprint_id.as_deref(), Some("S02"));
    assert!(manager.folders().sprint_links(&s01.id).is_empty());
    assert_eq!(manager.folders().sprint_links(&s02.id).len(), 1);
}

#[cfg(unix)]
#[test]
fn test_sprint_links_follow_renamed_folders() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Old name", &f01);
    let sprint = manager.create_sprint(NewSprint::named("One")).unwrap();
    manager.assign_issue_to_sprint(&t, &sprint.id).unwrap();

    let patch = IssuePatch {
        name: Some("Fresh title".to_string()),
        ..Default::default()
    };
    manager.update_issue(&f01, patch.clone()).unwrap();
    manager.update_issue(&t, patch).unwrap();

    let links = manager.folders().sprint_links(&sprint.id);
    assert_eq!(links.len(), 1);
    let expected = fs::canonicalize(folder(&manager, &t)).unwrap();
    assert_eq!(links[0].1.as_deref(), Some(expected.as_path()));
}

#[cfg(unix)]
#[test]
fn test_remove_from_sprint() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Leaving", &f01);
    let sprint = manager.create_sprint(NewSprint::named("One")).unwrap();
    manager.assign_issue_to_sprint(&t, &sprint.id).unwrap();

    assert!(manager.remove_issue_from_sprint(&t, &sprint.id).unwrap());
    assert!(!manager.remove_issue_from_sprint(&t, &sprint.id).unwrap());
    assert!(manager.get_issue(&t).unwrap().unwrap().sprint_id.is_none());
    assert!(manager.folders().sprint_links(&sprint.id).is_empty());
}

#[test]
fn test_delete_sprint_clears_members_and_release_row() {
    let (dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let sprint = manager.create_sprint(NewSprint::named("Doomed")).unwrap();
    manager.assign_issue_to_sprint(&f01, &sprint.id).unwrap();

    let release_path = dir.path().join(".ppp").join(RELEASE_FILE);
    assert!(fs::read_to_string(&release_path).unwrap().contains("| S01 | Doomed | planned |"));

    manager.delete_sprint(&sprint.id).unwrap();
    assert!(manager.get_sprint(&sprint.id).unwrap().is_none());
    assert!(manager.get_issue(&f01).unwrap().unwrap().sprint_id.is_none());
    assert!(!fs::read_to_string(&release_path).unwrap().contains("| S01 |"));
    assert!(!manager.folders().sprint_dir(&sprint.id).exists());

    let err = manager.delete_sprint(&sprint.id).unwrap_err();
    assert!(matches!(err, Error::SprintNotFound { .. }));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_release_rows_track_sprint_status() {
    let (dir, manager) = setup();
    let sprint = manager.create_sprint(NewSprint::named("Tracked")).unwrap();
    manager.activate_sprint(&sprint.id).unwrap();

    let release = fs::read_to_string(dir.path().join(".ppp").join(RELEASE_FILE)).unwrap();
    assert!(release.contains("| Sprint | Name | Status | Start | End | Issues | Velocity |"));
    assert!(release.contains("| S01 | Tracked | active |"));
    assert_eq!(release.matches("| S01 |").count(), 1);
}

#[test]
fn test_repair_rebuilds_missing_folders() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Lost folder", &f01);
    let root = folder(&manager, &f01);
    fs::remove_dir_all(&root).unwrap();
    assert!(manager.issue_folder(&t).unwrap().is_none());

    let report = manager.repair().unwrap();
    assert_eq!(report.folders, 2);
    assert_eq!(report.specs_created, 2);
    assert!(report.skipped.is_empty());
    assert!(folder(&manager, &t).join(SPEC_FILE).exists());

    let again = manager.repair().unwrap();
    assert_eq!(again.folders, 0);
    assert_eq!(again.specs_created, 0);
    assert_eq!(again.specs_updated, 2);
}

#[test]
fn test_config_defaults_apply_to_new_issues() {
    let dir = TempDir::new().unwrap();
    let ppp_dir = dir.path().join(".ppp");
    HybridManager::init(&ppp_dir, "demo").unwrap();
    fs::write(
        ppp_dir.join("config.yaml"),
        "default-reporter: robin\ndefault-priority: low\n",
    )
    .unwrap();

    let manager = HybridManager::open(&ppp_dir).unwrap();
    let issue = manager
        .create_issue(NewIssue::new(IssueType::Feature, "Configured"))
        .unwrap();
    assert_eq!(issue.reporter, "robin");
    assert_eq!(issue.priority, Priority::Low);

    let mut request = NewIssue::new(IssueType::Feature, "Explicit");
    request.priority = Some(Priority::High);
    assert_eq!(manager.create_issue(request).unwrap().priority, Priority::High);
}

struct FailingKeywords;

impl KeywordGenerator for FailingKeywords {
    fn generate(&self, _name: &str) -> anyhow::Result<String> {
        anyhow::bail!("generator offline")
    }
}

#[test]
fn test_failing_keyword_generator_falls_back_to_heuristic() {
    let dir = TempDir::new().unwrap();
    let manager = HybridManager::init(dir.path().join(".ppp"), "demo")
        .unwrap()
        .with_keyword_generator(Box::new(FailingKeywords));
    let issue = manager
        .create_issue(NewIssue::new(IssueType::Feature, "The payment gateway"))
        .unwrap();
    assert_eq!(issue.keywords, "payment_gateway");
}

#[test]
fn test_status_counts() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let t = task(&manager, "Task", &f01);
    set_status(&manager, &t, Status::Done);
    let sprint = manager.create_sprint(NewSprint::named("Now")).unwrap();
    manager.activate_sprint(&sprint.id).unwrap();

    let status = manager.status().unwrap();
    assert_eq!(status.project, "demo");
    assert_eq!(status.total_issues, 2);
    assert!(status.by_status.contains(&("done".to_string(), 1)));
    assert!(status.by_type.contains(&("feature".to_string(), 1)));
    assert_eq!(status.active_sprint.as_deref(), Some("S01"));
}

#[test]
fn test_feature_bill_tracks_features() {
    let (_dir, manager) = setup();
    let f01 = feature(&manager, "Root", None);
    let f0101 = feature(&manager, "Child", Some(&f01));
    task(&manager, "Not a feature", &f01);

    let bill = manager.feature_bill().unwrap();
    let ids: Vec<&str> = bill.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![f01.as_str(), f0101.as_str()]);
    assert_eq!(bill[1].level, 2);
    assert_eq!(bill[1].parent_id.as_deref(), Some(f01.as_str()));

    manager.delete_issue(&f0101).unwrap();
    assert_eq!(manager.feature_bill().unwrap().len(), 1);
}
