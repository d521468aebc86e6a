use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ppp::format::{SpecDocument, DESCRIPTION, SPEC_FILE};
use ppp::manager::{HybridManager, PPP_DIR};
use ppp::types::{IssueFilter, IssuePatch, IssueType, NewIssue, NewSprint, Priority, Status};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

// Build-time information generated by build.rs
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Parser)]
#[command(name = "ppp", about = "ppp - A hierarchical backlog kept next to your code", version)]
struct Cli {
    /// Path to the .ppp directory (supports PPP_DIR env var)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Output JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable logging output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable command logging to .ppp/command_history.log
    #[arg(long, global = true)]
    no_cmd_logging: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a project in the current directory
    Init {
        /// Project name (defaults to the current directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Create a new feature, story, task or bug
    Create {
        /// Issue type (feature, story, task, bug)
        issue_type: IssueType,

        /// Issue name
        name: String,

        /// Parent issue id
        #[arg(long)]
        parent: Option<String>,

        /// Priority (high, medium, low)
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Assignee
        #[arg(long)]
        assignee: Option<String>,

        /// Reporter
        #[arg(long)]
        reporter: Option<String>,

        /// Label (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Description written into the spec file
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Update an issue
    Update {
        /// Issue id
        issue_id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New status (new, in_progress, done, blocked, cancelled)
        #[arg(short, long)]
        status: Option<Status>,

        /// New priority
        #[arg(short, long)]
        priority: Option<Priority>,

        /// New assignee
        #[arg(long)]
        assignee: Option<String>,

        /// New reporter
        #[arg(long)]
        reporter: Option<String>,

        /// Replace the labels (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// Move the issue under a new parent
        #[arg(long)]
        parent: Option<String>,
    },

    /// Delete an issue and archive its folder
    Delete {
        /// Issue id
        issue_id: String,
    },

    /// Show issue details
    Show {
        /// Issue id
        issue_id: String,
    },

    /// List issues
    List {
        /// Show the parent/child tree
        #[arg(long)]
        tree: bool,

        /// Root of the tree (implies --tree)
        #[arg(long)]
        root: Option<String>,

        /// Filter by parent id
        #[arg(long)]
        parent: Option<String>,

        /// Filter by type
        #[arg(short = 't', long = "type")]
        issue_type: Option<IssueType>,

        /// Filter by status
        #[arg(short, long)]
        status: Option<Status>,

        /// Filter by assignee
        #[arg(short, long)]
        assignee: Option<String>,

        /// Filter by label (repeatable, all must match)
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Filter by sprint id
        #[arg(long)]
        sprint: Option<String>,
    },

    /// Sprint management
    Sprint {
        #[command(subcommand)]
        command: SprintCommands,
    },

    /// Show the feature bill
    Bill,

    /// Rebuild folders, spec files and sprint links from metadata
    Repair,

    /// Show project status
    Status,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SprintCommands {
    /// Create a planned sprint
    Create {
        /// Sprint name
        name: String,

        /// Start date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Activate a planned sprint
    Activate {
        /// Sprint id
        sprint_id: String,
    },

    /// Complete an active sprint
    Complete {
        /// Sprint id
        sprint_id: String,
    },

    /// Archive a completed sprint
    Archive {
        /// Sprint id
        sprint_id: String,
    },

    /// Delete a sprint and archive its folder
    Delete {
        /// Sprint id
        sprint_id: String,
    },

    /// Assign an issue to a sprint
    Assign {
        /// Issue id
        issue_id: String,

        /// Sprint id
        sprint_id: String,
    },

    /// Remove an issue from a sprint
    Remove {
        /// Issue id
        issue_id: String,

        /// Sprint id
        sprint_id: String,
    },

    /// List sprints
    List,

    /// Show sprint details
    Show {
        /// Sprint id
        sprint_id: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<ppp::Error>())
                .map_or(1, ppp::Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // RUST_LOG wins over -v
    let filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn labels(values: &[String]) -> BTreeSet<String> {
    values.iter().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    if let Commands::Init { name } = &cli.command {
        let ppp_dir = match &cli.dir {
            Some(dir) => dir.clone(),
            None => env::current_dir()?.join(PPP_DIR),
        };
        let project = match name {
            Some(name) => name.clone(),
            None => default_project_name(&ppp_dir)?,
        };
        let manager = HybridManager::init(&ppp_dir, &project)
            .with_context(|| format!("Failed to initialize {}", ppp_dir.display()))?;
        if !cli.no_cmd_logging {
            let _ = log_command(manager.ppp_dir(), &env::args().collect::<Vec<_>>());
        }
        if cli.json {
            print_json(&serde_json::json!({ "project": project, "path": ppp_dir }))?;
        } else {
            println!("Initialized ppp project '{}' in {}", project, ppp_dir.display());
        }
        return Ok(());
    }

    if let Commands::Version = &cli.command {
        print_version(cli.json)?;
        return Ok(());
    }

    let manager = get_manager(&cli.dir)?;

    // Log command after the project is validated
    if !cli.no_cmd_logging {
        let _ = log_command(manager.ppp_dir(), &env::args().collect::<Vec<_>>());
    }

    match &cli.command {
        Commands::Init { .. } | Commands::Version => Ok(()),

        Commands::Create {
            issue_type,
            name,
            parent,
            priority,
            assignee,
            reporter,
            labels: label_args,
            description,
        } => {
            let request = NewIssue {
                issue_type: *issue_type,
                name: name.clone(),
                parent_id: parent.clone(),
                priority: *priority,
                assignee: assignee.clone(),
                reporter: reporter.clone(),
                labels: labels(label_args),
                description: description.clone(),
            };
            let issue = manager.create_issue(request)?;

            if cli.json {
                print_json(&issue)?;
            } else {
                println!("Created {}: {} ({})", issue.issue_type, issue.id, issue.name);
            }
            Ok(())
        }

        Commands::Update {
            issue_id,
            name,
            status,
            priority,
            assignee,
            reporter,
            labels: label_args,
            description,
            parent,
        } => {
            let patch = IssuePatch {
                name: name.clone(),
                status: *status,
                priority: *priority,
                assignee: assignee.clone(),
                reporter: reporter.clone(),
                labels: (!label_args.is_empty()).then(|| labels(label_args)),
                description: description.clone(),
                parent_id: parent.clone(),
            };
            let issue = manager.update_issue(issue_id, patch)?;

            if cli.json {
                print_json(&issue)?;
            } else {
                println!("Updated issue: {}", issue.id);
            }
            Ok(())
        }

        Commands::Delete { issue_id } => {
            let issue = manager.delete_issue(issue_id)?;
            if cli.json {
                print_json(&issue)?;
            } else {
                println!("Deleted issue: {}", issue.id);
            }
            Ok(())
        }

        Commands::Show { issue_id } => {
            let issue = manager
                .get_issue(issue_id)?
                .ok_or_else(|| ppp::Error::IssueNotFound { id: issue_id.clone() })?;
            let folder = manager.issue_folder(&issue.id)?;

            if cli.json {
                print_json(&serde_json::json!({ "issue": issue, "folder": folder }))?;
                return Ok(());
            }

            println!("ID: {}", issue.id);
            println!("Name: {}", issue.name);
            println!("Type: {}", issue.issue_type);
            println!("Status: {}", issue.status);
            println!("Priority: {}", issue.priority);
            if !issue.assignee.is_empty() {
                println!("Assignee: {}", issue.assignee);
            }
            if !issue.reporter.is_empty() {
                println!("Reporter: {}", issue.reporter);
            }
            if !issue.labels.is_empty() {
                let labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
                println!("Labels: {}", labels.join(", "));
            }
            if let Some(parent) = &issue.parent_id {
                println!("Parent: {}", parent);
            }
            if let Some(sprint) = &issue.sprint_id {
                println!("Sprint: {}", sprint);
            }
            if !issue.children.is_empty() {
                println!("Children: {}", issue.children.join(", "));
            }
            match &folder {
                Some(folder) => {
                    println!("Folder: {}", folder.display());
                    if let Ok(content) = fs::read_to_string(folder.join(SPEC_FILE)) {
                        let doc = SpecDocument::parse(&content);
                        if let Some(section) = doc.section(DESCRIPTION) {
                            println!("\nDescription:\n{}", section.body.trim());
                        }
                    }
                }
                None => println!("Folder: (not found)"),
            }
            Ok(())
        }

        Commands::List {
            tree,
            root,
            parent,
            issue_type,
            status,
            assignee,
            labels: label_args,
            sprint,
        } => {
            let filter = IssueFilter {
                parent_id: parent.clone(),
                issue_type: *issue_type,
                status: *status,
                assignee: assignee.clone(),
                labels: labels(label_args),
                sprint_id: sprint.clone(),
            };

            if *tree || root.is_some() {
                let entries = manager.list_issues_hierarchical(root.as_deref(), &filter)?;
                if cli.json {
                    print_json(&entries)?;
                } else {
                    for entry in entries {
                        let marker = if entry.matched { "" } else { " (context)" };
                        println!(
                            "{}{}: {} [{}]{}",
                            "  ".repeat(entry.depth),
                            entry.issue.id,
                            entry.issue.name,
                            entry.issue.status,
                            marker
                        );
                    }
                }
                return Ok(());
            }

            let issues = manager.list_issues(&filter)?;
            if cli.json {
                print_json(&issues)?;
            } else {
                for issue in issues {
                    println!(
                        "{}: {} [{}] (priority: {})",
                        issue.id, issue.name, issue.status, issue.priority
                    );
                }
            }
            Ok(())
        }

        Commands::Sprint { command } => run_sprint(&manager, command, cli.json),

        Commands::Bill => {
            let bill = manager.feature_bill()?;
            if cli.json {
                print_json(&bill)?;
            } else {
                for entry in bill {
                    println!(
                        "{}{}: {} [{}] {}",
                        "  ".repeat(entry.level.saturating_sub(1)),
                        entry.id,
                        entry.name,
                        entry.status,
                        entry.keywords
                    );
                }
            }
            Ok(())
        }

        Commands::Repair => {
            let report = manager.repair()?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("Folders reconciled: {}", report.folders);
                println!("Spec files created: {}", report.specs_created);
                println!("Spec files updated: {}", report.specs_updated);
                println!("Sprints synced: {}", report.sprints);
                if !report.skipped.is_empty() {
                    println!("Skipped: {}", report.skipped.join(", "));
                }
            }
            Ok(())
        }

        Commands::Status => {
            let status = manager.status()?;
            if cli.json {
                print_json(&status)?;
            } else {
                println!("Project: {}", status.project);
                println!("Total issues: {}", status.total_issues);
                for (name, count) in &status.by_status {
                    println!("  {}: {}", name, count);
                }
                for (name, count) in &status.by_type {
                    println!("  {}: {}", name, count);
                }
                println!("Sprints: {}", status.sprints);
                println!(
                    "Active sprint: {}",
                    status.active_sprint.as_deref().unwrap_or("none")
                );
            }
            Ok(())
        }
    }
}

fn run_sprint(manager: &HybridManager, command: &SprintCommands, json: bool) -> Result<()> {
    let report = |sprint: &ppp::types::Sprint, verb: &str| -> Result<()> {
        if json {
            print_json(sprint)
        } else {
            println!("{} sprint: {} ({})", verb, sprint.id, sprint.name);
            Ok(())
        }
    };

    match command {
        SprintCommands::Create { name, start, end } => {
            let sprint = manager.create_sprint(NewSprint {
                name: name.clone(),
                start_date: *start,
                end_date: *end,
            })?;
            report(&sprint, "Created")
        }
        SprintCommands::Activate { sprint_id } => {
            report(&manager.activate_sprint(sprint_id)?, "Activated")
        }
        SprintCommands::Complete { sprint_id } => {
            report(&manager.complete_sprint(sprint_id)?, "Completed")
        }
        SprintCommands::Archive { sprint_id } => {
            report(&manager.archive_sprint(sprint_id)?, "Archived")
        }
        SprintCommands::Delete { sprint_id } => {
            report(&manager.delete_sprint(sprint_id)?, "Deleted")
        }
        SprintCommands::Assign {
            issue_id,
            sprint_id,
        } => {
            let sprint = manager.assign_issue_to_sprint(issue_id, sprint_id)?;
            if json {
                print_json(&sprint)
            } else {
                println!("Assigned {} to sprint {}", issue_id, sprint.id);
                Ok(())
            }
        }
        SprintCommands::Remove {
            issue_id,
            sprint_id,
        } => {
            let removed = manager.remove_issue_from_sprint(issue_id, sprint_id)?;
            if json {
                print_json(&serde_json::json!({ "removed": removed }))
            } else {
                if removed {
                    println!("Removed {} from sprint {}", issue_id, sprint_id);
                } else {
                    println!("{} was not in sprint {}", issue_id, sprint_id);
                }
                Ok(())
            }
        }
        SprintCommands::List => {
            let sprints = manager.list_sprints()?;
            if json {
                print_json(&sprints)
            } else {
                for sprint in sprints {
                    println!(
                        "{}: {} [{}] ({} issues)",
                        sprint.id,
                        sprint.name,
                        sprint.status,
                        sprint.issues.len()
                    );
                }
                Ok(())
            }
        }
        SprintCommands::Show { sprint_id } => {
            let sprint = manager
                .get_sprint(sprint_id)?
                .ok_or_else(|| ppp::Error::SprintNotFound { id: sprint_id.clone() })?;
            if json {
                return print_json(&sprint);
            }
            println!("ID: {}", sprint.id);
            println!("Name: {}", sprint.name);
            println!("Status: {}", sprint.status);
            println!("Start: {}", sprint.start_date);
            if let Some(end) = sprint.end_date {
                println!("End: {}", end);
            }
            println!("Velocity: {}", sprint.velocity);
            if !sprint.issues.is_empty() {
                println!("\nIssues:");
                for id in &sprint.issues {
                    match manager.get_issue(id)? {
                        Some(issue) => println!("  {}: {} [{}]", issue.id, issue.name, issue.status),
                        None => println!("  {} (not found)", id),
                    }
                }
            }
            Ok(())
        }
    }
}

fn print_version(json: bool) -> Result<()> {
    let hash = built_info::GIT_COMMIT_HASH_SHORT.unwrap_or("unknown");
    let dirty = if built_info::GIT_DIRTY == Some(true) { "-dirty" } else { "" };
    let build_date = env!("BUILD_DATE");

    if json {
        print_json(&serde_json::json!({
            "version": built_info::PKG_VERSION,
            "commit": format!("{}{}", hash, dirty),
            "build_date": build_date,
        }))
    } else {
        println!(
            "ppp version {} ({}{}, built {})",
            built_info::PKG_VERSION,
            hash,
            dirty,
            build_date
        );
        Ok(())
    }
}

fn get_manager(dir_arg: &Option<PathBuf>) -> Result<HybridManager> {
    let ppp_dir = if let Some(dir) = dir_arg {
        dir.clone()
    } else if let Ok(dir) = env::var("PPP_DIR") {
        PathBuf::from(dir)
    } else {
        find_ppp_dir()?
    };

    HybridManager::open(&ppp_dir).context("Failed to open project")
}

fn find_ppp_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let ppp_dir = current.join(PPP_DIR);
        if ppp_dir.is_dir() {
            return Ok(ppp_dir);
        }

        if !current.pop() {
            anyhow::bail!("No {} directory found. Run 'ppp init' to create one.", PPP_DIR);
        }
    }
}

fn default_project_name(ppp_dir: &Path) -> Result<String> {
    let project_root = match ppp_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => env::current_dir()?,
    };
    let root = fs::canonicalize(&project_root).unwrap_or(project_root);
    Ok(root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string()))
}

/// Log command to command_history.log
fn log_command(ppp_dir: &Path, args: &[String]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let log_path = ppp_dir.join(ppp::config::HISTORY_FILE);
    let timestamp = chrono::Utc::now().to_rfc3339();

    // Skip the binary path
    let command_line = if args.len() > 1 {
        args[1..].join(" ")
    } else {
        String::new()
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open command history log")?;

    writeln!(file, "{} {}", timestamp, command_line)
        .context("Failed to write to command history log")?;

    Ok(())
}
