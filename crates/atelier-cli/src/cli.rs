//! CLI definition and command dispatch for Atelier.
//!
//! This module defines the command-line interface using `clap` and provides
//! the `run()` function that dispatches commands to the engine.
//!
//! ## Configuration Precedence
//!
//! Configuration is resolved with the following precedence (highest to lowest):
//! 1. CLI flags (`--root`, `--config`, `--verbose`)
//! 2. Environment variables (`ATELIER_ROOT`, `ATELIER_CONFIG`, `ATELIER_VERBOSE`)
//! 3. Config file (`~/.atelier/config.yaml` or path from `--config`/`ATELIER_CONFIG`)
//! 4. Built-in defaults
//!
//! ## Exit Codes
//!
//! `0` success, `1` engine or I/O failure, `2` rejected request (usage,
//! unknown or read-only attribute, missing attribute), `3` not found.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::ui::table::{self, CommitRow, ProjectRow};
use crate::ui::{ColorMode, MessageType, Style};

use atelier_core::project::PROJECTS_TYPE;
use atelier_core::{
    AtelierError, Attributes, Commit, ErrorKind, GlobalConfig, NewCommit, Project, ProjectEngine,
    ProjectId, ProjectPatch,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Atelier – versioned project workspaces
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "ATELIER_VERBOSE")]
    pub verbose: bool,

    /// Projects directory (default: ~/.atelier/projects)
    #[arg(long, global = true, env = "ATELIER_ROOT")]
    pub root: Option<PathBuf>,

    /// Path to configuration file (default: ~/.atelier/config.yaml)
    #[arg(long, global = true, env = "ATELIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Color output mode
    #[arg(long, global = true, env = "ATELIER_COLOR", value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a project with an initial commit
    #[command(after_help = r#"EXAMPLES:
    # Create a project
    atelier new "Churn model"

    # Capture the new project's ID
    atelier new demo --json | jq -r .id
"#)]
    New {
        /// Display name
        name: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List all projects
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one project
    Show {
        /// Project ID
        id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Change a project's display name
    Rename {
        /// Project ID
        id: String,

        /// New display name
        name: String,
    },

    /// Update project attributes from a JSON object
    #[command(after_help = r#"EXAMPLES:
    # Replace the canvas document
    atelier set <ID> '{"canvas": {"nodes": []}}'

    # Read attributes from a file
    atelier set <ID> @patch.json

    # Rename and go back to a past commit in one step
    atelier set <ID> '{"name": "v1 review", "current_commit": "4f2a9c1"}'

Writable attributes: name, canvas, workflow, current_commit.
"#)]
    Set {
        /// Project ID
        id: String,

        /// JSON object of attributes, or @FILE
        attributes: String,
    },

    /// Commit every change in the project
    #[command(after_help = r#"EXAMPLES:
    # Commit with the default message and identity
    atelier commit <ID>

    # Commit with a message and author
    atelier commit <ID> -m "Add cleaning step" --author "Ada" --email ada@example.com
"#)]
    Commit {
        /// Project ID
        id: String,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,

        /// Author name
        #[arg(long)]
        author: Option<String>,

        /// Author email
        #[arg(long)]
        email: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Discard changes and move the project to a commit
    #[command(after_help = r#"EXAMPLES:
    # Look at an old commit
    atelier checkout <ID> 4f2a9c1

    # Return to the latest commit
    atelier checkout <ID> main
"#)]
    Checkout {
        /// Project ID
        id: String,

        /// Commit sha (full or abbreviated) or branch name
        reference: String,
    },

    /// Show commit history, newest first
    Log {
        /// Project ID
        id: String,

        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Start walking from this ref instead of the latest commit
        #[arg(long)]
        from: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the working-tree state of a project
    Status {
        /// Project ID
        id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete a project and its history
    #[command(name = "rm")]
    Rm {
        /// Project ID
        id: String,
    },
}

// ============================================================================
// Run function
// ============================================================================

/// Run the CLI application.
///
/// Parses command-line arguments, creates a `ProjectEngine`, and dispatches
/// to the appropriate command handler.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays machine-readable.
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let filter = format!("atelier_core={},atelier_cli={}", log_level, log_level);
    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let style = Style::new(cli.color);

    let engine = match build_engine(&cli) {
        Ok(engine) => engine,
        Err(e) => {
            let hint = if let Some(path) = &cli.config {
                format!("Check your config at {}", path.display())
            } else {
                "Check your global config at ~/.atelier/config.yaml".to_string()
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to initialize Atelier engine",
                    Some(&e.to_string()),
                    Some(&hint),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(projects_dir = %engine.projects_dir().display(), "Dispatching {:?}", cli.command);

    let result = match cli.command {
        Command::New { name, json } => handle_new(&style, &engine, &name, json),
        Command::List { json } => handle_list(&style, &engine, json),
        Command::Show { id, json } => handle_show(&style, &engine, &id, json),
        Command::Rename { id, name } => handle_rename(&style, &engine, &id, &name),
        Command::Set { id, attributes } => handle_set(&style, &engine, &id, &attributes),
        Command::Commit {
            id,
            message,
            author,
            email,
            json,
        } => handle_commit(&style, &engine, &id, message, author, email, json),
        Command::Checkout { id, reference } => handle_checkout(&style, &engine, &id, &reference),
        Command::Log {
            id,
            limit,
            from,
            json,
        } => handle_log(&style, &engine, &id, limit, from, json),
        Command::Status { id, json } => handle_status(&style, &engine, &id, json),
        Command::Rm { id } => handle_rm(&style, &engine, &id),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let hint = match e.kind() {
                ErrorKind::NotFound => Some("Run `atelier list` to see project IDs"),
                ErrorKind::Forbidden | ErrorKind::Conflict => {
                    Some("Writable attributes: name, canvas, workflow, current_commit")
                }
                _ => None,
            };
            eprintln!("{}", style.error_with_context(&e.to_string(), None, hint));
            ExitCode::from(exit_code(e.kind()))
        }
    }
}

fn build_engine(cli: &Cli) -> Result<ProjectEngine, AtelierError> {
    let mut config = match &cli.config {
        Some(path) => GlobalConfig::from_path(path)?,
        None => GlobalConfig::load_default()?,
    };
    if let Some(root) = &cli.root {
        config.projects_dir = Some(root.clone());
    }
    ProjectEngine::from_global_config(config)
}

fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::NotFound => 3,
        ErrorKind::Validation | ErrorKind::Forbidden | ErrorKind::Conflict => 2,
        _ => 1,
    }
}

fn load_project(engine: &ProjectEngine, id: &str) -> Result<Project, AtelierError> {
    engine.require(&ProjectId::parse(id)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AtelierError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Command handlers
// ============================================================================

fn handle_new(
    style: &Style,
    engine: &ProjectEngine,
    name: &str,
    json: bool,
) -> Result<(), AtelierError> {
    let project = engine.make(name)?;

    if json {
        return print_json(&project.to_resource());
    }

    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Created project `{}` ({})", project.name(), project.id())
        )
    );
    println!(
        "{}",
        style.message_detail("Path", &style.file_path(&project.path().display().to_string()))
    );
    println!(
        "{}",
        style.message_detail("Ports", &project.port_range().to_string())
    );
    println!(
        "{}",
        style.message_detail("Commit", &style.revision(project.latest_commit().as_str()))
    );
    Ok(())
}

fn handle_list(style: &Style, engine: &ProjectEngine, json: bool) -> Result<(), AtelierError> {
    let projects = engine.list()?;

    if json {
        let resources: Vec<_> = projects.iter().map(Project::to_resource).collect();
        return print_json(&resources);
    }

    if projects.is_empty() {
        println!("{}", style.message(MessageType::Info, "No projects found."));
        println!(
            "{}",
            style.message(MessageType::Hint, "Create one with: atelier new <NAME>")
        );
        return Ok(());
    }

    let rows: Vec<ProjectRow> = projects
        .iter()
        .map(|project| ProjectRow {
            id: project.id().to_string(),
            name: project.name().to_string(),
            ports: project.port_range().to_string(),
            head: style.revision(project.current_commit().as_str()),
            detached: project.is_time_travelling(),
            dirty: project.has_uncommitted_changes(),
        })
        .collect();
    println!("{}", table::render_projects_table(&rows));
    Ok(())
}

fn handle_show(
    style: &Style,
    engine: &ProjectEngine,
    id: &str,
    json: bool,
) -> Result<(), AtelierError> {
    let project = load_project(engine, id)?;

    if json {
        return print_json(&project.to_resource());
    }

    println!("{}", style.section("PROJECT"));
    println!();
    println!("  {}", style.key_value("ID", project.id().as_str()));
    println!("  {}", style.key_value("Name", project.name()));
    println!(
        "  {}",
        style.key_value("Path", &style.file_path(&project.path().display().to_string()))
    );
    println!(
        "  {}",
        style.key_value("Ports", &project.port_range().to_string())
    );
    println!(
        "  {}",
        style.key_value("Current", &style.revision(project.current_commit().as_str()))
    );
    println!(
        "  {}",
        style.key_value("Latest", &style.revision(project.latest_commit().as_str()))
    );
    println!(
        "  {}",
        style.key_value(
            "Changes",
            if project.has_uncommitted_changes() {
                "uncommitted"
            } else {
                "none"
            }
        )
    );
    Ok(())
}

fn handle_rename(
    style: &Style,
    engine: &ProjectEngine,
    id: &str,
    name: &str,
) -> Result<(), AtelierError> {
    let mut project = load_project(engine, id)?;
    let old = project.name().to_string();
    engine.rename(&mut project, name)?;
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Renamed `{}` to `{}`", old, project.name())
        )
    );
    Ok(())
}

fn parse_attributes(input: &str) -> Result<Attributes, AtelierError> {
    let text = match input.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)?,
        None => input.to_string(),
    };
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) => Ok(map),
        _ => Err(AtelierError::InvalidAttribute {
            resource: PROJECTS_TYPE,
            attribute: "attributes".to_string(),
            expected: "a JSON object",
        }),
    }
}

fn handle_set(
    style: &Style,
    engine: &ProjectEngine,
    id: &str,
    attributes: &str,
) -> Result<(), AtelierError> {
    // Request-shape errors are reported before the project is touched.
    let patch = ProjectPatch::from_attributes(&parse_attributes(attributes)?)?;
    let mut project = load_project(engine, id)?;

    if patch.is_empty() {
        println!("{}", style.message(MessageType::Info, "Nothing to update."));
        return Ok(());
    }

    let checkout = patch.current_commit.is_some();
    engine.update(&mut project, patch)?;
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Updated project `{}`", project.name())
        )
    );
    if checkout {
        println!(
            "{}",
            style.message_detail("Current", &style.revision(project.current_commit().as_str()))
        );
    }
    Ok(())
}

fn handle_commit(
    style: &Style,
    engine: &ProjectEngine,
    id: &str,
    message: Option<String>,
    author: Option<String>,
    email: Option<String>,
    json: bool,
) -> Result<(), AtelierError> {
    let mut project = load_project(engine, id)?;
    let rewrites = project.is_time_travelling();
    let request = NewCommit {
        author_name: author,
        author_email: email,
        message: message.unwrap_or_default(),
    };
    let sha = engine.commit_request(&mut project, &request)?;

    if json {
        let commit = engine.history().require(project.id(), sha.as_str())?;
        return print_json(&commit.to_resource());
    }

    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("atelier commit {}", style.revision(sha.as_str()))
        )
    );
    println!("{}", style.message_detail("Project", project.name()));
    if rewrites {
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                "Committed from a past commit: the main line now continues from here"
            )
        );
    }
    Ok(())
}

fn handle_checkout(
    style: &Style,
    engine: &ProjectEngine,
    id: &str,
    reference: &str,
) -> Result<(), AtelierError> {
    let mut project = load_project(engine, id)?;
    engine.checkout(&mut project, reference)?;

    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!(
                "Checked out {} in `{}`",
                style.revision(project.current_commit().as_str()),
                project.name()
            )
        )
    );
    if project.is_time_travelling() {
        println!(
            "{}",
            style.message(
                MessageType::Hint,
                &format!(
                    "Viewing a past commit. Committing now rewrites the main line; `atelier checkout {} main` returns to the latest commit",
                    project.id()
                )
            )
        );
    }
    Ok(())
}

fn handle_log(
    style: &Style,
    engine: &ProjectEngine,
    id: &str,
    limit: Option<usize>,
    from: Option<String>,
    json: bool,
) -> Result<(), AtelierError> {
    let id = ProjectId::parse(id)?;
    let history = engine.history();
    let commits = match (limit, from.as_deref()) {
        (None, None) => history.all(&id)?,
        (limit, from) => history.recent(&id, limit.unwrap_or(usize::MAX), from)?,
    };

    if json {
        let resources: Vec<_> = commits.iter().map(Commit::to_resource).collect();
        return print_json(&resources);
    }

    if commits.is_empty() {
        println!("{}", style.message(MessageType::Info, "No commits found."));
        return Ok(());
    }

    let rows: Vec<CommitRow> = commits
        .iter()
        .map(|commit| CommitRow {
            sha: commit.sha().to_string(),
            timestamp: commit
                .authored_at()
                .map(|at| at.with_timezone(&Utc))
                .unwrap_or_default(),
            author: commit.author_name().to_string(),
            message: commit.message().to_string(),
        })
        .collect();
    println!("{}", style.section("HISTORY"));
    println!();
    println!("{}", table::render_commits_table(&rows));
    Ok(())
}

fn handle_status(
    style: &Style,
    engine: &ProjectEngine,
    id: &str,
    json: bool,
) -> Result<(), AtelierError> {
    let project = load_project(engine, id)?;
    let paths = engine.modified_paths(&project)?;

    if json {
        return print_json(&serde_json::json!({
            "id": project.id(),
            "current_commit": project.current_commit(),
            "latest_commit": project.latest_commit(),
            "has_uncommitted_changes": !paths.is_empty(),
            "modified_paths": paths,
        }));
    }

    println!("{}", style.section("STATUS"));
    println!();
    println!("  {}", style.key_value("Project", project.name()));
    let position = if project.is_time_travelling() {
        format!(
            "{} (past commit; latest is {})",
            style.revision(project.current_commit().as_str()),
            style.revision(project.latest_commit().as_str())
        )
    } else {
        format!("{} (latest)", style.revision(project.current_commit().as_str()))
    };
    println!("  {}", style.key_value("HEAD", &position));

    if paths.is_empty() {
        println!();
        println!("Nothing to commit, working tree clean");
    } else {
        println!();
        println!("Changes not yet committed:");
        println!("  (use \"atelier commit {}\" to record them)", project.id());
        println!();
        for path in &paths {
            println!("{}", style.modified(path));
        }
    }
    Ok(())
}

fn handle_rm(style: &Style, engine: &ProjectEngine, id: &str) -> Result<(), AtelierError> {
    let project = load_project(engine, id)?;
    let name = project.name().to_string();
    let id = project.id().clone();
    engine.delete(project)?;
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Deleted project `{}` ({})", name, id)
        )
    );
    Ok(())
}
