//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `atelier list` | `render_projects_table()` |
//! | `atelier log` | `render_commits_table()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, ColumnConstraint, Table, Width};

use super::color::terminal_width;
use super::format::{format_relative_time, summary_line, truncate_str};

/// Project row for `atelier list`.
#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub ports: String,
    /// Short sha of the current commit
    pub head: String,
    /// Whether the project sits on a past commit
    pub detached: bool,
    pub dirty: bool,
}

/// Commit row for `atelier log`.
#[derive(Debug, Clone)]
pub struct CommitRow {
    pub sha: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub author: String,
    pub message: String,
}

/// Render the project listing.
///
/// # Example Output
///
/// ```text
/// ID                                 NAME     PORTS         HEAD       STATE
/// 3f0c1b2e9a8d4c7f8e6d5c4b3a291807   demo     50000-50099   abc12345   live, modified
/// ```
pub fn render_projects_table(projects: &[ProjectRow]) -> String {
    if projects.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec!["ID", "NAME", "PORTS", "HEAD", "STATE"]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(32)), // ID
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // NAME
        ColumnConstraint::LowerBoundary(Width::Fixed(11)), // PORTS
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // HEAD
        ColumnConstraint::LowerBoundary(Width::Fixed(5)),  // STATE
    ]);

    for project in projects {
        let mut state = vec![if project.detached { "past commit" } else { "live" }];
        if project.dirty {
            state.push("modified");
        }
        table.add_row(vec![
            Cell::new(&project.id),
            Cell::new(truncate_str(&project.name, 30)),
            Cell::new(&project.ports),
            Cell::new(&project.head),
            Cell::new(state.join(", ")),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render commit history, newest first.
///
/// # Example Output
///
/// ```text
/// SHA        DATE       AUTHOR    MESSAGE
/// abc12345   2h ago     Atelier   edit
/// def67890   1d ago     Atelier   Initial commit
/// ```
pub fn render_commits_table(commits: &[CommitRow]) -> String {
    if commits.is_empty() {
        return String::new();
    }

    // SHA + DATE + AUTHOR columns and padding take roughly 40 columns.
    let message_width = terminal_width().saturating_sub(40).max(20);

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec!["SHA", "DATE", "AUTHOR", "MESSAGE"]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // SHA
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // DATE
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // AUTHOR
        ColumnConstraint::LowerBoundary(Width::Fixed(20)), // MESSAGE
    ]);

    for commit in commits {
        table.add_row(vec![
            Cell::new(commit.sha.get(..8).unwrap_or(&commit.sha)),
            Cell::new(format_relative_time(commit.timestamp)),
            Cell::new(truncate_str(&commit.author, 16)),
            Cell::new(truncate_str(summary_line(&commit.message), message_width)),
        ]);
    }

    table.trim_fmt().to_string()
}
