//! Pure formatting functions for UI output.
//!
//! This module contains all display/formatting logic separated from user interaction.
//! `format_*` functions build text and are testable; `display_*` functions print it.

use console::style;

use crate::release::TrainReport;

/// One line of the `projects` listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectStatus {
    pub name: String,
    pub vcs: Option<String>,
    pub branch: Option<String>,
    pub version: Option<String>,
    /// Why the project could not be inspected
    pub error: Option<String>,
}

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a warning in yellow.
pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

/// Aligned table of the workspace projects
pub fn format_projects(projects: &[ProjectStatus]) -> String {
    let width = |f: fn(&ProjectStatus) -> &str, title: &str| {
        projects
            .iter()
            .map(|p| f(p).chars().count())
            .chain(std::iter::once(title.len()))
            .max()
            .unwrap_or(0)
    };
    let name_w = width(|p| p.name.as_str(), "PROJECT");
    let vcs_w = width(|p| or_dash(&p.vcs), "VCS");
    let branch_w = width(|p| or_dash(&p.branch), "BRANCH");

    let mut out = format!(
        "{}\n",
        style(format!(
            "{:<name_w$}  {:<vcs_w$}  {:<branch_w$}  VERSION",
            "PROJECT", "VCS", "BRANCH"
        ))
        .bold()
    );
    for p in projects {
        let line = format!(
            "{:<name_w$}  {:<vcs_w$}  {:<branch_w$}  {}",
            p.name,
            or_dash(&p.vcs),
            or_dash(&p.branch),
            or_dash(&p.version)
        );
        match &p.error {
            Some(error) => out.push_str(&format!("{}  {}\n", line, style(error).red())),
            None => out.push_str(&format!("{}\n", line)),
        }
    }
    out
}

pub fn display_projects(projects: &[ProjectStatus]) {
    print!("{}", format_projects(projects));
}

/// Summary of a finished release run
pub fn format_report(report: &TrainReport, dry_run: bool) -> String {
    let title = if dry_run {
        format!("Dry run of release {} complete", report.version)
    } else {
        format!("Release {} complete", report.version)
    };
    let mut out = format!("\n{}\n", style(title).green().bold());
    for (name, version) in &report.released {
        out.push_str(&format!("  {} {} {}\n", style("✓").green(), name, version));
    }
    for (name, reason) in &report.skipped {
        out.push_str(&format!(
            "  {} {} skipped: {}\n",
            style("✗").yellow(),
            name,
            reason
        ));
    }
    if let Some(path) = &report.record {
        out.push_str(&format!(
            "\nRecord saved to {}\nRun `release-train undo {}` to revert it.\n",
            style(path.display()).cyan(),
            report.version
        ));
    }
    out
}

pub fn display_report(report: &TrainReport, dry_run: bool) {
    print!("{}", format_report(report, dry_run));
}

/// Display the saved release records, most recent last.
pub fn display_records(records: &[String]) {
    if records.is_empty() {
        println!("No saved releases.");
        return;
    }
    println!("{}", style("Saved releases:").bold());
    for record in records {
        println!("  - {}", record);
    }
}
