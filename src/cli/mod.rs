//! Command-line surface.

pub mod orchestration;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "release-train",
    version,
    about = "Release every project of a workspace with git-flow style branches, and undo it"
)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Custom workspace file path")]
    pub config: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Preview what would happen without making changes"
    )]
    pub dry_run: bool,

    #[arg(
        short = 'y',
        long = "yes",
        global = true,
        help = "Answer yes to every confirmation prompt"
    )]
    pub yes: bool,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "More logging (-v, -vv)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Release every project of the workspace
    Release {
        /// Component to increment: major, minor, build, revision, preRelease or buildMetaTag
        release_type: String,
    },
    /// Revert a saved release
    Undo {
        /// Version of the release to revert; asks (or takes the latest) when omitted
        version: Option<String>,

        #[arg(long, help = "List saved releases and exit")]
        list: bool,
    },
    /// Show each project's version control, branch and version
    Projects,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release() {
        let cli = Cli::try_parse_from(["release-train", "--dry-run", "-y", "release", "minor"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.yes);
        assert!(matches!(cli.command, Command::Release { ref release_type } if release_type == "minor"));
    }

    #[test]
    fn test_parse_undo_and_globals_after_command() {
        let cli = Cli::try_parse_from([
            "release-train",
            "undo",
            "1.5.0",
            "--config",
            "ws.toml",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("ws.toml"));
        assert_eq!(cli.log_level(), "debug");
        assert!(matches!(
            cli.command,
            Command::Undo { ref version, list: false } if version.as_deref() == Some("1.5.0")
        ));
    }

    #[test]
    fn test_release_requires_type() {
        assert!(Cli::try_parse_from(["release-train", "release"]).is_err());
        assert!(Cli::try_parse_from(["release-train"]).is_err());
    }

    #[test]
    fn test_projects_and_undo_list() {
        let cli = Cli::try_parse_from(["release-train", "projects"]).unwrap();
        assert!(matches!(cli.command, Command::Projects));
        assert_eq!(cli.log_level(), "warn");

        let cli = Cli::try_parse_from(["release-train", "undo", "--list"]).unwrap();
        assert!(matches!(cli.command, Command::Undo { version: None, list: true }));
    }
}
