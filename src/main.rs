use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing_subscriber::{fmt, EnvFilter};

use release_train::cli::orchestration;
use release_train::cli::{Cli, Command};
use release_train::config;
use release_train::release::Toolkit;
use release_train::session::Session;
use release_train::ui::{self, AutoGate, ConfirmationGate, TerminalGate};

fn main() {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        ui::display_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let session = Session::new(cli.dry_run, !cli.yes);
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, session.cancel.flag())
            .context("cannot install signal handler")?;
    }

    let gate: Arc<dyn ConfirmationGate> = if cli.yes {
        Arc::new(AutoGate(true))
    } else {
        Arc::new(TerminalGate)
    };
    let tools = Toolkit::system(&session, gate);
    let workspace = config::load_workspace(cli.config.as_deref())?;

    if session.dry_run {
        ui::display_status("Dry run: no command that changes a repository will be executed");
    }

    match cli.command {
        Command::Release { release_type } => {
            let report = orchestration::run_release(&workspace, tools, session.clone(), &release_type)?;
            ui::display_report(&report, session.dry_run);
        }
        Command::Undo { version, list } => {
            if list {
                ui::display_records(&orchestration::list_records(&workspace)?);
                return Ok(());
            }
            let record = orchestration::run_undo(&workspace, &tools, &session, version.as_deref())?;
            ui::display_success(&format!(
                "Release {} undone ({} project(s))",
                record.version,
                record.releases.len()
            ));
        }
        Command::Projects => {
            ui::display_projects(&orchestration::project_statuses(&workspace, &tools));
        }
    }
    Ok(())
}
