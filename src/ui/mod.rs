//! User interface module - interaction (prompts) and formatting.
//!
//! Separates concerns:
//! - `formatter` - Pure formatting functions
//! - This module - Confirmation gates and user input handling

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use crate::error::{ReleaseError, Result};

pub mod formatter;

pub use formatter::{
    display_error, display_projects, display_records, display_report, display_status,
    display_success, display_warning,
};

/// Answers the yes/no questions the release engine asks.
///
/// Used before finishing a release, when some projects cannot be released,
/// and once every release is done. A "no" always leads to rollback.
pub trait ConfirmationGate: Send + Sync {
    fn ask_yes_no(&self, prompt: &str) -> Result<bool>;
}

/// Asks on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalGate;

impl ConfirmationGate for TerminalGate {
    fn ask_yes_no(&self, prompt: &str) -> Result<bool> {
        confirm_action(prompt)
    }
}

/// Gives the same answer to every question
#[derive(Debug, Clone, Copy)]
pub struct AutoGate(pub bool);

impl ConfirmationGate for AutoGate {
    fn ask_yes_no(&self, _prompt: &str) -> Result<bool> {
        Ok(self.0)
    }
}

/// Replays queued answers and remembers what was asked.
///
/// Once the queue is empty every question gets the fallback answer.
#[derive(Debug)]
pub struct ScriptedGate {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
    fallback: bool,
}

impl ScriptedGate {
    pub fn new(answers: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        ScriptedGate {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
            fallback,
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ConfirmationGate for ScriptedGate {
    fn ask_yes_no(&self, prompt: &str) -> Result<bool> {
        self.asked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        let answer = self
            .answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(answer.unwrap_or(self.fallback))
    }
}

/// Prompts user to confirm an action with a yes/no prompt.
///
/// Accepts "y" or "yes" (case-insensitive) as confirmation.
/// Default is "no" if user presses Enter.
pub fn confirm_action(prompt: &str) -> Result<bool> {
    print!("\n{} (y/N): ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(is_yes(&input))
}

fn is_yes(input: &str) -> bool {
    let response = input.trim().to_lowercase();
    response == "y" || response == "yes"
}

/// Prompts user to pick one of the saved release records.
///
/// If only one record exists, returns it directly without prompting.
/// Default selection is the most recent record if user presses Enter.
pub fn select_record(records: &[String]) -> Result<String> {
    let stdin = io::stdin();
    select_record_from(records, &mut stdin.lock())
}

fn select_record_from(records: &[String], input: &mut impl BufRead) -> Result<String> {
    let last = records
        .last()
        .ok_or_else(|| ReleaseError::invalid_argument("no release records to choose from"))?;
    if records.len() == 1 {
        return Ok(last.clone());
    }

    println!("\n{}", console::style("Saved releases:").bold());
    for (i, record) in records.iter().enumerate() {
        println!("  {}. {}", i + 1, record);
    }
    print!(
        "\nSelect a release to undo (1-{}) [default: {}]: ",
        records.len(),
        records.len()
    );
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let selection = line.trim();

    let index = if selection.is_empty() {
        records.len()
    } else {
        selection.parse::<usize>().unwrap_or(0)
    };

    if index > 0 && index <= records.len() {
        Ok(records[index - 1].clone())
    } else {
        Err(ReleaseError::invalid_argument(format!(
            "invalid selection '{}'",
            selection
        )))
    }
}
