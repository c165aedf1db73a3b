use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{ReleaseError, Result};
use crate::exec::{CommandOutput, CommandRunner, Invocation};

enum Reply {
    Output(CommandOutput),
    Failure { code: i32, stderr: String },
}

/// Command runner for testing without spawning processes.
///
/// Records every invocation and answers with queued replies in order; once
/// the queue is empty every invocation succeeds with no output.
#[derive(Default)]
pub struct ScriptedRunner {
    invocations: Mutex<Vec<Invocation>>,
    replies: Mutex<VecDeque<Reply>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply with the given stdout lines
    pub fn push_output<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock_replies()
            .push_back(Reply::Output(CommandOutput::from_lines(lines)));
    }

    /// Queue a failing reply
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.lock_replies().push_back(Reply::Failure {
            code,
            stderr: stderr.into(),
        });
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded invocations rendered as command lines
    pub fn command_lines(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Reply>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());

        match self.lock_replies().pop_front() {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Failure { code, stderr }) => Err(ReleaseError::BackendOperationFailed {
                command: invocation.command_line(),
                code: Some(code),
                stderr,
            }),
            None => Ok(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            }),
        }
    }
}
