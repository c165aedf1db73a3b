//! Per-run settings passed explicitly through the release engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ReleaseError, Result};

/// Shared flag raised when the operator asks the run to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`ReleaseError::Interrupted`] once cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ReleaseError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Underlying flag, for signal handlers
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Skip every mutating command and manifest write
    pub dry_run: bool,
    /// Ask before finishing each release
    pub interactive: bool,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(dry_run: bool, interactive: bool) -> Self {
        Session {
            dry_run,
            interactive,
            cancel: CancellationToken::new(),
        }
    }
}
