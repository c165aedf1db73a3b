pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod project;
pub mod release;
pub mod session;
pub mod ui;
pub mod vcs;
pub mod version;

pub use error::{ReleaseError, Result};
