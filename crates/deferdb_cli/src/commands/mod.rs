//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod verify;

use deferdb_storage::LogTail;
use std::path::Path;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// How a command prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Fails unless `path` is an existing file.
pub fn require_log(path: &Path) -> CommandResult<()> {
    if !path.is_file() {
        return Err(format!("No operation log found at {:?}", path).into());
    }
    Ok(())
}

/// Short label for a log tail.
pub fn tail_label(tail: &LogTail) -> String {
    match tail {
        LogTail::Clean => "clean".to_string(),
        LogTail::Torn => "torn".to_string(),
        LogTail::Corrupt(reason) => format!("corrupt ({reason})"),
    }
}
