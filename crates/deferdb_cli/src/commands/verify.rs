//! Verify command implementation.

use super::{require_log, tail_label, CommandResult, OutputFormat};
use deferdb_storage::{FileBackend, LogTail};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Verification result.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Valid frames.
    pub frames: usize,
    /// Length of the valid prefix.
    pub valid_bytes: u64,
    /// Length of the file.
    pub total_bytes: u64,
    /// How the log ends.
    pub tail: String,
    /// Whether every byte belongs to a valid frame.
    pub ok: bool,
}

/// Checks every frame of the log at `path` without modifying it.
pub fn verify(path: &Path) -> CommandResult<VerifyResult> {
    require_log(path)?;
    info!("Verifying operation log {:?}", path);
    let report = FileBackend::verify(path)?;

    Ok(VerifyResult {
        frames: report.frames,
        valid_bytes: report.valid_bytes,
        total_bytes: report.total_bytes,
        tail: tail_label(&report.tail),
        ok: report.tail == LogTail::Clean,
    })
}

/// Runs the verify command. Fails if the log has a torn or corrupt tail.
pub fn run(path: &Path, format: OutputFormat) -> CommandResult<()> {
    let result = verify(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("Verifying operation log at {:?}", path);
            println!();
            println!("  Frames checked: {}", result.frames);
            println!("  Valid bytes:    {}", result.valid_bytes);
            println!("  Total bytes:    {}", result.total_bytes);
            println!("  Tail:           {}", result.tail);
            println!();
        }
    }

    if result.ok {
        if format == OutputFormat::Text {
            println!("✓ Log verification passed");
        }
        Ok(())
    } else {
        warn!(
            "{} bytes after frame {} would be discarded on open",
            result.total_bytes - result.valid_bytes,
            result.frames
        );
        if format == OutputFormat::Text {
            println!("✗ Log verification failed");
        }
        Err("Verification failed".into())
    }
}
