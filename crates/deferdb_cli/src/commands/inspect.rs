//! Inspect command implementation.

use super::{require_log, tail_label, CommandResult, OutputFormat};
use deferdb_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log file size in bytes.
    pub log_size: u64,
    /// Number of valid frames.
    pub frames: usize,
    /// Bytes after the last valid frame.
    pub trailing_bytes: u64,
    /// How the log ends.
    pub tail: String,
    /// Number of collections with live records.
    pub collection_count: usize,
    /// Number of live records.
    pub record_count: usize,
    /// Collection statistics (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<CollectionStats>>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Live records.
    pub records: usize,
}

/// Reads the log at `path` without modifying it.
pub fn inspect(path: &Path, show_collections: bool) -> CommandResult<InspectResult> {
    require_log(path)?;
    let report = FileBackend::verify(path)?;

    let collections: Vec<CollectionStats> = report
        .collections
        .iter()
        .map(|(name, records)| CollectionStats {
            name: name.clone(),
            records: *records,
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size: report.total_bytes,
        frames: report.frames,
        trailing_bytes: report.total_bytes - report.valid_bytes,
        tail: tail_label(&report.tail),
        collection_count: collections.len(),
        record_count: collections.iter().map(|c| c.records).sum(),
        collections: show_collections.then_some(collections),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, show_collections: bool, format: OutputFormat) -> CommandResult<()> {
    let result = inspect(path, show_collections)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("deferdb Operation Log");
    println!("=====================");
    println!("Path: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:           {} bytes", result.log_size);
    println!("  Frames:         {}", result.frames);
    println!("  Tail:           {}", result.tail);
    if result.trailing_bytes > 0 {
        println!("  Trailing bytes: {}", result.trailing_bytes);
    }
    println!();
    println!("Data:");
    println!("  Collections:    {}", result.collection_count);
    println!("  Records:        {}", result.record_count);

    if let Some(collections) = &result.collections {
        println!();
        println!("Collections:");
        for collection in collections {
            println!("  {:<24} {:>8} records", collection.name, collection.records);
        }
    }
}
