//! Dump command implementation.

use super::{require_log, tail_label, CommandResult, OutputFormat};
use deferdb_storage::log::{decode_log, LogOp};
use deferdb_storage::LogTail;
use serde::Serialize;
use std::path::Path;

/// One operation as printed by `dump`.
#[derive(Debug, Serialize)]
pub struct DumpEntry {
    /// Position of the frame in the log, counting from zero.
    pub index: usize,
    /// The decoded operation.
    pub op: LogOp,
}

/// Operations selected from a log, and how it ends.
#[derive(Debug)]
pub struct DumpResult {
    /// Selected operations in log order.
    pub entries: Vec<DumpEntry>,
    /// How the log ends.
    pub tail: LogTail,
}

/// Decodes the log at `path`, skipping `skip` matching operations and
/// keeping at most `limit`.
pub fn collect(
    path: &Path,
    skip: usize,
    limit: Option<usize>,
    collection: Option<&str>,
) -> CommandResult<DumpResult> {
    require_log(path)?;
    let bytes = std::fs::read(path)?;
    let decoded = decode_log(&bytes);

    let entries = decoded
        .ops
        .into_iter()
        .enumerate()
        .filter(|(_, op)| collection.map_or(true, |name| op.collection() == name))
        .skip(skip)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, op)| DumpEntry { index, op })
        .collect();

    Ok(DumpResult {
        entries,
        tail: decoded.tail,
    })
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    skip: usize,
    limit: Option<usize>,
    collection: Option<&str>,
    format: OutputFormat,
) -> CommandResult<()> {
    let result = collect(path, skip, limit, collection)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.entries)?),
        OutputFormat::Text => {
            for entry in &result.entries {
                println!("{}", describe(entry)?);
            }
            println!();
            println!(
                "{} operation(s), log tail: {}",
                result.entries.len(),
                tail_label(&result.tail)
            );
        }
    }

    Ok(())
}

fn describe(entry: &DumpEntry) -> CommandResult<String> {
    let line = match &entry.op {
        LogOp::Upsert {
            collection,
            field,
            value,
            fields,
        } => format!(
            "#{:<6} upsert {collection} where {field} = {value} set {}",
            entry.index,
            serde_json::to_string(fields)?
        ),
        LogOp::Insert { collection, record } => format!(
            "#{:<6} insert {collection} {}",
            entry.index,
            serde_json::to_string(record)?
        ),
        LogOp::Remove {
            collection,
            field,
            value,
        } => format!(
            "#{:<6} remove {collection} where {field} = {value}",
            entry.index
        ),
    };
    Ok(line)
}
