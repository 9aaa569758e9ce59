//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{OutputFormat, PalisadeArgs};
use crate::error::Result;

/// Result structure for file indexing.
#[derive(Debug, Serialize)]
pub struct IndexingResult {
    pub namespace: String,
    pub source_filename: String,
    pub chunks_indexed: usize,
    pub duration_ms: u64,
}

/// Result structure for hybrid queries.
#[derive(Debug, Serialize)]
pub struct QueryResults {
    pub hits: Vec<crate::engine::QueryHit>,
    pub total_hits: usize,
    pub duration_ms: u64,
}

/// Print a command result in the selected output format.
///
/// JSON mode prints only the serialized value; human mode prints the message
/// followed by pretty-printed details when verbosity allows.
pub fn output_result<T: Serialize>(message: &str, value: &T, args: &PalisadeArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{message}");
            }
            if args.verbosity() > 1 {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
        }
    }
    Ok(())
}
