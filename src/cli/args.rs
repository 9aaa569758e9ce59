//! Command line argument parsing for the Palisade CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Palisade - a namespace-isolated hybrid retrieval engine
#[derive(Parser, Debug, Clone)]
#[command(name = "palisade")]
#[command(about = "A namespace-isolated hybrid retrieval engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PalisadeArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Directory the engine persists namespaces under
    #[arg(short, long, env = "PALISADE_DATA_DIR", default_value = "./palisade-data")]
    pub data_dir: PathBuf,

    /// Embedding dimension the data directory was built with
    #[arg(long, default_value = "1024")]
    pub dimension: usize,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PalisadeArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Output format for command results.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Human,
    /// JSON, one document per command
    Json,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a namespace
    Create(CreateArgs),

    /// Delete a namespace and everything in it
    Delete(DeleteArgs),

    /// List namespaces
    List(ListArgs),

    /// Show one namespace's metadata and statistics
    Details(DetailsArgs),

    /// Index a text file into a namespace, one chunk per paragraph
    Index(IndexArgs),

    /// Run a hybrid query
    Query(QueryArgs),

    /// Clone a namespace's content under a new name
    Clone(CloneArgs),

    /// Move or merge a namespace into another
    Migrate(MigrateArgs),

    /// Back up a namespace to a directory
    Backup(BackupArgs),

    /// Restore a namespace from a backup directory
    Restore(RestoreArgs),

    /// Measure content overlap between two namespaces
    Overlap(OverlapArgs),

    /// Aggregate statistics across all namespaces
    Overview,

    /// Query cache counters
    CacheStats,
}

/// Arguments for creating a namespace
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Namespace name
    pub name: String,

    /// Free-form description
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Owning department
    #[arg(long, default_value = "")]
    pub department: String,

    /// Contact person or address
    #[arg(long, default_value = "")]
    pub contact: String,

    /// Organizational tags
    #[arg(short, long)]
    pub tags: Vec<String>,
}

/// Arguments for deleting a namespace
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Namespace name
    pub name: String,
}

/// Arguments for listing namespaces
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Only namespaces owned by this department
    #[arg(long)]
    pub department: Option<String>,
}

/// Arguments for namespace details
#[derive(Parser, Debug, Clone)]
pub struct DetailsArgs {
    /// Namespace name
    pub name: String,
}

/// Arguments for indexing a file
#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Namespace to index into
    pub namespace: String,

    /// Text file to index
    pub file: PathBuf,
}

/// Arguments for querying
#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    /// Namespaces to search, at least one
    #[arg(short, long = "namespace", required = true)]
    pub namespaces: Vec<String>,

    /// The query text
    pub text: String,

    /// Number of results
    #[arg(short = 'k', long, default_value = "10")]
    pub top_k: usize,

    /// BM25 weight
    #[arg(long, default_value = "0.3")]
    pub bm25_weight: f32,

    /// Vector similarity weight
    #[arg(long, default_value = "0.7")]
    pub vector_weight: f32,

    /// Skip the query cache
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for cloning a namespace
#[derive(Parser, Debug, Clone)]
pub struct CloneArgs {
    /// Source namespace
    pub src: String,

    /// New namespace name
    pub dst: String,
}

/// Arguments for migrating a namespace
#[derive(Parser, Debug, Clone)]
pub struct MigrateArgs {
    /// Source namespace (consumed)
    pub src: String,

    /// Destination namespace
    pub dst: String,

    /// Merge into an existing destination instead of renaming
    #[arg(long)]
    pub merge: bool,
}

/// Arguments for backing up a namespace
#[derive(Parser, Debug, Clone)]
pub struct BackupArgs {
    /// Namespace to back up
    pub namespace: String,

    /// Destination directory (must not exist)
    pub dest: PathBuf,
}

/// Arguments for restoring a namespace
#[derive(Parser, Debug, Clone)]
pub struct RestoreArgs {
    /// Backup directory to restore from
    pub backup_dir: PathBuf,

    /// Replace the namespace if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// Arguments for overlap analysis
#[derive(Parser, Debug, Clone)]
pub struct OverlapArgs {
    /// Namespace the sample is drawn from
    pub namespace_a: String,

    /// Namespace searched for nearest neighbors
    pub namespace_b: String,

    /// Number of chunks to sample
    #[arg(short, long, default_value = "100")]
    pub sample_size: usize,
}
