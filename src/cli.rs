use clap::{Args, Parser, Subcommand};
use datavis_ingest::SourceSpec;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "datavis-ingest",
    version,
    about = "Inspect and stream data sources for the data visualizer",
    long_about = "Open SQLite databases, delimited files or live TCP streams through one cursor.\n\
                  Sources are written as sqlite:<path>, csv:<path>, listen:<port> or dial:<host:port>;\n\
                  a bare path is treated as SQLite for .db/.sqlite/.sqlite3 and as delimited otherwise."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (JSON or TOML); defaults to the platform data directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the labels, kinds, units and legends of a source
    Describe(DescribeArgs),
    /// Print the records of a source as CSV
    Dump(DumpArgs),
    /// Accept one stream connection and print records until it closes
    Listen(ListenArgs),
    /// Connect to a streaming peer and print records until it closes
    Dial(DialArgs),
    /// Act as the producing peer of a stream
    Send(SendArgs),
}

#[derive(Args)]
pub struct DescribeArgs {
    /// Source to describe
    pub source: SourceSpec,
}

#[derive(Args)]
pub struct DumpArgs {
    /// Source to read
    pub source: SourceSpec,

    /// Stop after this many records
    #[arg(long)]
    pub limit: Option<usize>,

    /// Rewind after reading and check the second pass matches the first
    #[arg(long)]
    pub rewind_check: bool,
}

#[derive(Args)]
pub struct ListenArgs {
    /// Local port to accept the connection on
    #[arg(long)]
    pub port: u16,

    /// Stop after this many records
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct DialArgs {
    /// Peer address as host:port
    #[arg(long)]
    pub address: String,

    /// Stop after this many records
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct SendArgs {
    /// Connect to this consumer (host:port)
    #[arg(long, conflicts_with = "port", required_unless_present = "port")]
    pub address: Option<String>,

    /// Wait for the consumer to connect on this local port instead
    #[arg(long)]
    pub port: Option<u16>,

    /// Variable names sent in the handshake
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub names: Vec<String>,

    /// Source whose records are sent; reads CSV lines from stdin when omitted
    #[arg(long)]
    pub file: Option<SourceSpec>,

    /// Delay between records in milliseconds
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,
}
