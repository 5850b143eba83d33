use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "esedb")]
#[command(about = "Extensible Storage Engine database toolkit")]
#[command(version)]
pub struct Cli {
    /// Control colored output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportMode {
    /// Export every table, including the MSys* system tables
    All,
    /// Export user tables only
    Tables,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print header fields and the catalog
    Info {
        /// Path to ESE database file (.edb, .dit, .dat)
        #[arg(short, long)]
        file: String,

        /// Show column and index detail for every table
        #[arg(short, long)]
        verbose: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Export tables to tab-separated files
    Export {
        /// Path to ESE database file
        #[arg(short, long)]
        file: String,

        /// Target basename; tables land in <target>.export/
        #[arg(short = 't', long)]
        target: Option<String>,

        /// Export only the named table
        #[arg(short = 'T', long)]
        table: Option<String>,

        /// Which tables to export
        #[arg(short = 'm', long, default_value = "tables")]
        mode: ExportMode,

        /// Append warnings to a log file
        #[arg(short = 'l', long)]
        logfile: Option<String>,
    },

    /// One-line-per-page structure listing
    Pages {
        /// Path to ESE database file
        #[arg(short, long)]
        file: String,

        /// Display a specific page number
        #[arg(short, long)]
        page: Option<u32>,

        /// Show empty pages too
        #[arg(short = 'e', long = "show-empty")]
        show_empty: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Hex dump of raw page bytes
    Dump {
        /// Path to ESE database file
        #[arg(short, long)]
        file: String,

        /// Page number to dump
        #[arg(short, long)]
        page: Option<u32>,

        /// Absolute byte offset to start dumping (bypasses page mode)
        #[arg(long)]
        offset: Option<u64>,

        /// Number of bytes to dump (default: page size or 256 for offset mode)
        #[arg(short, long)]
        length: Option<usize>,
    },

    /// Scan pages unreachable from the catalog for leftover records
    Recover {
        /// Path to ESE database file
        #[arg(short, long)]
        file: String,

        /// Decode orphaned records against this table's schema
        #[arg(short = 'T', long)]
        table: Option<String>,

        /// Show per-page detail
        #[arg(short, long)]
        verbose: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}
