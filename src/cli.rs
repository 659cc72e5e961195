use std::{net::SocketAddr, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    entry::DocVersion,
    search::{DEFAULT_DEPTH, DEFAULT_K},
    server::{DEFAULT_ADDR, DEFAULT_TIMEOUT_MS},
};

#[derive(Debug, Parser)]
#[command(
    name = "docdex",
    about = "Index versioned HTML reference docs and look entries up by approximate name"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true, env = "DOCDEX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the corpus directory registered for each version
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },
    /// Parse registered sources and replace the stored entries
    Build(BuildArgs),
    /// Rank entry names matching a query
    Search(SearchArgs),
    /// Show the best-matching entry for a query
    Entry(EntryArgs),
    /// Serve lookups over HTTP
    Serve(ServeArgs),
    /// Start MCP server for AI agent integration
    Mcp(McpArgs),
    /// Show stored versions and sources
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Source subcommands --

#[derive(Debug, Subcommand)]
pub enum SourceAction {
    /// Register a directory of HTML pages as the corpus for a version
    Add {
        /// Path to the corpus root
        path: PathBuf,
        /// Documentation version the pages belong to
        #[arg(long, short = 'V')]
        version: DocVersion,
    },
    /// Unregister a version and delete its stored entries
    Remove {
        /// Documentation version
        version: DocVersion,
    },
    /// List registered sources
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

// -- Build --

#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Build only this version
    #[arg(short = 'V', long)]
    pub version: Option<DocVersion>,

    /// JSON page profile configuration replacing the built-in one
    #[arg(long)]
    pub profiles: Option<PathBuf>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Documentation version to search
    #[arg(short = 'V', long)]
    pub version: DocVersion,

    /// Number of names to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_K)]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Entry --

#[derive(Debug, Parser)]
pub struct EntryArgs {
    /// The search query; the best-ranked name is shown
    pub query: String,

    /// Documentation version to search
    #[arg(short = 'V', long)]
    pub version: DocVersion,

    /// Levels of enclosing sections to include
    #[arg(long, default_value_t = DEFAULT_DEPTH)]
    pub depth: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Serve --

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "DOCDEX_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// Milliseconds an entry lookup may take before failing
    #[arg(
        long,
        env = "DOCDEX_TIMEOUT_MS",
        default_value_t = DEFAULT_TIMEOUT_MS
    )]
    pub timeout_ms: u64,

    /// JSON page profile configuration used by `/rebuild`
    #[arg(long)]
    pub profiles: Option<PathBuf>,
}

// -- MCP --

#[derive(Debug, Parser)]
pub struct McpArgs {
    /// Milliseconds an entry lookup may take before failing
    #[arg(
        long,
        env = "DOCDEX_TIMEOUT_MS",
        default_value_t = DEFAULT_TIMEOUT_MS
    )]
    pub timeout_ms: u64,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docdex",
            &mut std::io::stdout(),
        );
    }
}
