//! Command-line interface for narrator
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Batch narration of written content
#[derive(Parser, Debug)]
#[command(name = "narrator", version, about = "Turn written posts into narrated audio")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: progress, -vv: worker diagnostics, -vvv: protocol trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Narrate content items that have no audio yet
    Run {
        /// Delete and regenerate existing audio
        #[arg(long)]
        force: bool,

        /// Only narrate these items (default: all)
        #[arg(value_name = "SLUG")]
        slugs: Vec<String>,
    },

    /// Check worker, voice references and ffmpeg
    Check,

    /// List content items and whether audio exists
    List,

    /// Inspect configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print a commented template with all defaults
    Dump,
    /// Print the effective configuration (file + environment)
    Show,
}
