//! hyprink - pack, unpack and install directory trees
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Shell front-end over [`hyprink_core::Context`]. Every subcommand maps to
//! one context operation; the process exit code is the operation's status
//! code (`0` on success).

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hyprink")]
#[command(author, version, about = "hyprink - pack, unpack and install directory trees")]
pub struct Cli {
    /// Override the app name used in log lines
    #[arg(long, global = true, env = "HYPRINK_APP_NAME")]
    pub app_name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pack a directory into a package file
    Pack {
        /// Directory to pack
        src: PathBuf,
        /// Output file (default: <dirname>.pkg in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract a package file into a directory
    Unpack {
        /// Package file
        package: PathBuf,
        /// Target directory (created if missing)
        target: PathBuf,
    },
    /// Install a package file or directory into the install root
    Install {
        /// Package file or directory
        path: PathBuf,
    },
    /// Show the manifest of a package file
    List {
        /// Package file
        package: PathBuf,
        /// Print the manifest as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a package file's integrity without extracting it
    Verify {
        /// Package file
        package: PathBuf,
    },
    /// Write a log line
    Log {
        /// trace, debug, info, warn or error
        level: String,
        /// Scope shown next to the level
        scope: String,
        /// Message text
        message: String,
    },
    /// Write a configured preset log line
    Preset {
        /// Preset name
        name: String,
        /// Replace the preset's message
        message: Option<String>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
