use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ftp-mirror")]
#[command(about = "Mirror a remote FTP directory tree to local disk", long_about = None)]
pub struct Cli {
    /// Configuration file name, without extension
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download the configured remote tree
    Mirror {
        /// List and classify only, write nothing locally
        #[arg(long)]
        dry_run: bool,
        /// Prompt for the FTP password instead of reading it from config
        #[arg(long)]
        ask_password: bool,
        /// Exit with status 3 when any entry failed
        #[arg(long)]
        fail_on_errors: bool,
    },
    /// Print the remote tree without downloading anything
    List {
        #[arg(long)]
        ask_password: bool,
    },
    /// Print configuration values
    PrintConfig,
    /// Write an example configuration file
    InitConfig {
        #[arg(long, default_value = "Config.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
