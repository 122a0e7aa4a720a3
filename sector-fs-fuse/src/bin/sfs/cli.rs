use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Build and inspect sector file system images")]
pub struct Cli {
    /// Disk image
    #[arg(long, short, default_value = "DISK")]
    pub disk: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image holding an empty root directory
    Format,
    /// Copy a host file into the image
    Copy { host: PathBuf, path: String },
    /// Append a host file to a file in the image, creating it if missing
    Append { host: PathBuf, path: String },
    /// Print a file to stdout
    Cat { path: String },
    Mkdir { path: String },
    /// Remove a file or an empty directory
    Rm { path: String },
    /// List the directory tree
    Ls,
    /// Dump the bitmap, the directory tree and every file's contents
    Dump,
    Stat { path: String },
    /// Write, read back and remove a small file
    Perf,
}
