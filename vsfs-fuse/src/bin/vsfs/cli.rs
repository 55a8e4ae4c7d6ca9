use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(version, about = "Build and inspect vsfs disk images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create (or truncate) an image file and format it
    Mkfs {
        image: PathBuf,

        /// Image size in blocks
        #[arg(long, short, default_value_t = 4096)]
        blocks: u32,

        /// Block size in bytes, ignored by the minimal profile
        #[arg(long, default_value_t = 4096)]
        block_size: u32,

        #[arg(long, short, value_enum, default_value_t = ProfileKind::Extended)]
        profile: ProfileKind,
    },

    /// Copy every regular file of a host directory into the image root
    Pack {
        image: PathBuf,

        /// Host source directory
        #[arg(long, short)]
        source: PathBuf,
    },

    /// List a directory
    Ls {
        image: PathBuf,

        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file to stdout
    Cat { image: PathBuf, path: String },

    /// Show inode metadata
    Stat { image: PathBuf, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileKind {
    /// 4 KiB blocks, one direct pointer, at most 64 blocks
    Minimal,
    /// Twelve direct pointers, block-sized bitmaps
    Extended,
}
