use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "raoa", about = "RAOA album store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML storage configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage root, overriding the configuration
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List all albums
    Albums(AlbumsArgs),
    /// List the directories albums live in
    Dirs(DirsArgs),
    /// Show which album owns a capture time
    Resolve(ResolveArgs),
    /// List the files of an album
    Ls(LsArgs),
    /// Print a file of an album
    Cat(CatArgs),
    /// Create an empty album
    CreateAlbum(CreateAlbumArgs),
    /// Show or set the autoadd markers of an album
    Autoadd(AutoaddArgs),
    /// Import files into the album owning their capture time
    Import(ImportArgs),
    /// Remove files from an album
    Rm(RmArgs),
}

#[derive(Args)]
pub struct AlbumsArgs {}

#[derive(Args)]
pub struct DirsArgs {}

#[derive(Args)]
pub struct ResolveArgs {
    pub instant: String,
}

#[derive(Args)]
pub struct LsArgs {
    /// Album id, path or name
    pub album: String,
    #[arg(long)]
    pub suffix: Vec<String>,
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(short = 'n', long)]
    pub limit: Option<u64>,
}

#[derive(Args)]
pub struct CatArgs {
    pub album: String,
    pub path: String,
}

#[derive(Args)]
pub struct CreateAlbumArgs {
    #[arg(required = true)]
    pub segments: Vec<String>,
}

#[derive(Args)]
pub struct AutoaddArgs {
    pub album: String,
    pub instants: Vec<String>,
    /// Replace the existing markers instead of adding to them
    #[arg(long)]
    pub replace: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Capture time used to route the files by autoadd markers
    #[arg(long, required_unless_present = "album")]
    pub captured_at: Option<String>,
    /// Import into this album (id, path or name) instead of routing
    #[arg(long, conflicts_with = "captured_at")]
    pub album: Option<String>,
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args)]
pub struct RmArgs {
    pub album: String,
    #[arg(required = true)]
    pub paths: Vec<String>,
    #[arg(short, long)]
    pub message: Option<String>,
}
