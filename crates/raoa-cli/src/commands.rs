use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use raoa_directory::{AlbumImporter, ImportResult, RepositoryDirectory, StorageConfig};
use raoa_repo::{parse_instant, CommitContext, CommitOutcome, PathFilter, RepositoryAccess, StagedChange};
use raoa_types::AlbumId;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let directory = Arc::new(RepositoryDirectory::open(&config)?);
    match cli.command {
        Command::Albums(_) => cmd_albums(&directory).await,
        Command::Dirs(_) => cmd_dirs(&directory).await,
        Command::Resolve(args) => cmd_resolve(&directory, args).await,
        Command::Ls(args) => cmd_ls(&directory, args).await,
        Command::Cat(args) => cmd_cat(&directory, args).await,
        Command::CreateAlbum(args) => cmd_create_album(&directory, args).await,
        Command::Autoadd(args) => cmd_autoadd(&directory, args).await,
        Command::Import(args) => cmd_import(directory, &config, args).await,
        Command::Rm(args) => cmd_rm(&directory, args).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => StorageConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.repository_root = root.clone();
    }
    Ok(config)
}

async fn find_album(
    directory: &RepositoryDirectory,
    key: &str,
) -> anyhow::Result<(AlbumId, RepositoryAccess)> {
    directory
        .lookup_album(key)
        .await?
        .with_context(|| format!("no album matches {key:?}"))
}

fn print_outcome(outcome: &CommitOutcome) {
    match outcome {
        CommitOutcome::Landed { commit } => {
            println!("{} Committed {}", "✓".green().bold(), commit.short_hex().yellow())
        }
        CommitOutcome::Unchanged => println!("Nothing to commit."),
        CommitOutcome::Conflict { .. } => {
            println!("{} Lost the race with another writer", "✗".red().bold())
        }
    }
}

async fn cmd_albums(directory: &RepositoryDirectory) -> anyhow::Result<()> {
    let albums = directory.list_albums().await?;
    if albums.is_empty() {
        println!("No albums under {}.", directory.root().display());
        return Ok(());
    }
    for (id, access) in albums {
        let title = access.name().await?;
        println!(
            "{}  {}  {}",
            id.to_string().cyan(),
            access.full_path().bold(),
            title.dimmed()
        );
    }
    Ok(())
}

async fn cmd_dirs(directory: &RepositoryDirectory) -> anyhow::Result<()> {
    for dir in directory.list_parent_dirs().await? {
        println!("{dir}");
    }
    Ok(())
}

async fn cmd_resolve(directory: &RepositoryDirectory, args: ResolveArgs) -> anyhow::Result<()> {
    let instant = parse_instant(&args.instant)?;
    match directory.resolve_album_for_timestamp(instant).await? {
        Some(id) => {
            let path = directory
                .get_album(&id)
                .await?
                .map(|access| access.full_path())
                .unwrap_or_default();
            println!("{}  {}", id.to_string().cyan(), path.bold());
        }
        None => println!("{} No album covers {}", "✗".yellow(), instant.to_rfc3339()),
    }
    Ok(())
}

async fn cmd_ls(directory: &RepositoryDirectory, args: LsArgs) -> anyhow::Result<()> {
    let (_, access) = find_album(directory, &args.album).await?;
    let filter = match (args.prefix, args.suffix.as_slice()) {
        (Some(prefix), []) => PathFilter::prefix_suffix(prefix, ""),
        (Some(prefix), [suffix]) => PathFilter::prefix_suffix(prefix, suffix.clone()),
        (Some(_), _) => bail!("--prefix takes at most one --suffix"),
        (None, []) => PathFilter::All,
        (None, suffixes) => PathFilter::suffixes(suffixes.to_vec()),
    };
    let mut listing = access.list_files(filter).await?;
    let entries = match args.limit {
        Some(limit) => {
            let mut entries = Vec::new();
            for _ in 0..limit {
                match listing.pull().await {
                    Some(entry) => entries.push(entry?),
                    None => break,
                }
            }
            listing.cancel();
            entries
        }
        None => listing.collect_all().await?,
    };
    for entry in entries {
        println!("{}  {}", entry.object_id.short_hex().dimmed(), entry.path);
    }
    Ok(())
}

async fn cmd_cat(directory: &RepositoryDirectory, args: CatArgs) -> anyhow::Result<()> {
    let (_, access) = find_album(directory, &args.album).await?;
    let data = access
        .read_object_bytes(&args.path)
        .await?
        .with_context(|| format!("{} has no file {}", access.full_path(), args.path))?;
    std::io::stdout().write_all(&data)?;
    Ok(())
}

async fn cmd_create_album(
    directory: &RepositoryDirectory,
    args: CreateAlbumArgs,
) -> anyhow::Result<()> {
    let id = directory.create_album(&args.segments).await?;
    println!("{} Created album {}", "✓".green().bold(), args.segments.join("/").bold());
    println!("  Id: {}", id.to_string().cyan());
    Ok(())
}

async fn cmd_autoadd(directory: &RepositoryDirectory, args: AutoaddArgs) -> anyhow::Result<()> {
    let (_, access) = find_album(directory, &args.album).await?;
    let existing = access.read_autoadd().await?;
    if args.instants.is_empty() && !args.replace {
        if existing.is_empty() {
            println!("No autoadd markers.");
        }
        for instant in existing {
            println!("{}", instant.to_rfc3339());
        }
        return Ok(());
    }

    let mut instants = if args.replace { Vec::new() } else { existing };
    for text in &args.instants {
        instants.push(parse_instant(text)?);
    }
    let outcome = access
        .update_autoadd(&instants, &access.commit_context("update autoadd markers"))
        .await?;
    print_outcome(&outcome);
    Ok(())
}

async fn cmd_import(
    directory: Arc<RepositoryDirectory>,
    config: &StorageConfig,
    args: ImportArgs,
) -> anyhow::Result<()> {
    let target = match &args.album {
        Some(key) => Some(find_album(&directory, key).await?.0),
        None => None,
    };
    let captured_at = match &args.captured_at {
        Some(text) => Some(parse_instant(text)?),
        None => None,
    };
    let mut importer = AlbumImporter::new(Arc::clone(&directory));
    for file in &args.files {
        let result = match (target, captured_at) {
            (Some(album), _) => {
                let name = file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .with_context(|| format!("{} has no usable file name", file.display()))?;
                importer.import_file_into(file, name, album).await?
            }
            (None, Some(captured_at)) => importer.import_file(file, captured_at).await?,
            (None, None) => bail!("either --album or --captured-at is required"),
        };
        match result {
            ImportResult::Imported { path, .. } => println!("  {} {}", "imported:".green(), path),
            ImportResult::AlreadyPresent { path, .. } => {
                println!("  {} {}", "present:".dimmed(), path)
            }
            ImportResult::Shadowed { path, .. } => {
                println!("  {} {} (kept existing)", "exists:".yellow(), path)
            }
            ImportResult::NoTargetAlbum => {
                println!("  {} {}", "no album:".red(), file.display())
            }
        }
    }

    let message = args.message.unwrap_or_else(|| "import".into());
    let context = CommitContext::new(message, config.author.to_person());
    let mut failed = 0;
    for (album, result) in importer.commit_all(&context).await {
        print!("{}  ", album.to_string().cyan());
        match result {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => {
                failed += 1;
                println!("{} {e}", "✗".red().bold());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} album(s) failed to commit");
    }
    Ok(())
}

async fn cmd_rm(directory: &RepositoryDirectory, args: RmArgs) -> anyhow::Result<()> {
    let (_, access) = find_album(directory, &args.album).await?;
    let changes: Vec<StagedChange> = args.paths.iter().map(StagedChange::remove).collect();
    let message = args
        .message
        .unwrap_or_else(|| format!("remove {}", args.paths.join(", ")));
    let outcome = access
        .apply_with_retry(&changes, &access.commit_context(message))
        .await?;
    print_outcome(&outcome);
    Ok(())
}
