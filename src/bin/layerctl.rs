//! Command-line inspection and maintenance for layer metadata stores.
//!
//! `layerctl` lists layers and mounts, prints recorded metadata, and finishes interrupted layer
//! deletions.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use layerdb::{ChainId, FileMetadataStore, StoreConfig};

/// layerctl
#[derive(Debug, Parser)]
#[clap(name = "layerctl", version)]
pub struct App {
    /// Operate on the store at this path
    #[clap(long, conflicts_with = "config")]
    root: Option<PathBuf>,

    /// Read store settings from this TOML file
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List committed layers and mounts
    List,
    /// Print the metadata recorded for a layer
    Inspect { chain_id: ChainId },
    /// Print the metadata recorded for a mount
    Mount { name: String },
    /// Write a layer's decompressed tar-split log to stdout
    TarSplit { chain_id: ChainId },
    /// List layers whose deletion was interrupted
    Orphans,
    /// Hide a layer by renaming it with the removal marker
    MarkRemoval { chain_id: ChainId },
    /// Delete the removal-marked directories of a layer holding the given cache id
    Remove { chain_id: ChainId, cache_id: String },
}

fn open_store(args: &App) -> Result<FileMetadataStore> {
    let config = match (&args.root, &args.config) {
        (Some(root), _) => StoreConfig {
            root: root.clone(),
            ..StoreConfig::default()
        },
        (None, Some(path)) => StoreConfig::load(path)
            .with_context(|| format!("Loading config from {}", path.display()))?,
        (None, None) => StoreConfig::default(),
    };
    FileMetadataStore::with_config(&config)
        .with_context(|| format!("Opening layer store at {}", config.root.display()))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = App::parse();
    let store = open_store(&args)?;

    match args.cmd {
        Command::List => {
            let (layers, mounts) = store.list()?;
            for layer in layers {
                println!("layer {layer}");
            }
            for mount in mounts {
                println!("mount {mount}");
            }
        }
        Command::Inspect { ref chain_id } => {
            let metadata = store
                .get_layer_metadata(chain_id)
                .with_context(|| format!("Reading layer {chain_id}"))?;
            println!("chain-id   {}", metadata.chain_id);
            println!("diff-id    {}", metadata.diff_id);
            match metadata.parent {
                Some(parent) => println!("parent     {parent}"),
                None => println!("parent     (none)"),
            }
            println!("size       {}", metadata.size);
            println!("cache-id   {}", metadata.cache_id);
            if !metadata.descriptor.is_empty() {
                println!(
                    "descriptor {}",
                    serde_json::to_string(&metadata.descriptor)?
                );
            }
            println!("tar-split  {}", metadata.has_tar_split);
        }
        Command::Mount { ref name } => {
            let metadata = store
                .get_mount_metadata(name)
                .with_context(|| format!("Reading mount {name}"))?;
            println!("mount-id   {}", metadata.mount_id);
            println!("init-id    {}", metadata.init_id.as_deref().unwrap_or("(none)"));
            match metadata.parent {
                Some(parent) => println!("parent     {parent}"),
                None => println!("parent     (none)"),
            }
        }
        Command::TarSplit { ref chain_id } => {
            let mut reader = store.tar_split_reader(chain_id)?;
            let mut stdout = std::io::stdout().lock();
            std::io::copy(&mut reader, &mut stdout).context("Decompressing tar-split log")?;
            stdout.flush()?;
        }
        Command::Orphans => {
            for orphan in store.get_orphans()? {
                println!("{} {}", orphan.chain_id, orphan.cache_id);
            }
        }
        Command::MarkRemoval { ref chain_id } => {
            let marked = store.mark_for_removal(chain_id)?;
            println!("{}", marked.display());
        }
        Command::Remove {
            ref chain_id,
            ref cache_id,
        } => {
            store.remove(chain_id, cache_id)?;
        }
    }
    Ok(())
}
