use assets_core::{
    assets_config_from_env, AssetStore, ConflictResolution, FileMigrationHelper, FileRecord,
    InMemoryRecordStore, LegacyThumbnailMigrationHelper, RecordStore, Stage, Visibility,
    WriteConfig,
};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "assets")]
#[command(about = "Public/protected asset store CLI")]
struct Cli {
    /// JSON file records are loaded from and saved back to
    #[arg(long, env = "ASSETS_RECORDS_FILE")]
    records: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what the store supports
    Capabilities,
    /// Store a local file
    Put {
        /// Local file to read
        path: PathBuf,
        /// Filename to store under (defaults to the local file name)
        #[arg(long)]
        filename: Option<String>,
        /// Expected content hash, or the original's hash when writing a variant
        #[arg(long)]
        hash: Option<String>,
        #[arg(long)]
        variant: Option<String>,
        /// exception, overwrite, rename or use-existing
        #[arg(long)]
        conflict: Option<ConflictResolution>,
        /// public or protected
        #[arg(long)]
        visibility: Option<Visibility>,
        /// Also save a draft record for the stored file
        #[arg(long)]
        record: bool,
    },
    /// Write a stored file to stdout
    Cat {
        filename: String,
        hash: String,
        #[arg(long, default_value = "")]
        variant: String,
    },
    /// Print the URL a stored file is served from
    Url {
        filename: String,
        hash: String,
        #[arg(long, default_value = "")]
        variant: String,
    },
    /// Print size, MIME type and location of a stored file
    Metadata {
        filename: String,
        hash: String,
        #[arg(long, default_value = "")]
        variant: String,
    },
    /// Move a file and its variants to the public store
    Publish { filename: String, hash: String },
    /// Move a file and its variants to the protected store
    Protect { filename: String, hash: String },
    /// Delete a file and its variants
    Delete {
        filename: String,
        hash: String,
        /// Keep the original and delete only its variants
        #[arg(long)]
        variants_only: bool,
    },
    /// Rename a file and its variants
    Rename {
        filename: String,
        hash: String,
        new_filename: String,
    },
    /// Copy a file and its variants to a new filename
    Copy {
        filename: String,
        hash: String,
        new_filename: String,
    },
    /// Resolve a file ID to the file it currently refers to
    Resolve {
        file_id: String,
        /// Fall back to the record store when the file ID is stale
        #[arg(long)]
        soft: bool,
    },
    /// Move whatever a file ID resolves to onto its canonical file IDs
    Normalise { file_id: String },
    /// Normalise every recorded file
    Migrate {
        /// draft or live
        #[arg(long, default_value = "live")]
        stage: Stage,
        /// Move `_resampled` thumbnails instead of originals
        #[arg(long)]
        thumbnails: bool,
    },
    /// Print the content hash of a local file
    Hash { path: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("assets_core=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("No command given. Use --help for usage.");
        return Ok(());
    };

    let records = match &cli.records {
        Some(path) => Some(Arc::new(InMemoryRecordStore::load_json(path)?)),
        None => None,
    };
    let store = AssetStore::from_config(
        assets_config_from_env()?,
        records
            .clone()
            .map(|records| records as Arc<dyn RecordStore>),
    )?;

    match command {
        Commands::Capabilities => {
            let capabilities = store.capabilities();
            println!("Visibility: {:?}", capabilities.visibility);
            println!("Conflict resolution: {:?}", capabilities.conflict);
        }
        Commands::Put {
            path,
            filename,
            hash,
            variant,
            conflict,
            visibility,
            record,
        } => {
            let mut config = WriteConfig::new();
            if let Some(conflict) = conflict {
                config = config.with_conflict(conflict);
            }
            if let Some(visibility) = visibility {
                config = config.with_visibility(visibility);
            }
            let tuple = store.set_from_local_file(
                &path,
                filename.as_deref(),
                hash.as_deref(),
                variant.as_deref(),
                config,
            )?;
            if record && tuple.variant.is_empty() {
                let Some(records) = &records else {
                    return Err("--record needs --records or ASSETS_RECORDS_FILE".into());
                };
                records.save(Stage::Draft, FileRecord::new(&tuple.filename, &tuple.hash))?;
            }
            println!("{}", serde_json::to_string_pretty(&tuple)?);
        }
        Commands::Cat {
            filename,
            hash,
            variant,
        } => {
            let bytes = store.get_as_bytes(&filename, &hash, &variant)?;
            std::io::stdout().write_all(&bytes)?;
        }
        Commands::Url {
            filename,
            hash,
            variant,
        } => {
            println!(
                "{}",
                store.get_as_url(None, &filename, &hash, &variant, false)?
            );
        }
        Commands::Metadata {
            filename,
            hash,
            variant,
        } => match store.get_metadata(&filename, &hash, &variant)? {
            Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
            None => eprintln!("No stored file for {} ({})", filename, hash),
        },
        Commands::Publish { filename, hash } => {
            let moved = store.publish(&filename, &hash)?;
            println!("Published {} file(s)", moved);
        }
        Commands::Protect { filename, hash } => {
            let moved = store.protect(&filename, &hash)?;
            println!("Protected {} file(s)", moved);
        }
        Commands::Delete {
            filename,
            hash,
            variants_only,
        } => {
            if variants_only {
                let deleted = store.delete_variants(&filename, &hash)?;
                println!("Deleted {} variant(s)", deleted);
            } else if store.delete(&filename, &hash)? {
                println!("Deleted {}", filename);
            } else {
                println!("Nothing stored for {}", filename);
            }
        }
        Commands::Rename {
            filename,
            hash,
            new_filename,
        } => {
            let renamed = store.rename(&filename, &hash, &new_filename)?;
            println!("Renamed to {}", renamed);
        }
        Commands::Copy {
            filename,
            hash,
            new_filename,
        } => {
            let copied = store.copy(&filename, &hash, &new_filename)?;
            println!("Copied to {}", copied);
        }
        Commands::Resolve { file_id, soft } => {
            let mut resolved = None;
            for visibility in Visibility::ALL {
                let fs = store.filesystem(visibility);
                let strategy = store.strategy(visibility);
                let mut found = strategy.resolve_file_id(&file_id, fs.as_ref())?;
                if found.is_none() && soft {
                    found = strategy.soft_resolve_file_id(&file_id, fs.as_ref())?;
                }
                if let Some(found) = found {
                    resolved = Some((visibility, found));
                    break;
                }
            }
            match resolved {
                Some((visibility, found)) => println!(
                    "{} -> {} ({}, hash {})",
                    file_id,
                    found.file_id(),
                    visibility,
                    found.hash()
                ),
                None => eprintln!("{} does not resolve to a stored file", file_id),
            }
        }
        Commands::Normalise { file_id } => match store.normalise_path(&file_id)? {
            Some(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
            None => eprintln!("{} does not resolve to a stored file", file_id),
        },
        Commands::Migrate { stage, thumbnails } => {
            let report = if thumbnails {
                LegacyThumbnailMigrationHelper::new(&store)?.run(stage)?
            } else {
                FileMigrationHelper::new(&store)?.run(stage)?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Hash { path } => {
            let mut file = std::fs::File::open(&path)?;
            println!("{}", store.hasher().compute_from_stream(&mut file)?);
        }
    }

    // Rename updates records, and put may add one.
    if let (Some(records), Some(path)) = (&records, &cli.records) {
        records.save_json(path)?;
    }

    Ok(())
}
