//! archivist CLI entry point

use archivist::{
    admin::StorageAdmin,
    commands::{
        build_backend, cmd_backup, cmd_check, cmd_clear, cmd_delete, cmd_diagnose,
        cmd_ingest_dir, cmd_ingest_file, cmd_ingest_stdin, cmd_init, cmd_list,
        cmd_recreate_collection, cmd_restore, print_clear_stats, print_consistency_report,
        print_documents, print_health_report, print_ingest_report, print_listing,
        print_repair_outcome,
    },
    config::Config,
    consistency::{ConsistencyChecker, ConsistencyRepairer},
    embed::{create_embedder, Embedder, NullEmbedder},
    engine::{IngestionEngine, MutationLock},
    error::Result,
    index::ReferenceIndex,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "archivist")]
#[command(version, about = "Multi-store document ingestion with consistency tooling", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize archivist configuration and storage
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Ingest documents into the index
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// List ingested documents
    List,

    /// Delete one document and its nodes from all stores
    Delete {
        /// Document ID to delete (see 'archivist list')
        doc_id: String,
    },

    /// Check cross-store consistency
    Check {
        /// Repair detected issues
        #[arg(long)]
        repair: bool,

        /// Also apply critical repairs (e.g. recreate a missing collection)
        #[arg(long)]
        auto: bool,
    },

    /// Probe all backends and report overall health
    Diagnose,

    /// Emergency wipe of all three stores
    Clear {
        /// Required: actually perform the wipe
        #[arg(long)]
        force: bool,
    },

    /// Drop and recreate the vector collection
    RecreateCollection {
        /// Required: actually recreate the collection
        #[arg(long)]
        force: bool,
    },

    /// Back up the store snapshot files
    Backup {
        /// Backup name (defaults to a timestamp)
        #[arg(long)]
        name: Option<String>,
    },

    /// Restore store snapshot files from a backup
    Restore {
        /// Backup directory to restore from
        path: PathBuf,

        /// Required: overwrite current state
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Ingest a single file
    File {
        /// Path to the file
        path: PathBuf,

        /// Logical name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Ingest every file under a directory
    Dir {
        /// Path to directory
        path: PathBuf,
    },

    /// Ingest raw bytes from stdin
    Stdin {
        /// Logical name for the ingested content
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.and_then(|p| p.parent().map(PathBuf::from));
        let config = cmd_init(base_dir, force).await?;

        println!("✓ archivist initialized successfully");
        println!("  Config: {}", config.paths.config_file.display());
        println!("\nNext steps:");
        println!("  archivist ingest dir ./path/to/docs    # Index local docs");
        println!("  archivist list                         # See what's ingested");
        println!("  archivist diagnose                     # Check store health");
        return Ok(());
    }

    // Handle completions command (doesn't need config or stores)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "archivist", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration and assemble components
    let config = load_config(cli.config.as_deref())?;

    let index = Arc::new(RwLock::new(ReferenceIndex::open(&config.paths.data_dir)?));
    let vectors = build_backend(&config)?;
    let mutation: MutationLock = Arc::new(tokio::sync::Mutex::new(()));

    // Only ingestion needs a real embedding backend
    let embedder: Arc<dyn Embedder> = if matches!(cli.command, Commands::Ingest { .. }) {
        create_embedder(&config.embedding)?
    } else {
        Arc::new(NullEmbedder::new(config.embedding.dimension))
    };

    let engine = IngestionEngine::new(
        config.clone(),
        index.clone(),
        vectors.clone(),
        embedder,
        mutation.clone(),
    );
    let admin = StorageAdmin::new(
        config.clone(),
        index.clone(),
        vectors.clone(),
        mutation.clone(),
    );

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest { source } => match source {
            IngestSource::File { path, name } => {
                let docs = cmd_ingest_file(&engine, &path, name).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&docs)?);
                } else {
                    print_documents(&docs);
                }
            }
            IngestSource::Dir { path } => {
                let report = cmd_ingest_dir(&engine, &path).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_ingest_report(&report);
                }
            }
            IngestSource::Stdin { name } => {
                let docs = cmd_ingest_stdin(&engine, &name).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&docs)?);
                } else {
                    print_documents(&docs);
                }
            }
        },

        Commands::List => {
            let documents = cmd_list(&engine);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                print_listing(&documents);
            }
        }

        Commands::Delete { doc_id } => {
            cmd_delete(&engine, &doc_id).await?;
            println!("✓ Document '{}' deleted", doc_id);
        }

        Commands::Check { repair, auto } => {
            let checker = ConsistencyChecker::new(index.clone(), vectors.clone());
            let repairer =
                ConsistencyRepairer::new(config.clone(), index.clone(), vectors.clone(), mutation);

            let (report, outcome) = cmd_check(&checker, &repairer, repair, auto).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_consistency_report(&report);
                if let Some(outcome) = outcome {
                    print_repair_outcome(&outcome);
                }
            }
        }

        Commands::Diagnose => {
            // A critical diagnosis is still a successful call
            let report = cmd_diagnose(&admin).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_health_report(&report);
            }
        }

        Commands::Clear { force } => {
            let stats = cmd_clear(&admin, force).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_clear_stats(&stats);
                if !force {
                    println!("\nNothing was deleted. Pass --force to actually wipe all stores.");
                }
            }
        }

        Commands::RecreateCollection { force } => {
            let recreated = cmd_recreate_collection(&config, vectors.as_ref(), force).await?;
            if recreated {
                println!(
                    "✓ Collection '{}' recreated (dimension {})",
                    config.vector.collection_name, config.embedding.dimension
                );
            } else {
                println!("Nothing done. Pass --force to drop and recreate the collection.");
            }
        }

        Commands::Backup { name } => {
            let path = cmd_backup(&admin, name.as_deref()).await?;
            println!("✓ Backup written to {}", path.display());
        }

        Commands::Restore { path, force } => {
            let restored = cmd_restore(&admin, &path, force).await?;
            if restored {
                println!("✓ Restored from {}", path.display());
            } else {
                println!("Nothing restored. Pass --force to overwrite current state.");
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'archivist init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
