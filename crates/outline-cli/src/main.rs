use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use outline_editor_core::{
    EditorRope, concept_excerpts, parse_document, parse_operations, referenced_names,
    serialize_document, serialize_document_pretty,
};
use outline_editor_crdt::{LinkedStore, LoroTextBuffer, SessionConfig, replay, spawn_session};

use store::{FileBacklinks, FileStore};

mod store;

#[derive(Parser)]
#[command(version, about = "Outline - replay, inspect and edit stored outline documents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an operation log against a stored document
    Replay {
        /// Stored document (JSON array of nodes)
        document: PathBuf,

        /// Operation log (JSON array of operations)
        log: PathBuf,

        /// Write the result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },
    /// List the concepts a document references
    Refs {
        /// Stored document (JSON array of nodes)
        document: PathBuf,

        /// Print excerpts of the blocks mentioning this concept instead
        #[arg(long)]
        name: Option<String>,
    },
    /// Apply an operation log to a document through a saving session
    Edit {
        /// Document address within the store
        address: String,

        /// Operation log (JSON array of operations)
        log: PathBuf,

        /// Store directory holding `<address>.json` files
        #[arg(long, env = "OUTLINE_STORE", default_value = ".")]
        store: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            document,
            log,
            output,
            pretty,
        } => {
            let replayed = replay_files(&document, &log, pretty)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, replayed).into_diagnostic()?;
                    println!("✓ Output: {}", path.display());
                }
                None => println!("{replayed}"),
            }
        }
        Commands::Refs { document, name } => {
            let stored = std::fs::read_to_string(&document).into_diagnostic()?;
            for line in reference_lines(&stored, name.as_deref())? {
                println!("{line}");
            }
        }
        Commands::Edit {
            address,
            log,
            store,
        } => {
            let log = std::fs::read_to_string(&log).into_diagnostic()?;
            let config = SessionConfig::from_env()?;
            if edit_document(&store, &address, &log, config).await? {
                println!("✓ Saved {address}");
            } else {
                println!("✓ {address} unchanged");
            }
        }
    }

    Ok(())
}

fn replay_files(document: &Path, log: &Path, pretty: bool) -> Result<String> {
    let stored = std::fs::read_to_string(document).into_diagnostic()?;
    let log = std::fs::read_to_string(log).into_diagnostic()?;
    let snapshot = replay(&stored, &log)?;
    let serialized = if pretty {
        serialize_document_pretty(&snapshot)?
    } else {
        serialize_document(&snapshot)?
    };
    Ok(serialized)
}

fn reference_lines(stored: &str, name: Option<&str>) -> Result<Vec<String>> {
    let root = parse_document::<EditorRope>(stored)?;
    let lines = match name {
        Some(name) => concept_excerpts(&root, name)
            .into_iter()
            .map(|excerpt| format!("{}\t{}", excerpt.path, excerpt.text))
            .collect(),
        None => referenced_names(&root)
            .into_iter()
            .map(|name| name.to_string())
            .collect(),
    };
    Ok(lines)
}

/// Open `address` in a session over the store directory, apply the log and
/// close, flushing the save. Returns whether the document changed.
async fn edit_document(
    store_dir: &Path,
    address: &str,
    log: &str,
    config: SessionConfig,
) -> Result<bool> {
    let ops = parse_operations::<LoroTextBuffer>(log)?;
    let store = LinkedStore::new(
        FileStore::new(store_dir),
        FileBacklinks::new(store_dir.join("backlinks.json")),
    );
    let session = spawn_session(store, config);

    session.open(address).await?;
    let changed = session.edit(ops).await?;
    tracing::info!(%address, changed, "applied operation log");
    session.close().await?;
    Ok(changed)
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .expect("couldn't set the miette hook");
    miette::set_panic_hook();
}
