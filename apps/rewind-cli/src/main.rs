use anyhow::Context;
use clap::{Parser, Subcommand};
use rewind_history::HistoryStore;
use rewind_persist::{FileStore, KeyValueStore};
use rewind_store::{Store, UndoSettings};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod document;

use document::{REMOVE, REPLACE, SET, document_model, parse_value};

/// Key the live document is stored under, next to its history.
const DOCUMENT_KEY: &str = "rewind.document";

#[derive(Parser)]
#[command(name = "rewind-cli", about = "Edit a JSON document with persistent undo/redo")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the document and its history
    #[arg(long, default_value = "./rewind_data")]
    data_dir: PathBuf,

    /// YAML settings (history key, excluded keys and operations)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the document and start a fresh history
    Init {
        /// Document as a JSON object
        json: String,
    },
    /// Set a field (value parsed as JSON, else taken as a string)
    Set { path: String, value: String },
    /// Remove a field or array element
    Remove { path: String },
    /// Undo the last change
    Undo,
    /// Redo the last undone change
    Redo,
    /// Collapse history to the current document
    Reset,
    /// Print the document
    Show,
    /// Print the undo/redo stacks
    History,
    /// Delete the document and its history
    Erase,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let settings = match &cli.config {
        Some(path) => UndoSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => UndoSettings::default(),
    };

    let kv = FileStore::open(&cli.data_dir)
        .with_context(|| format!("opening {}", cli.data_dir.display()))?;
    let mut documents = kv.clone();
    let initial = match documents.get(DOCUMENT_KEY) {
        Some(text) => serde_json::from_str(&text).context("reading stored document")?,
        None => json!({}),
    };

    tracing::debug!(data_dir = %cli.data_dir.display(), key = %settings.history_key, "opening history");
    let history = HistoryStore::open_at(kv, settings.history_key.clone());
    let mut store = Store::new(document_model(initial), history, settings.to_config());
    if store.history().current().is_none() {
        store.save()?;
    }

    match cli.command {
        Commands::Init { json } => {
            let doc: Value = serde_json::from_str(&json).context("parsing document")?;
            store.dispatch(REPLACE, &doc)?;
            store.reset()?;
        }
        Commands::Set { path, value } => {
            store.dispatch(SET, &json!({ "path": path, "value": parse_value(&value) }))?;
        }
        Commands::Remove { path } => {
            store.dispatch(REMOVE, &json!({ "path": path }))?;
        }
        Commands::Undo => {
            if !store.undo()? {
                println!("nothing to undo");
            }
        }
        Commands::Redo => {
            if !store.redo()? {
                println!("nothing to redo");
            }
        }
        Commands::Reset => store.reset()?,
        Commands::Show => {
            println!("{}", serde_json::to_string_pretty(store.state())?);
            return Ok(());
        }
        Commands::History => {
            let history = store.history().state();
            println!("undo ({}):", history.undo.len());
            for snap in &history.undo {
                println!("  {snap}");
            }
            match &history.current {
                Some(snap) => println!("current: {snap}"),
                None => println!("current: (none)"),
            }
            println!("redo ({}):", history.redo.len());
            for snap in &history.redo {
                println!("  {snap}");
            }
            return Ok(());
        }
        Commands::Erase => {
            store.erase_history();
            documents.remove(DOCUMENT_KEY);
            println!("erased {}", cli.data_dir.display());
            return Ok(());
        }
    }

    documents.set(DOCUMENT_KEY, &serde_json::to_string_pretty(store.state())?)?;
    println!("{}", serde_json::to_string_pretty(store.state())?);
    Ok(())
}
