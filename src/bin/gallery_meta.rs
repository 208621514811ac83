//! CLI entry point for gallery-meta: metadata export tool.

use clap::{Parser, Subcommand};
use gallery::metadata::mode::database_path;
use gallery::metadata::sqlite::SqliteMetadataStore;
use gallery::metadata::store::{ImageRecord, MetadataStore};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "gallery-meta", about = "Gallery metadata export tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export images and account summaries to JSON
    Export {
        /// YAML config to read the database URL from. `DATABASE_URL`
        /// applies on top of it.
        #[arg(long)]
        config: Option<String>,
        /// Database path or `sqlite://` URL; overrides the config.
        #[arg(long)]
        db: Option<String>,
        #[arg(long, default_value = "-")]
        output: String,
    },
}

#[derive(Serialize)]
struct AccountSummary {
    email: String,
    #[serde(rename = "isAdmin")]
    is_admin: bool,
}

#[derive(Serialize)]
struct Export {
    images: Vec<ImageRecord>,
    users: Vec<AccountSummary>,
}

fn resolve_db_url(config: Option<&str>, db: Option<String>) -> anyhow::Result<String> {
    if let Some(db) = db {
        return Ok(db);
    }
    gallery::config::resolve_config(config)?
        .database
        .url
        .ok_or_else(|| anyhow::anyhow!("no database URL in config or DATABASE_URL"))
}

fn export(config: Option<String>, db: Option<String>) -> anyhow::Result<String> {
    let url = resolve_db_url(config.as_deref(), db)?;
    let path = database_path(&url);
    if path != ":memory:" && !std::path::Path::new(path).exists() {
        anyhow::bail!("database {path} does not exist");
    }
    let store = SqliteMetadataStore::new(path)?;

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let images = runtime.block_on(store.list_images())?;
    let users = store
        .user_summaries()?
        .into_iter()
        .map(|(email, is_admin)| AccountSummary { email, is_admin })
        .collect();

    Ok(serde_json::to_string_pretty(&Export { images, users })?)
}

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let rc = match cli.command {
        Commands::Export { config, db, output } => run_export(config, db, output),
    };
    std::process::exit(rc);
}

fn run_export(config: Option<String>, db: Option<String>, output: String) -> i32 {
    match export(config, db) {
        Ok(result) => {
            if output == "-" {
                println!("{}", result);
            } else {
                if let Err(e) = std::fs::write(&output, format!("{}\n", result)) {
                    eprintln!("Error writing output: {}", e);
                    return 1;
                }
                eprintln!("Exported to {}", output);
            }
            0
        }
        Err(e) => {
            eprintln!("Error exporting: {:#}", e);
            1
        }
    }
}
