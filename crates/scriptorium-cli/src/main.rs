//! Scriptorium CLI - command-line interface for the classical corpus engine.
//!
//! # Usage
//!
//! ```bash
//! # Register a work and its citation scheme
//! scriptorium work add tlg0012.tlg001 --language grc --levels book,line --title Iliad
//! scriptorium work add tlg0059.tlg030 --language grc --levels page:alphanumeric,line
//!
//! # Ingest TEI XML or cited-lines text
//! scriptorium ingest iliad.xml
//! scriptorium ingest aeneid.txt --format lines --id aeneid
//!
//! # Look up a citation
//! scriptorium get tlg0012.tlg001 1.1
//!
//! # Search (lemma-aware)
//! scriptorium search "μῆνις" -n 5
//! scriptorium search "arma" --work aeneid --json
//! ```

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{NewWork, SourceFormat};
use config::CliConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Scriptorium corpus CLI.
///
/// Ingest classical texts, look them up by canonical citation and search
/// them by word form or lemma.
#[derive(Parser)]
#[command(name = "scriptorium", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Custom data directory (default: platform standard location)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: scriptorium.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Manage works
    #[command(subcommand)]
    Work(WorkCommand),

    /// List registered works
    Works,

    /// Ingest a source document
    Ingest {
        /// Source file
        path: PathBuf,

        /// Document id (default: the file path)
        #[arg(long)]
        id: Option<String>,

        /// Markup format (default: tei for .xml, lines otherwise)
        #[arg(long, value_enum)]
        format: Option<SourceFormat>,
    },

    /// Remove a document and all of its text
    Retract {
        /// Document id used at ingest
        document_id: String,
    },

    /// Show the segment at a citation
    Get {
        work_id: String,
        citation: String,
    },

    /// Search the corpus
    Search {
        /// Search query
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        /// Only search this work
        #[arg(long)]
        work: Option<String>,

        /// Only search works in this language (grc, la, ...)
        #[arg(long)]
        language: Option<String>,
    },

    /// Show corpus statistics
    Stats,
}

#[derive(Subcommand)]
enum WorkCommand {
    /// Register a work or update its title and author
    Add {
        /// Work id (e.g. a CTS URN)
        id: String,

        /// Language code (grc, la or generic)
        #[arg(long)]
        language: String,

        /// Citation levels, outermost first, as `name` or `name:kind`
        /// (kind: numeric, alphabetic, alphanumeric; default numeric)
        #[arg(long, value_delimiter = ',', required = true)]
        levels: Vec<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        /// Separator between locators in citations
        #[arg(long)]
        separator: Option<char>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::load(cli.config.as_ref())?;
    let engine = commands::open_engine(cli.data_dir.as_ref(), &config).await?;

    let output = match cli.command {
        Command::Work(WorkCommand::Add {
            id,
            language,
            levels,
            title,
            author,
            separator,
        }) => {
            let work = commands::add_work(
                &engine,
                NewWork {
                    id,
                    language,
                    levels,
                    title,
                    author,
                    separator,
                },
            )
            .await?;
            format!("Registered {} ({})", work.id, work.schema.describe())
        }
        Command::Works => output::format_works(&commands::list_works(&engine)?, cli.json),
        Command::Ingest { path, id, format } => {
            let report = commands::ingest(&engine, &path, id, format).await?;
            output::format_report(&report, cli.json)
        }
        Command::Retract { document_id } => {
            if commands::retract(&engine, &document_id).await? {
                format!("Retracted {}", document_id)
            } else {
                format!("No document {}", document_id)
            }
        }
        Command::Get { work_id, citation } => {
            let view = commands::get(&engine, &work_id, &citation)?;
            output::format_segment(&view, cli.json)
        }
        Command::Search {
            query,
            limit,
            work,
            language,
        } => {
            let result = commands::search(&engine, &query, limit, work, language).await?;
            if cli.json {
                output::format_search_json(&query, &result)
            } else {
                output::format_search_human(&query, &result)
            }
        }
        Command::Stats => output::format_stats(&commands::stats(&engine)?, cli.json),
    };

    println!("{}", output);
    Ok(())
}
