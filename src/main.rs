//! # askdocs CLI
//!
//! ## Usage
//!
//! ```bash
//! askdocs --config ./config/askdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdocs index build` | Chunk, embed, and index the documents directory |
//! | `askdocs ask "<query>"` | Answer one query from the terminal |
//! | `askdocs serve` | Start the HTTP server |
//! | `askdocs tools list` | Print the tool catalog offered to the model |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from ./docs
//! askdocs index build --docs ./docs
//!
//! # Ask a question, continuing an earlier session
//! askdocs ask "Can unused leave be carried forward?" --session 3f6c…
//!
//! # Serve POST /ask on [server].bind
//! RUST_LOG=askdocs=debug askdocs serve
//! ```

use askdocs::{chat, config, context::AppContext, index_cmd, server, tools::ToolKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// askdocs: agentic question answering over your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. API keys are read from `OPENAI_API_KEY` and `HUGGINGFACE_API_KEY`.
#[derive(Parser)]
#[command(
    name = "askdocs",
    about = "Agentic question answering over a private document corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askdocs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Answer one query and print the answer with its sources.
    Ask {
        /// The question.
        query: String,

        /// Continue an existing session. A new id is generated when omitted.
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Inspect the tools offered to the model.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Build the index from the documents directory and write it to `[index].dir`.
    ///
    /// Loads every `.txt` and `.pdf` file, splits it into overlapping token
    /// windows, embeds the windows in batches, and replaces the artifacts.
    Build {
        /// Documents directory. Overrides `[index].docs_dir`.
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List the built-in tools with their parameter schemas.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Tools {
        action: ToolsAction::List,
    } = &cli.command
    {
        for kind in ToolKind::ALL {
            let schema = kind.schema();
            println!("{}", schema.name);
            println!("  {}", schema.description);
            println!("  parameters: {}", schema.parameters);
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index {
            action: IndexAction::Build { docs, dry_run },
        } => {
            index_cmd::run_index_build(&cfg, docs.as_deref(), dry_run).await?;
        }
        Commands::Ask { query, session } => {
            let query = query.trim();
            if query.is_empty() {
                anyhow::bail!("query must not be empty");
            }
            let ctx = AppContext::from_config(&cfg).await?;
            let response = chat::process_chat(&ctx.orchestrator, query, session).await?;
            println!("{}", response.answer);
            if !response.source.is_empty() {
                println!();
                println!("Sources:");
                for source in &response.source {
                    println!("  - {}", source);
                }
            }
            println!();
            println!("session: {}", response.session_id);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Tools { .. } => {}
    }

    Ok(())
}
