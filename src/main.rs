//! # docqa CLI
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa status` | Document count, index state, models |
//! | `docqa files` | List stored PDFs |
//! | `docqa upload <path>` | Store and index a PDF |
//! | `docqa delete <name>` | Delete a stored PDF |
//! | `docqa reindex` | Rebuild the index from every stored PDF |
//! | `docqa ask "<question>"` | Answer a question from the indexed PDFs |
//! | `docqa history` | Past questions and answers |
//! | `docqa serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{commands, config, logging, server};

/// docqa — answer questions from your PDF documents.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa — index PDF documents and answer questions grounded in them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show document count, index state and configured models.
    Status,

    /// List stored PDFs.
    Files,

    /// Store a PDF and add its passages to the index.
    Upload {
        /// Path to the PDF. Only the file name is kept.
        path: PathBuf,
    },

    /// Delete a stored PDF.
    ///
    /// Passages already indexed from it remain until the next `reindex`.
    Delete {
        /// File name as shown by `docqa files`.
        name: String,
    },

    /// Discard the index and rebuild it from every stored PDF.
    Reindex,

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// User key the exchange is recorded under.
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Show past questions and answers, newest first.
    History {
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Status => commands::run_status(&cfg).await?,
        Commands::Files => commands::run_files(&cfg).await?,
        Commands::Upload { path } => commands::run_upload(&cfg, &path).await?,
        Commands::Delete { name } => commands::run_delete(&cfg, &name).await?,
        Commands::Reindex => commands::run_reindex(&cfg).await?,
        Commands::Ask { question, user } => commands::run_ask(&cfg, &question, &user).await?,
        Commands::History { user } => commands::run_history(&cfg, &user).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
