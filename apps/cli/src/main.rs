//! Playbook CLI - command-line interface for a playbook directory.
//!
//! This CLI provides a `pbk` command for seeding, curating, querying and
//! maintaining an agent playbook stored on disk.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{bullets, init, insight, maintenance, retrieve};

/// Playbook CLI - evolving strategy store for agents
///
/// A playbook is a set of short strategies ("bullets") with helpful/harmful
/// counters. Reflection insights are curated into it incrementally.
#[derive(Parser, Debug)]
#[command(
    name = "pbk",
    author,
    version,
    about = "Playbook - evolving strategy store for agents",
    long_about = "pbk manages a playbook directory: bullets grouped by section, retrieved by similarity and refined through curated insights and feedback."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Playbook directory (overrides PLAYBOOK_DIR, defaults to ./.playbook)
    #[arg(short = 'd', long, global = true)]
    dir: Option<PathBuf>,

    /// Configuration file (defaults to <dir>/playbook.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a playbook directory
    ///
    /// Creates the directory, a default playbook.toml and an empty snapshot.
    Init {
        /// Overwrite an existing playbook.toml
        #[arg(long)]
        force: bool,
    },

    /// Add a bullet directly, without curation
    Add {
        /// Section for the bullet
        #[arg(short, long, default_value = "general")]
        section: String,

        /// Bullet content
        content: Vec<String>,
    },

    /// List bullets
    List {
        /// Only this section
        #[arg(short, long)]
        section: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one bullet
    Show {
        /// Bullet ID
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieve the bullets most relevant to a query
    Retrieve {
        /// Query text
        query: Vec<String>,

        /// Number of bullets (defaults to retrieval.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print retrieved bullets as a prompt context block
    Context {
        /// Query text
        query: Vec<String>,

        /// Number of bullets (defaults to retrieval.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Record feedback for bullets
    Feedback {
        /// Bullet IDs
        #[arg(required = true)]
        ids: Vec<String>,

        /// Count as harmful instead of helpful
        #[arg(long)]
        harmful: bool,
    },

    /// Curate a reflection insight into the playbook
    Insight {
        /// Insight text
        text: Vec<String>,

        /// Section for a new bullet
        #[arg(short, long, default_value = "general")]
        section: String,

        /// Confidence between 0.0 and 1.0
        #[arg(long, default_value = "0.8")]
        confidence: f32,

        /// Only print the planned delta
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a bullet
    Remove {
        /// Bullet ID
        id: String,
    },

    /// Reset a bullet's helpful/harmful counters to zero
    Reset {
        /// Bullet ID
        id: String,
    },

    /// Remove bullets that were reported harmful more often than helpful
    Prune {
        /// Minimum harmful-minus-helpful margin
        #[arg(long, default_value = "2")]
        margin: u32,
    },

    /// Rebuild the vector index and check it against the bullets
    Rebuild,

    /// Show playbook statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show applied deltas, newest first
    History {
        /// Maximum number of records
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let dir = config::resolve_dir(args.dir);
    let config_path = args.config;

    let load = || config::CliContext::load(dir.clone(), config_path.as_deref());

    match command {
        Command::Init { force } => init::execute(&dir, config_path.as_deref(), force).await,
        Command::Add { section, content } => {
            bullets::add(&load()?, &section, &content.join(" ")).await
        }
        Command::List { section, json } => bullets::list(&load()?, section.as_deref(), json).await,
        Command::Show { id, json } => bullets::show(&load()?, &id, json).await,
        Command::Retrieve { query, top_k, json } => {
            retrieve::retrieve(&load()?, &query.join(" "), top_k, json).await
        }
        Command::Context { query, top_k } => {
            retrieve::context(&load()?, &query.join(" "), top_k).await
        }
        Command::Feedback { ids, harmful } => bullets::feedback(&load()?, &ids, !harmful).await,
        Command::Insight { text, section, confidence, dry_run, json } => {
            insight::execute(&load()?, &text.join(" "), &section, confidence, dry_run, json).await
        }
        Command::Remove { id } => bullets::remove(&load()?, &id).await,
        Command::Reset { id } => bullets::reset(&load()?, &id).await,
        Command::Prune { margin } => bullets::prune(&load()?, margin).await,
        Command::Rebuild => maintenance::rebuild(&load()?).await,
        Command::Stats { json } => maintenance::stats(&load()?, json).await,
        Command::History { limit, json } => maintenance::history(&load()?, limit, json).await,
    }
}
