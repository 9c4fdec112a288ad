mod book_cmds;
mod chapter_cmds;
mod config;
mod log_cmd;
mod resolve;
mod run_cmd;
mod status_cmd;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::PgPool;

use folio_core::export::TextExporter;
use folio_core::generator::build_generator;
use folio_core::notify::{Notifier, TracingNotifier, WebhookNotifier};
use folio_core::workflow::Engine;
use folio_db::pool;
use folio_db::postgres::PgStore;
use folio_db::store::Store;

use config::FolioConfig;

#[derive(Parser)]
#[command(name = "folio", about = "Stage-gated workflow for LLM-assisted book production")]
struct Cli {
    /// Database URL (overrides FOLIO_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a folio config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/folio")]
        db_url: String,
        /// Generation provider: anthropic, openai, or ollama
        #[arg(long, default_value = "anthropic")]
        provider: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the folio database (requires config file or env vars)
    DbInit,
    /// Create a new book from a title and outline briefing
    Create {
        /// Book title
        title: String,
        /// Briefing notes the outline will be generated from
        #[arg(long)]
        briefing: String,
    },
    /// Bulk-create books from a JSON file
    Import {
        /// Path to a JSON array of {"title", "briefing"} entries
        file: String,
    },
    /// Show book status and chapter progress (omit book_id to list all)
    Status {
        /// Book ID to show status for (omit to list all books)
        book_id: Option<String>,
    },
    /// List books that still need operator attention
    Pending,
    /// Show the event log
    Logs {
        /// Book ID to filter by (omit for all books)
        book_id: Option<String>,
    },
    /// Show a book's outline draft history
    Drafts {
        /// Book ID
        book_id: String,
    },
    /// Outline operations
    Outline {
        #[command(subcommand)]
        command: OutlineCommands,
    },
    /// Single-chapter operations
    Chapter {
        #[command(subcommand)]
        command: ChapterCommands,
    },
    /// Generate every non-approved chapter for a book
    Chapters {
        /// Book ID
        book_id: String,
        /// Approve each chapter as soon as it generates
        #[arg(long)]
        auto_approve: bool,
    },
    /// Compile an eligible book into its final artifact
    Compile {
        /// Book ID
        book_id: String,
        /// Output formats (repeatable; defaults to txt)
        #[arg(long)]
        format: Vec<String>,
    },
    /// Run the automated end-to-end workflow
    Run {
        /// Book ID
        book_id: String,
        /// Approve the outline without a human decision
        #[arg(long)]
        approve_outline: bool,
        /// Approve each chapter without a human decision
        #[arg(long)]
        approve_chapters: bool,
        /// Output formats (repeatable; defaults to txt)
        #[arg(long)]
        format: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum OutlineCommands {
    /// Generate the outline from the creation briefing
    Generate { book_id: String },
    /// Regenerate the outline from recorded feedback
    Regenerate { book_id: String },
    /// Approve the outline and initialize chapters
    Approve { book_id: String },
    /// Record feedback and request outline changes
    Feedback { book_id: String, notes: String },
}

#[derive(Subcommand)]
pub enum ChapterCommands {
    /// Generate one chapter
    Generate { book_id: String, number: i32 },
    /// Regenerate one chapter from recorded feedback
    Regenerate { book_id: String, number: i32 },
    /// Approve one chapter
    Approve { book_id: String, number: i32 },
    /// Record feedback for one chapter
    Feedback {
        book_id: String,
        number: i32,
        notes: String,
    },
}

/// Execute the `folio init` command: write the config file.
fn cmd_init(db_url: &str, provider: &str, force: bool) -> anyhow::Result<()> {
    provider.parse::<folio_core::generator::Provider>()?;

    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        generator: config::GeneratorSection {
            provider: provider.to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  generator.provider = {provider}");
    println!();
    println!("Next: run `folio db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `folio db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = FolioConfig::resolve(cli_db_url)?;

    println!("Initializing folio database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;
    db_pool.close().await;

    println!("folio db-init complete.");
    Ok(())
}

/// Build the engine from resolved configuration. Returns the pool handle
/// alongside so callers can close it cleanly.
async fn build_engine(resolved: &FolioConfig) -> anyhow::Result<(Engine, PgPool)> {
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool.clone()));
    let generator = build_generator(&resolved.generator)?;
    let notifier: Arc<dyn Notifier> = match &resolved.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(TracingNotifier),
    };
    let exporter = Arc::new(TextExporter::new(&resolved.output_dir));

    let engine = Engine::new(store, generator, notifier, exporter, resolved.engine.clone());
    Ok((engine, db_pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            provider,
            force,
        } => {
            cmd_init(&db_url, &provider, force)?;
            return Ok(());
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
            return Ok(());
        }
        _ => {}
    }

    let resolved = FolioConfig::resolve(cli.database_url.as_deref())?;
    let (engine, db_pool) = build_engine(&resolved).await?;

    let result = match cli.command {
        Commands::Init { .. } | Commands::DbInit => unreachable!("handled above"),
        Commands::Create { title, briefing } => {
            book_cmds::run_create(&engine, &title, &briefing).await
        }
        Commands::Import { file } => book_cmds::run_import(&engine, &file).await,
        Commands::Status { book_id } => {
            status_cmd::run_status(&engine, book_id.as_deref()).await
        }
        Commands::Pending => status_cmd::run_pending(&engine).await,
        Commands::Logs { book_id } => log_cmd::run_logs(&engine, book_id.as_deref()).await,
        Commands::Drafts { book_id } => log_cmd::run_drafts(&engine, &book_id).await,
        Commands::Outline { command } => book_cmds::run_outline_command(command, &engine).await,
        Commands::Chapter { command } => {
            chapter_cmds::run_chapter_command(command, &engine).await
        }
        Commands::Chapters {
            book_id,
            auto_approve,
        } => chapter_cmds::run_generate_all(&engine, &book_id, auto_approve).await,
        Commands::Compile { book_id, format } => {
            let id = resolve::parse_book_id(&book_id)?;
            let formats = if format.is_empty() { None } else { Some(format) };
            match engine.compile(id, formats).await {
                Ok(book) => {
                    println!("Book compiled: {}", book.output_artifact_path);
                    Ok(())
                }
                Err(e) => Err(resolve::engine_error(e)),
            }
        }
        Commands::Run {
            book_id,
            approve_outline,
            approve_chapters,
            format,
        } => {
            run_cmd::run_workflow(&engine, &book_id, approve_outline, approve_chapters, format)
                .await
        }
    };

    db_pool.close().await;
    result
}
