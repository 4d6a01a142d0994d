use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fakedaily_adapters::{extract_chat_articles, read_batch_file, BatchFormat};
use fakedaily_storage::{ArticleFilter, ArticleStore, MemoryArticleStore, SqliteArticleStore};
use fakedaily_web::{export_articles, whatsapp, AppState, WebConfig};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "fakedaily")]
#[command(about = "FakeDaily satirical news CMS")]
struct Cli {
    /// SQLite database, e.g. `sqlite://database/articles.db`.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the reader, admin pages and admin API.
    Serve {
        #[arg(long, env = "FAKEDAILY_WEB_PORT")]
        port: Option<u16>,
    },
    /// Create the database and its schema.
    InitDb,
    /// Reconcile a batch file against the store.
    Import {
        file: PathBuf,
        /// json, csv or chat; guessed from the extension when omitted.
        #[arg(long)]
        format: Option<BatchFormat>,
        /// Only take chat messages from this sender.
        #[arg(long)]
        sender: Option<String>,
        /// Report what would happen without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Write every article with its images as JSON.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print an article formatted for WhatsApp.
    Whatsapp { id: i64 },
    /// Turn a WhatsApp chat export into an importable JSON batch.
    ExtractChat {
        file: PathBuf,
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fakedaily=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = WebConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            fakedaily_web::serve(AppState::from_config(config).await?).await?;
        }
        Commands::InitDb => {
            open_store(&config).await?;
            println!("database ready: {}", config.database_url);
        }
        Commands::Import {
            file,
            format,
            sender,
            dry_run,
        } => {
            let format = format.unwrap_or_else(|| BatchFormat::from_path(&file));
            run_import(&config, &file, format, sender.as_deref(), dry_run).await?;
        }
        Commands::Export { out } => {
            let store = open_store(&config).await?;
            let articles = export_articles(&store, &config, &ArticleFilter::default()).await?;
            let doc = json!({ "success": true, "count": articles.len(), "articles": articles });
            write_output(out.as_deref(), &serde_json::to_string_pretty(&doc)?)?;
            info!(count = articles.len(), "articles exported");
        }
        Commands::Whatsapp { id } => {
            let store = open_store(&config).await?;
            let Some(article) = store.get_article(id).await? else {
                bail!("article {id} not found");
            };
            println!(
                "{}",
                whatsapp::format_article(&article.title, &article.content, article.author.as_deref())
            );
        }
        Commands::ExtractChat { file, sender, out } => {
            let chat = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let found = extract_chat_articles(&chat, sender.as_deref());
            let articles: Vec<_> = found
                .iter()
                .map(|item| -> Result<_, serde_json::Error> {
                    let mut entry = serde_json::to_value(item.to_draft())?;
                    entry["image"] = json!(item.image);
                    entry["sender"] = json!(item.sender);
                    Ok(entry)
                })
                .collect::<Result<_, _>>()?;
            let doc = json!({ "articles": articles });
            write_output(out.as_deref(), &serde_json::to_string_pretty(&doc)?)?;
            info!(articles = found.len(), file = %file.display(), "chat export scanned");
        }
    }

    Ok(())
}

async fn open_store(config: &WebConfig) -> Result<SqliteArticleStore> {
    SqliteArticleStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening article store {}", config.database_url))
}

async fn run_import(
    config: &WebConfig,
    file: &Path,
    format: BatchFormat,
    sender: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let batch = read_batch_file(file, format, sender)?;
    let reconciler = config.import.build_reconciler()?;
    let store = open_store(config).await?;

    let report = if dry_run {
        // Same decisions against a scratch copy, so within-batch duplicates
        // still see earlier candidates.
        let existing = store.list_articles(&ArticleFilter::default()).await?;
        let scratch = MemoryArticleStore::seeded(existing).await;
        reconciler.reconcile(&scratch, batch).await?
    } else {
        reconciler.reconcile(&store, batch).await?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        file = %file.display(),
        dry_run,
        imported = report.imported,
        updated = report.updated,
        skipped = report.skipped,
        rejected = report.rejected,
        failed = report.failed,
        "import finished"
    );
    Ok(())
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, format!("{text}\n"))
                .with_context(|| format!("writing {}", path.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
