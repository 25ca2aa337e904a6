use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use revdesk_storage::PgReviewStore;
use revdesk_sync::{AppConfig, PollOutcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "revdesk")]
#[command(about = "Marketplace review ingestion and reply drafting")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the review poller until interrupted.
    Serve {
        /// Overrides POLLING_INTERVAL_MINUTES.
        #[arg(long)]
        interval_minutes: Option<u32>,
    },
    /// One manual ingestion cycle over the recent window.
    Sync,
    /// Probe the configured AI backend.
    Health,
    /// Generate reply drafts for a review text.
    Draft {
        text: String,
        #[arg(long)]
        variants: Option<usize>,
        #[arg(long)]
        tone: Option<String>,
        #[arg(long)]
        signature: Option<String>,
        /// Also classify sentiment and category.
        #[arg(long)]
        analyze: bool,
    },
    /// Publish a reply to a review and mark it answered.
    Respond { review_id: String, text: String },
    /// Apply database migrations.
    Migrate,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn connect_store(config: &AppConfig) -> Result<Arc<PgReviewStore>> {
    let store = PgReviewStore::connect(&config.database_url)
        .await
        .context("connecting to DATABASE_URL")?;
    store.migrate().await.context("running migrations")?;
    Ok(Arc::new(store))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    tracing::debug!(?config, "configuration loaded");

    match cli.command.unwrap_or(Commands::Serve {
        interval_minutes: None,
    }) {
        Commands::Serve { interval_minutes } => {
            let store = connect_store(&config).await?;
            let service = Arc::new(revdesk_sync::build_review_service(&config, store)?);
            let mut poller = revdesk_sync::build_poller(&config, service);
            if let Some(minutes) = interval_minutes {
                poller.reschedule(minutes).await?;
            }

            match poller.start().await? {
                PollOutcome::Completed(summary) => tracing::info!(
                    run_id = %summary.run_id,
                    saved = summary.saved,
                    stop = ?summary.stop,
                    "initial poll finished"
                ),
                other => tracing::warn!(outcome = ?other, "initial poll skipped"),
            }

            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            tracing::info!("shutdown requested");
            poller.stop().await?;
        }
        Commands::Sync => {
            let store = connect_store(&config).await?;
            let service = revdesk_sync::build_review_service(&config, store)?;
            let summary = service.run_manual_sync().await?;
            println!(
                "sync complete: run_id={} fetched={} saved={} skipped={} stop={:?}",
                summary.run_id, summary.fetched, summary.saved, summary.skipped, summary.stop
            );
        }
        Commands::Health => {
            let drafts = revdesk_sync::build_draft_service(&config)?;
            let marketplace = revdesk_sync::build_marketplace_client(&config)?;
            let report = drafts.check_health().await;
            print_json(&serde_json::json!({
                "marketplace_credentials": marketplace.validate_credentials(),
                "ai": report,
            }))?;
        }
        Commands::Draft {
            text,
            variants,
            tone,
            signature,
            analyze,
        } => {
            let drafts = revdesk_sync::build_draft_service(&config)?;
            anyhow::ensure!(
                drafts.is_available(),
                "AI backend unavailable: {}",
                drafts
                    .backend()
                    .missing_credential()
                    .unwrap_or("quota exceeded")
            );
            if analyze {
                println!("sentiment: {}", drafts.analyze_sentiment(&text).await);
                println!("category: {}", drafts.categorize_review(&text).await);
            }
            let variants = variants.unwrap_or(drafts.defaults().variants);
            let generated = drafts
                .generate_response_drafts(&text, variants, tone.as_deref(), signature.as_deref(), None)
                .await;
            for (idx, draft) in generated.iter().enumerate() {
                println!("--- draft {} ---\n{draft}", idx + 1);
            }
        }
        Commands::Respond { review_id, text } => {
            let store = connect_store(&config).await?;
            let service = revdesk_sync::build_review_service(&config, store)?;
            let receipt = service.send_response(&review_id, &text).await?;
            println!("response sent via {}", receipt.endpoint);
        }
        Commands::Migrate => {
            connect_store(&config).await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
