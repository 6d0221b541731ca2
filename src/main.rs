//! wikifeed CLI
//!
//! Thin terminal front end over the feed engine: a continuous random-article
//! feed, single-batch fetches, and inspection of languages, likes, and
//! stored preferences.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wikifeed::config::Config;
use wikifeed::feed::{FeedController, FeedOptions};
use wikifeed::languages::LANGUAGES;
use wikifeed::likes::LikedArticles;
use wikifeed::preload::ImagePreloader;
use wikifeed::prefs::{PreferenceStore, KEY_LANGUAGE, KEY_LIKED};
use wikifeed::wiki::{ArticleSource, WikipediaClient, WikipediaClientConfig};

/// wikifeed - random Wikipedia article feed for the terminal
#[derive(Parser, Debug)]
#[command(name = "wikifeed")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded random-article feed over the Wikipedia Action API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a continuous feed, printing articles as they arrive
    Run {
        /// Delay between fetches (e.g. "5s", "1m")
        #[arg(short, long)]
        interval: Option<String>,

        /// Language id (overrides the persisted selection)
        #[arg(long)]
        language: Option<String>,
    },

    /// Fetch a single batch of articles
    Fetch {
        /// Language id (overrides the persisted selection)
        #[arg(long)]
        language: Option<String>,

        /// Output format (json, table, summary)
        #[arg(short, long, default_value = "summary")]
        output: String,
    },

    /// List supported language editions
    Languages,

    /// Show liked articles
    Likes {
        /// Remove all liked articles
        #[arg(long, default_value = "false")]
        clear: bool,
    },

    /// Show configuration and connectivity status
    Status,

    /// Reset stored preferences
    Reset {
        /// What to reset: lang, likes, or all
        #[arg(short, long, default_value = "all")]
        what: String,
    },
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

/// Everything the subcommands need, wired together once
struct Engine {
    controller: Arc<FeedController>,
    likes: Arc<LikedArticles>,
    client: Arc<WikipediaClient>,
}

async fn build_engine(config: &Config) -> Result<Engine> {
    let client_config = WikipediaClientConfig {
        batch_size: config.batch_size,
        thumb_size: config.thumb_size,
        request_timeout: config.request_timeout(),
        connect_timeout: config.connect_timeout(),
        user_agent: config.user_agent.clone(),
    };
    let client = Arc::new(WikipediaClient::new(client_config)?);

    // The preloader shares the fetcher's connection pool
    let preloader = Arc::new(ImagePreloader::new(
        client.inner().clone(),
        config.preload_concurrency,
        config.preload_timeout(),
    ));

    let prefs = Arc::new(PreferenceStore::open(&config.data_dir).await?);

    let controller = Arc::new(
        FeedController::new(
            client.clone(),
            preloader,
            prefs.clone(),
            FeedOptions::from_config(config),
            &config.default_language,
        )
        .await,
    );

    let likes = Arc::new(LikedArticles::load(prefs).await);

    Ok(Engine {
        controller,
        likes,
        client,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    let session_id = uuid::Uuid::new_v4().to_string();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        session_id = %session_id,
        "Starting wikifeed"
    );

    let config = Config::load()?;

    match cli.command {
        Commands::Run { interval, language } => {
            run_feed(config, interval, language).await?;
        }
        Commands::Fetch { language, output } => {
            fetch_once(config, language, &output).await?;
        }
        Commands::Languages => {
            list_languages();
        }
        Commands::Likes { clear } => {
            show_likes(config, clear).await?;
        }
        Commands::Status => {
            show_status(config).await?;
        }
        Commands::Reset { what } => {
            reset_preferences(config, &what).await?;
        }
    }

    Ok(())
}

/// Continuous feed loop with graceful ctrl-c shutdown
async fn run_feed(config: Config, interval: Option<String>, language: Option<String>) -> Result<()> {
    let engine = build_engine(&config).await?;
    let controller = engine.controller;

    if let Some(ref id) = language {
        controller.set_language(id).await;
    }

    let tick = match interval {
        Some(ref spec) => humantime::parse_duration(spec)?,
        None => config.fetch_interval(),
    };

    info!(
        language = %controller.language().id,
        interval_ms = tick.as_millis() as u64,
        "Feed running, ctrl-c to stop"
    );

    let mut printed: HashSet<u64> = HashSet::new();
    let mut ticker = tokio::time::interval(tick);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received ctrl-c, stopping feed");
                break;
            }
            _ = ticker.tick() => {
                controller.fetch_more().await;

                let snapshot = controller.snapshot();
                if let Some(error) = snapshot.error {
                    error!(title = %error.title, message = %error.message, "Feed error");
                    continue;
                }

                let mut current: HashSet<u64> = HashSet::with_capacity(snapshot.articles.len());
                for article in &snapshot.articles {
                    current.insert(article.page_id);
                    if printed.insert(article.page_id) {
                        println!("▸ {}", article.display_title);
                        println!("  {}", article.snippet(160));
                        println!("  {}", article.url);
                        println!();
                    }
                }
                // Ids evicted from the capped feed never print again
                printed.retain(|id| current.contains(id));
            }
        }
    }

    let stats = controller.stats();
    info!(
        fetched = stats.fetched_total,
        evicted = stats.evicted_total,
        duplicates = stats.duplicates_skipped,
        "Feed stopped"
    );

    Ok(())
}

/// Fetches one batch and prints it
async fn fetch_once(config: Config, language: Option<String>, output_format: &str) -> Result<()> {
    let engine = build_engine(&config).await?;
    let controller = engine.controller;

    if let Some(ref id) = language {
        controller.set_language(id).await;
    }

    controller.fetch_more().await;

    let snapshot = controller.snapshot();
    if let Some(error) = snapshot.error {
        error!(title = %error.title, message = %error.message, "Fetch failed");
        anyhow::bail!("{}: {}", error.title, error.message);
    }

    match output_format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&snapshot.articles)?);
        }
        "table" => {
            println!("\n{:<12} {:<40} {}", "Page ID", "Title", "URL");
            println!("{}", "-".repeat(100));
            for article in &snapshot.articles {
                println!(
                    "{:<12} {:<40} {}",
                    article.page_id,
                    article.snippet(38),
                    article.url
                );
            }
            println!("\nTotal: {} articles", snapshot.articles.len());
        }
        _ => {
            println!("\nFetched {} articles ({})", snapshot.articles.len(), controller.language().id);
            println!("====================================");
            for article in &snapshot.articles {
                println!("- {} ({})", article.display_title, article.url);
            }
        }
    }

    Ok(())
}

fn list_languages() {
    println!("\n{:<6} {:<14} {}", "ID", "Name", "API origin");
    println!("{}", "-".repeat(70));
    for lang in LANGUAGES.iter() {
        println!("{:<6} {:<14} {}", lang.id, lang.name, lang.api_origin);
    }
    println!("\nDefault: {}", LANGUAGES[0].id);
}

async fn show_likes(config: Config, clear: bool) -> Result<()> {
    let prefs = Arc::new(PreferenceStore::open(&config.data_dir).await?);
    let likes = LikedArticles::load(prefs).await;

    if clear {
        likes.clear().await?;
        println!("Cleared all liked articles");
        return Ok(());
    }

    if likes.is_empty() {
        println!("No liked articles yet");
        return Ok(());
    }

    println!("\n{} liked articles:", likes.len());
    for liked in likes.list() {
        println!(
            "- {} (liked {})",
            liked.article.display_title,
            liked.liked_at.format("%Y-%m-%d %H:%M")
        );
        println!("  {}", liked.article.url);
    }

    Ok(())
}

async fn show_status(config: Config) -> Result<()> {
    let engine = build_engine(&config).await?;

    println!("\nwikifeed status");
    println!("================\n");

    let language = engine.controller.language();
    println!("Language:     {} ({})", language.id, language.name);
    println!("API origin:   {}", language.api_origin);
    println!("Batch size:   {}", config.batch_size);
    println!("Retained cap: {}", config.max_retained_articles);
    println!("Data dir:     {}", config.data_dir.display());
    println!("Likes:        {}", engine.likes.len());

    print!("Connectivity: ");
    match engine.client.health_check(&language).await {
        Ok(true) => println!("ok"),
        Ok(false) => println!("unreachable"),
        Err(e) => {
            warn!(error = %e, "Health check errored");
            println!("error");
        }
    }

    Ok(())
}

async fn reset_preferences(config: Config, what: &str) -> Result<()> {
    let prefs = PreferenceStore::open(&config.data_dir).await?;

    match what {
        "lang" => {
            prefs.remove(KEY_LANGUAGE).await?;
            println!("Reset language selection");
        }
        "likes" => {
            prefs.remove(KEY_LIKED).await?;
            println!("Reset liked articles");
        }
        "all" => {
            prefs.remove(KEY_LANGUAGE).await?;
            prefs.remove(KEY_LIKED).await?;
            println!("Reset all preferences");
        }
        other => {
            anyhow::bail!("Unknown reset target: {} (expected lang, likes, or all)", other);
        }
    }

    Ok(())
}
