use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod db;
mod error;
mod leaderboard;
mod models;
mod popularity;
mod report;
mod search;
mod similarity;
mod store;

use cache::JsonFileCache;
use config::Config;
use db::PgNoteStore;
use models::{NoteFilters, NoteType, PageRequest, SortMode, DEFAULT_PAGE_SIZE};
use popularity::PopularityService;
use store::NoteStore;

#[derive(Parser)]
#[command(name = "noteshare-ranking")]
#[command(about = "Fuzzy search and daily popularity ranking for shared lecture notes", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Popularity snapshot location (overrides NOTESHARE_CACHE_PATH)
    #[arg(long, global = true)]
    cache: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import notes from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Typo-tolerant search; an empty query lists notes in sort order
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long = "type", value_enum)]
        note_type: Option<NoteType>,
        #[arg(long, value_enum, default_value_t = SortMode::Newest)]
        sort: SortMode,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: usize,
    },
    /// Show the daily popularity ranking
    Popular {
        #[arg(long)]
        course: Option<String>,
        #[arg(long = "type", value_enum)]
        note_type: Option<NoteType>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: usize,
    },
    /// Rank uploaders by stars received
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report of popular notes and top contributors
    Report {
        #[arg(long)]
        course: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("NOTESHARE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut config = Config::load()?;
    if let Some(path) = cli.cache {
        config.cache_path = path;
    }
    let pool = connect(&config).await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} notes from {}.", csv.display());
        }
        Commands::Search {
            query,
            course,
            note_type,
            sort,
            page,
            limit,
        } => {
            let store = PgNoteStore::new(pool);
            let filters = NoteFilters::new(course.as_deref(), note_type);
            let request = PageRequest::new(page, limit);
            let results = search::search(
                &store,
                &query,
                &filters,
                sort,
                request,
                config.search_window,
            )
            .await?;

            if results.items.is_empty() {
                println!("No notes matched.");
                return Ok(());
            }

            let qualifier = if results.approximate_total { "at least " } else { "" };
            println!(
                "Page {} of results ({qualifier}{} matching notes):",
                request.page, results.total
            );
            for item in results.items.iter() {
                println!(
                    "- #{} {} ({}, {}) {} downloads, rating {:.1}",
                    item.record.id,
                    item.record.title,
                    item.record.course,
                    item.record.note_type,
                    item.record.downloads,
                    item.record.rating_or_zero()
                );
            }
        }
        Commands::Popular {
            course,
            note_type,
            page,
            limit,
        } => {
            let service =
                PopularityService::new(PgNoteStore::new(pool), JsonFileCache::new(&config.cache_path));
            let filters = NoteFilters::new(course.as_deref(), note_type);
            let results = service.popular(&filters, PageRequest::new(page, limit)).await;

            match results.computed_at {
                Some(computed_at) => println!(
                    "Popular notes ({} total, updated {}):",
                    results.total,
                    computed_at.format("%Y-%m-%d %H:%M UTC")
                ),
                None => {
                    println!("No popularity ranking available yet.");
                    return Ok(());
                }
            }
            for item in results.items.iter() {
                println!(
                    "- #{} {} ({}, {}) score {:.2}: {} downloads, rating {:.1}",
                    item.record.id,
                    item.record.title,
                    item.record.course,
                    item.record.note_type,
                    item.score,
                    item.record.downloads,
                    item.record.rating_or_zero()
                );
            }
        }
        Commands::Leaderboard { limit } => {
            let store = PgNoteStore::new(pool);
            let contributors = store.fetch_contributors().await?;
            let ranked = leaderboard::rank_contributors(&contributors);

            if ranked.is_empty() {
                println!("No contributors yet.");
                return Ok(());
            }

            println!("Top contributors:");
            for (rank, entry) in ranked.iter().take(limit).enumerate() {
                println!(
                    "{}. {} with {} points ({} notes, {} downloads, avg rating {:.1})",
                    rank + 1,
                    entry.name,
                    entry.points,
                    entry.notes_count,
                    entry.total_downloads,
                    entry.avg_rating
                );
            }
        }
        Commands::Report { course, out } => {
            let service =
                PopularityService::new(PgNoteStore::new(pool), JsonFileCache::new(&config.cache_path));
            let filters = NoteFilters::new(course.as_deref(), None);
            let popular = service.popular(&filters, PageRequest::new(1, 10)).await;
            let contributors = service.store().fetch_contributors().await?;
            let mut leaders = leaderboard::rank_contributors(&contributors);
            leaders.truncate(10);

            let report = report::build_report(course.as_deref(), &popular, &leaders);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
