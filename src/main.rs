mod browser;
mod config;
mod db;
mod enrich;
mod models;
mod normalize;
mod pacer;
mod pipeline;
mod server;
mod sources;
mod status;
#[cfg(test)]
mod testing;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use browser::ChromeLauncher;
use config::Config;
use db::Database;
use pipeline::{BatchSummary, IngestRequest, Pipeline};
use sources::Source;
use status::IngestController;

#[derive(Parser)]
#[command(name = "jobsweep")]
#[command(about = "Sweep job boards for postings and keep them in a local pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Run one ingestion batch in the foreground
    Ingest {
        /// native-list (linkedin), search-engine-indirect (xray), alternate-job-board (indeed)
        #[arg(short, long, default_value = "native-list")]
        source: Source,

        /// Search keywords (defaults to SEARCH_KEYWORDS)
        #[arg(short, long)]
        keywords: Option<String>,

        /// Search location (defaults to SEARCH_LOCATION)
        #[arg(short, long)]
        location: Option<String>,
    },

    /// Run a batch now and then every N hours
    Schedule {
        #[arg(long, default_value = "12", value_parser = clap::value_parser!(u64).range(1..))]
        every_hours: u64,

        #[arg(short, long, default_value = "native-list")]
        source: Source,
    },

    /// Start the HTTP control server
    Serve {
        /// Port to listen on (defaults to PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List stored listings
    List {
        /// Only listings not yet actioned
        #[arg(long, conflicts_with = "actioned")]
        pending: bool,

        /// Only actioned listings
        #[arg(long)]
        actioned: bool,
    },

    /// Show listing details
    Show {
        /// Listing ID
        id: i64,
    },

    /// Mark a listing as actioned
    Action {
        /// Listing ID
        id: i64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,jobsweep=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_pipeline(config: &Config, db: Arc<Database>) -> Pipeline {
    let launcher = Arc::new(ChromeLauncher::new(&config.webdriver_url, config.headless));
    Pipeline::new(config.clone(), launcher, db)
}

fn print_summary(summary: &BatchSummary) {
    println!("\nResults:");
    println!("  Candidates found:   {}", summary.candidates);
    println!("  Listings saved:     {}", summary.inserted);
    println!("  Already stored:     {}", summary.skipped + summary.duplicates);
    if summary.enrichment_fallbacks > 0 {
        println!("  No description:     {}", summary.enrichment_fallbacks);
    }
    if summary.persistence_failures > 0 {
        println!("  Failed to save:     {}", summary.persistence_failures);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db = Arc::new(Database::open(&config.database_path)?);

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Ingest {
            source,
            keywords,
            location,
        } => {
            db.ensure_initialized()?;
            let pipeline = build_pipeline(&config, db.clone());
            let controller = IngestController::new();
            let request = IngestRequest {
                source,
                keywords,
                location,
            };

            match controller.run(&pipeline, request).await {
                Some(Ok(summary)) => print_summary(&summary),
                Some(Err(e)) => return Err(e.into()),
                None => bail!("An ingestion batch is already running"),
            }
        }

        Commands::Schedule {
            every_hours,
            source,
        } => {
            db.ensure_initialized()?;
            let pipeline = build_pipeline(&config, db.clone());
            let controller = IngestController::new();
            let mut ticker = tokio::time::interval(Duration::from_secs(every_hours * 60 * 60));
            tracing::info!(source = %source, every_hours, "scheduled ingestion started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("shutting down scheduler");
                        break;
                    }
                }

                let request = IngestRequest {
                    source,
                    keywords: None,
                    location: None,
                };
                match controller.run(&pipeline, request).await {
                    Some(Ok(summary)) => tracing::info!(%summary, "scheduled batch finished"),
                    // Already recorded as ERROR; try again next tick
                    Some(Err(e)) => tracing::error!(error = %e, "scheduled batch failed"),
                    None => tracing::warn!("previous batch still running; tick skipped"),
                }
            }
        }

        Commands::Serve { port } => {
            db.ensure_initialized()?;
            let state = server::AppState {
                controller: IngestController::new(),
                pipeline: Arc::new(build_pipeline(&config, db.clone())),
                db: db.clone(),
            };
            server::serve(state, port.unwrap_or(config.port)).await?;
        }

        Commands::List { pending, actioned } => {
            db.ensure_initialized()?;
            let filter = if pending {
                Some(false)
            } else if actioned {
                Some(true)
            } else {
                None
            };
            let listings = db.list_listings(filter)?;
            if listings.is_empty() {
                println!("No listings found.");
            } else {
                println!("{:<6} {:<9} {:<30} {:<20} {:<20}", "ID", "ACTIONED", "ROLE", "COMPANY", "CREATED");
                println!("{}", "-".repeat(88));
                for listing in listings {
                    println!(
                        "{:<6} {:<9} {:<30} {:<20} {:<20}",
                        listing.id,
                        if listing.is_actioned { "yes" } else { "no" },
                        truncate(&listing.role_title, 28),
                        truncate(&listing.company_name, 18),
                        truncate(&listing.created_at, 19)
                    );
                }
            }
        }

        Commands::Show { id } => {
            db.ensure_initialized()?;
            match db.get_listing(id)? {
                Some(listing) => {
                    println!("Listing #{}", listing.id);
                    println!("Role: {}", listing.role_title);
                    println!("Company: {}", listing.company_name);
                    println!("Link: {}", listing.job_link);
                    println!("Owner: {}", listing.user_id);
                    println!("Actioned: {}", if listing.is_actioned { "yes" } else { "no" });
                    if let Some(manager) = &listing.hiring_manager {
                        println!("Hiring manager: {}", manager);
                    }
                    if let Some(url) = &listing.resume_url {
                        println!("Resume: {}", url);
                    }
                    if let Some(url) = &listing.cover_letter_url {
                        println!("Cover letter: {}", url);
                    }
                    if let Some(url) = &listing.drive_folder_url {
                        println!("Folder: {}", url);
                    }
                    println!("Created: {}", listing.created_at);
                    println!("\n--- Description ---\n{}", listing.job_description);
                }
                None => {
                    println!("Listing #{} not found.", id);
                }
            }
        }

        Commands::Action { id } => {
            db.ensure_initialized()?;
            if db.mark_actioned(id)? {
                println!("Marked listing #{} as actioned.", id);
            } else {
                println!("Listing #{} not found.", id);
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Backend Engineer", 28), "Backend Engineer");
        assert_eq!(truncate("Senior Backend Engineer (m/w/d)", 10), "Senior ...");
        // Multi-byte characters are never split
        assert_eq!(truncate("Entwickler für Zahlungsverkehr", 14), "Entwickler ...");
    }

    #[test]
    fn test_cli_parses_source_aliases() {
        let cli = Cli::try_parse_from(["jobsweep", "ingest", "--source", "indeed", "-k", "rust"]).unwrap();
        match cli.command {
            Commands::Ingest { source, keywords, location } => {
                assert_eq!(source, Source::AlternateJobBoard);
                assert_eq!(keywords.as_deref(), Some("rust"));
                assert_eq!(location, None);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_source_and_zero_interval() {
        assert!(Cli::try_parse_from(["jobsweep", "ingest", "--source", "monster"]).is_err());
        assert!(Cli::try_parse_from(["jobsweep", "schedule", "--every-hours", "0"]).is_err());
        assert!(Cli::try_parse_from(["jobsweep", "list", "--pending", "--actioned"]).is_err());
    }
}
