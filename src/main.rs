use anyhow::Context;
use clap::Parser;
use concert_finder::app::ports::HttpClientPort;
use concert_finder::config::{Config, Credentials};
use concert_finder::infra::http_client::ReqwestHttp;
use concert_finder::pipeline::dates::DatePlan;
use concert_finder::pipeline::{Pipeline, RunSummary};
use concert_finder::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "concert_finder")]
#[command(about = "Ingest KOPIS classical concert listings, posters and programs into SQLite")]
#[command(version = "0.1.0")]
struct Cli {
    /// First day to ingest (YYYYMMDD)
    #[arg(short = 's', long = "startDate", alias = "start-date")]
    start_date: Option<String>,

    /// Number of consecutive days to ingest
    #[arg(short = 'p', long)]
    periods: Option<u32>,

    /// Scheduled run: ingest the single day 60 days from now
    #[arg(short = 'c', long = "cronJob", alias = "cron-job")]
    cron_job: bool,

    /// Path to the TOML configuration
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Ingestion results:");
    println!("   Dates: {}", summary.dates);
    println!("   Listings: {}", summary.listings);
    println!("   Persisted: {}", summary.persisted);
    println!("   Skipped: {}", summary.skipped);
    println!("   Errors: {}", summary.errors.len());
    if !summary.errors.is_empty() {
        println!("\n⚠️  Errors encountered:");
        for error in &summary.errors {
            println!("   - {}", error);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = logging::init_logging();
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    let credentials = Credentials::from_env()
        .context("Could not retrieve API keys. Not proceeding")?;
    let config = Config::load(&cli.config)
        .context("Could not load extraction prompts and settings. Not proceeding")?;
    let plan = DatePlan::from_args(cli.start_date.as_deref(), cli.periods, cli.cron_job)
        .context("Not proceeding")?;
    let dates = plan.dates(chrono::Utc::now());

    let metrics_handle = metrics::install_recorder();
    let http: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new(reqwest::Client::new()));
    let pipeline = Pipeline::new(http.clone(), &config, &credentials)
        .context("Could not open the concert database")?;

    info!("🚀 Ingesting {} date(s)", dates.len());
    let summary = pipeline.run(&dates).await;
    print_summary(&summary);

    if let (Some(gateway), Some(handle)) = (&config.metrics.pushgateway_url, &metrics_handle) {
        if let Err(e) = metrics::push_to_gateway(http.as_ref(), gateway, handle).await {
            warn!("Failed to push metrics: {}", e);
        }
    }
    if !summary.errors.is_empty() {
        error!("{} listing step(s) failed; see log for details", summary.errors.len());
    }
    Ok(())
}
