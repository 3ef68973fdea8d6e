use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sales_summary::app::{self, AppConfig, RunOverrides};
use sales_summary::config::Settings;
use sales_summary::pipeline::{WeekBucketer, YearWeekPolicy};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Aggregate sales records into weekly summaries
#[derive(Parser)]
#[command(name = "sales-summary")]
#[command(about = "Aggregate sales records into weekly store/brand/product summaries", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for thread ids)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate records and summarize them (default command)
    Run(RunOverrides),
    /// Print the year-week bucket of a date
    Week {
        /// Date to bucket (yyyy-MM-dd)
        date: String,

        /// Processing date for the January correction (default: today)
        #[arg(long)]
        processing_date: Option<NaiveDate>,

        /// Apply the January correction to the date itself
        #[arg(long)]
        record_date_weeks: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    app::initialize_app(&AppConfig::new(cli.verbose));

    let result = match cli.command {
        Some(Commands::Run(overrides)) => run(overrides).await,
        Some(Commands::Week {
            date,
            processing_date,
            record_date_weeks,
        }) => print_week(&date, processing_date, record_date_weeks),
        None => run(RunOverrides::default()).await,
    };

    if let Err(e) = result {
        app::handle_fatal_error(e, cli.verbose);
    }
}

async fn run(overrides: RunOverrides) -> anyhow::Result<()> {
    let mut settings = match &overrides.config {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };
    overrides.apply(&mut settings);
    debug!("Effective settings: {:?}", settings);

    let cancel = CancellationToken::new();
    let interrupt = app::cancel_on_ctrl_c(cancel.clone());
    let result = app::run_pipeline(settings, cancel).await;
    interrupt.abort();

    result.map(|_| ())
}

fn print_week(
    date: &str,
    processing_date: Option<NaiveDate>,
    record_date_weeks: bool,
) -> anyhow::Result<()> {
    let policy = if record_date_weeks {
        YearWeekPolicy::RecordDate
    } else {
        YearWeekPolicy::ProcessingDate
    };
    let bucketer = match processing_date {
        Some(processing_date) => WeekBucketer::new(policy, processing_date),
        None => WeekBucketer::today(policy),
    };

    let year_week = bucketer
        .bucket(date)
        .with_context(|| format!("Cannot bucket '{date}'"))?;
    println!("{year_week}");
    Ok(())
}
