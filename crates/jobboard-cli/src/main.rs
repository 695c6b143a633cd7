use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobboard_client::{ApiTransport, FixtureTransport, HttpApiClient, StatsRequester};
use jobboard_core::format_count;
use jobboard_screens::{search_route, DashboardScreen, LandingScreen, ScreenConfig, SearchForm};
use jobboard_web::AppState;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobboard-cli")]
#[command(about = "Job board landing page and admin dashboard client")]
struct Cli {
    /// Tracing filter directive, e.g. `info` or `jobboard_client=debug`.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Serve canned API responses from this directory instead of calling the API.
    #[arg(long, global = true)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    Landing {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    Dashboard,
    SearchRoute {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "")]
        location: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let screens = ScreenConfig::from_env().context("reading configuration")?;
    let transport: Arc<dyn ApiTransport> = match &cli.fixtures {
        Some(dir) => Arc::new(FixtureTransport::from_dir(dir)?),
        None => Arc::new(HttpApiClient::new(screens.api.clone())?),
    };
    let requester = StatsRequester::new(transport);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            let port = port
                .or_else(|| {
                    std::env::var("JOBBOARD_WEB_PORT")
                        .ok()
                        .and_then(|v| v.parse().ok())
                })
                .unwrap_or(8000);
            jobboard_web::serve(AppState::new(requester, screens), port).await?;
        }
        Commands::Landing { search, location } => {
            let mut screen =
                LandingScreen::new(requester, &screens).with_form(SearchForm::new(search, location));
            screen.activate().await?;
            screen.settled().await;
            let state = screen.snapshot().await;
            let stats = state.stats();
            println!(
                "stats [{}]: active_jobs={} job_seekers={} companies={}",
                state.stats.tag(),
                format_count(stats.active_jobs),
                format_count(stats.job_seekers),
                format_count(stats.companies)
            );
            println!("jobs [{}]: {}", state.jobs.tag(), state.jobs().len());
            for job in state.jobs() {
                let salary = job
                    .salary_range()
                    .map(|r| format!(" ({})", r.display()))
                    .unwrap_or_default();
                println!(
                    "  #{} {} at {}, {}{}",
                    job.id, job.title, job.company_name, job.location, salary
                );
            }
        }
        Commands::Dashboard => {
            let mut screen = DashboardScreen::new(requester);
            screen.activate().await?;
            screen.settled().await;
            let state = screen.snapshot().await;
            let analytics = state.analytics().cloned().unwrap_or_default();
            let [users, employers, jobs, applications] = analytics.totals();
            println!(
                "analytics [{}]: users={} employers={} jobs={} applications={} pending={}",
                state.analytics.tag(),
                format_count(users),
                format_count(employers),
                format_count(jobs),
                format_count(applications),
                format_count(analytics.pending_approvals)
            );
            for point in &analytics.daily_activity {
                println!("  {} {}", point.date, point.count);
            }
        }
        Commands::SearchRoute { search, location } => {
            println!("{}", search_route(&search, &location)?);
        }
    }

    Ok(())
}
