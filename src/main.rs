use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use liveresults::{
    config::Settings, dashboard, dashboard::DashboardFeed, paper_algorithm::PaperAlgorithm,
    pipeline::Pipeline, runner, store::SqliteStore,
};

#[derive(Debug, Parser)]
#[command(name = "liveresults", version)]
struct Cli {
    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, env = "RUN_SECS")]
    run_secs: Option<u64>,

    /// Skip the local HTTP dashboard
    #[arg(long)]
    no_dashboard: bool,

    /// Seed for the paper price simulation
    #[arg(long, env = "SEED")]
    seed: Option<u64>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if cli.no_dashboard {
        settings.dashboard_enabled = false;
    }

    let store = SqliteStore::new(&settings.sqlite_path)?;
    store.init_db()?;

    log::info!(
        "app.start user_id={} project_id={} deploy_id={} compile_id={} symbols={} sqlite={}",
        settings.user_id,
        settings.project_id,
        settings.deploy_id,
        settings.compile_id,
        settings.symbols.join(","),
        store.path()
    );

    let feed = Arc::new(DashboardFeed::new());
    if settings.dashboard_enabled {
        let st = settings.clone();
        let f = feed.clone();
        let db = store.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve_dashboard(st, f, db).await {
                log::error!("dashboard.error {:#}", e);
            }
        });
    }

    let pipeline = Arc::new(Pipeline::new(settings.clone(), feed, Arc::new(store)));
    let algo = Arc::new(PaperAlgorithm::new(
        &settings.symbols,
        settings.starting_cash,
        cli.seed.unwrap_or_else(rand::random),
    )?);

    runner::run(&settings, pipeline, algo, cli.run_secs.map(Duration::from_secs)).await
}
