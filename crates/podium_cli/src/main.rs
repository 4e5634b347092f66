//! Podium CLI
//!
//! Play a monthly leaderboard reveal in the terminal, or inspect the podium
//! a ranking file produces.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use podium_animation::{FpsSource, FrameScheduler};
use podium_reveal::{
    format_thousands, load_ranking_file, load_ranking_or_empty, ranking_path, total_coins,
    total_count, DocumentReadiness, ExpansionStage, Podium, PodiumConfig, PodiumData,
    RankingEntry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod console;
mod perf;

use console::{ConsoleEmitter, ConsoleView};

#[derive(Parser)]
#[command(name = "podium")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Animated leaderboard podium", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct DataArgs {
    /// Ranking file; overrides --data-dir and --month
    #[arg(long)]
    data: Option<PathBuf>,

    /// Directory holding `{month}-ranking.json` files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Ranking month
    #[arg(short, long)]
    month: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the reveal and gold card expansion
    Run {
        #[command(flatten)]
        data: DataArgs,

        /// Directory images and fonts are resolved against
        #[arg(long)]
        assets: Option<PathBuf>,

        /// How long the detail panel takes to slide in, in milliseconds
        #[arg(long, default_value = "600")]
        detail_ms: u64,
    },

    /// Show the podium a ranking produces
    Inspect {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            data,
            assets,
            detail_ms,
        } => cmd_run(config, &data, assets, Duration::from_millis(detail_ms)).await,

        Commands::Inspect { data } => cmd_inspect(&config, &data),
    }
}

fn load_config(path: Option<&Path>) -> Result<PodiumConfig> {
    match path {
        Some(path) => PodiumConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(PodiumConfig::default()),
    }
}

/// Rows for the requested ranking; a missing monthly file yields no rows
fn load_entries(config: &PodiumConfig, args: &DataArgs) -> Result<Vec<RankingEntry>> {
    if let Some(path) = &args.data {
        return load_ranking_file(path)
            .with_context(|| format!("Failed to load ranking {}", path.display()));
    }
    let data_dir = args.data_dir.as_ref().unwrap_or(&config.data.data_dir);
    let month = args.month.as_deref().unwrap_or(&config.data.month);
    Ok(load_ranking_or_empty(data_dir, month))
}

async fn cmd_run(
    mut config: PodiumConfig,
    args: &DataArgs,
    assets: Option<PathBuf>,
    detail: Duration,
) -> Result<()> {
    if let Some(assets) = assets {
        config.readiness.asset_root = assets;
    }
    let entries = load_entries(&config, args)?;
    if entries.is_empty() {
        warn!("No ranking entries, showing placeholders");
    }
    let data = PodiumData::from_entries(&entries);
    info!(
        "Podium: {} / {} / {}",
        data.gold.name, data.silver.name, data.bronze.name
    );

    let fps = FpsSource::new(config.fps.clone());
    let _fps_log = fps.subscribe(|value| tracing::debug!("FPS: {}", value));
    let reporter = perf::spawn_reporter(fps.clone(), config.monitor.clone());

    let (stage_tx, mut stage_rx) = mpsc::unbounded_channel();
    let view = Arc::new(ConsoleView::new(stage_tx));
    let podium = Podium::from_config(
        &config,
        data,
        DocumentReadiness::complete(),
        FrameScheduler::new(config.scheduler.clone()),
        view.clone(),
        Arc::new(ConsoleEmitter),
    );

    let mut reveal = podium.reveal().subscribe();
    let reveal_log = tokio::spawn(async move {
        while reveal.changed().await.is_ok() {
            let snapshot = *reveal.borrow_and_update();
            info!(
                "Reveal: {} (backdrop: {})",
                snapshot.stage, snapshot.backdrop_enabled
            );
        }
    });

    // Stands in for the detail panel's slide-in animation
    let animation = {
        let podium = podium.clone();
        let name = config.expansion.detail_animation.clone();
        tokio::spawn(async move {
            while let Some(stage) = stage_rx.recv().await {
                if stage == ExpansionStage::DetailSliding {
                    tokio::time::sleep(detail).await;
                    podium.animation_end(&name);
                }
            }
        })
    };

    podium.mount();
    tokio::select! {
        outcome = podium.join() => match outcome {
            Some(outcome) => info!("Finished: {:?}", outcome),
            None => warn!("Podium run was torn down"),
        },
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    if podium.wiggle() {
        info!("Silver and bronze cards wiggling");
    }
    info!("Final score: {}", view.score_text());

    podium.unmount();
    animation.abort();
    reveal_log.abort();
    reporter.abort();
    fps.stop();
    info!(
        "FPS: avg {} (min {}, max {})",
        fps.average_fps(),
        fps.min_fps(),
        fps.max_fps()
    );
    Ok(())
}

fn cmd_inspect(config: &PodiumConfig, args: &DataArgs) -> Result<()> {
    let entries = load_entries(config, args)?;
    let podium = PodiumData::from_entries(&entries);

    match &args.data {
        Some(path) => println!("Ranking: {}", path.display()),
        None => {
            let data_dir = args.data_dir.as_ref().unwrap_or(&config.data.data_dir);
            let month = args.month.as_deref().unwrap_or(&config.data.month);
            println!("Ranking: {}", ranking_path(data_dir, month).display());
        }
    }
    println!("Entries: {}", total_count(&entries));
    println!("Total coins: {}", format_thousands(total_coins(&entries)));
    println!();
    for (place, card) in [
        ("Gold", &podium.gold),
        ("Silver", &podium.silver),
        ("Bronze", &podium.bronze),
    ] {
        println!("  {:<7}{:<24}{:>14}  {}", place, card.name, card.value, card.avatar);
    }
    Ok(())
}
