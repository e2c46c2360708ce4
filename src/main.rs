use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use iris_serve::api::serve;
use iris_serve::common::{log, AppCfg};
use iris_serve::data::service::{iris, load_csv};
use iris_serve::training::service::train_all;
use iris_serve::training::{FsModelRepo, ForestTrainer, LogisticTrainer};

#[derive(Parser)]
#[command(name = "iris-serve")]
#[command(version)]
#[command(about = "Iris species classifier over HTTP", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "IRIS_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve predictions over HTTP
    Serve(ServeArgs),

    /// Train both classifiers and write their artefacts
    Train(TrainArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Listen address (overrides IRIS_BIND_ADDR)
    #[arg(short, long)]
    bind: Option<std::net::SocketAddr>,

    /// Logistic-regression artefact (overrides LR)
    #[arg(long)]
    lr: Option<PathBuf>,

    /// Random-forest artefact (overrides RF)
    #[arg(long)]
    rf: Option<PathBuf>,

    /// Predictions log file (overrides Pred_File_Path)
    #[arg(short, long)]
    predictions: Option<PathBuf>,

    /// Delay before each prediction is persisted, in milliseconds
    #[arg(long)]
    log_delay_ms: Option<u64>,
}

#[derive(Args)]
struct TrainArgs {
    /// Directory receiving the model artefacts
    #[arg(short, long, default_value = "models")]
    out_dir: PathBuf,

    /// CSV with four feature columns and a species column; defaults to the bundled Iris data
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Number of trees in the random forest
    #[arg(long, default_value = "100")]
    trees: usize,

    /// Random-forest seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Maximum tree depth (unlimited if unset)
    #[arg(long)]
    max_depth: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    log::init(cli.log_json);

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Train(args) => run_train(args),
    }
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut cfg = AppCfg::load().context("loading configuration")?;
    if let Some(bind) = args.bind {
        cfg.bind_addr = bind;
    }
    if args.lr.is_some() {
        cfg.lr_path = args.lr;
    }
    if args.rf.is_some() {
        cfg.rf_path = args.rf;
    }
    if let Some(path) = args.predictions {
        cfg.predictions_path = path;
    }
    if let Some(ms) = args.log_delay_ms {
        cfg.log_delay = std::time::Duration::from_millis(ms);
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    };

    let stats = serve(cfg, shutdown).await?;
    info!(
        written = stats.written,
        dropped = stats.dropped,
        failed = stats.failed,
        "bye"
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let data = match &args.data {
        Some(path) => load_csv(path).with_context(|| format!("reading {}", path.display()))?,
        None => iris()?,
    };

    let forest = ForestTrainer {
        n_trees: args.trees,
        max_depth: args.max_depth,
        seed: args.seed,
        ..ForestTrainer::default()
    };
    let trained = train_all(
        &data,
        &args.out_dir,
        &LogisticTrainer::default(),
        &forest,
        &FsModelRepo::new(),
    )?;

    for model in &trained {
        println!(
            "{:<20} accuracy {:.3}  -> {}",
            model.name.as_str(),
            model.train_score.accuracy(),
            model.path.display()
        );
    }
    Ok(())
}
