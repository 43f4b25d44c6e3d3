use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use model_lifecycle::application::bootstrap::PersistenceBootstrap;
use model_lifecycle::application::engine::LifecycleEngine;
use model_lifecycle::config::EngineConfig;
use model_lifecycle::domain::events::LoggingListener;
use model_lifecycle::domain::market::{Candle, Timeframe};
use model_lifecycle::domain::model::{
    AlgorithmKind, DataRange, Hyperparameters, ModelFilter, NewModel, WalkForwardReport,
};
use model_lifecycle::domain::repositories::CandleRepository;
use model_lifecycle::infrastructure::{EventBus, Metrics, MetricsListener};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train, validate and promote prediction models", long_about = None)]
struct Cli {
    /// TOML engine config. Environment variables are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import bars, walk-forward validate, train and optionally promote a model
    Run {
        /// CSV with columns timestamp,open,high,low,close,volume (timestamp in ms)
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "BTC/USDT")]
        symbol: String,

        #[arg(long, default_value = "1h")]
        timeframe: String,

        /// linear, tree_ensemble or neural
        #[arg(long, default_value = "linear")]
        algorithm: String,

        #[arg(long)]
        name: Option<String>,

        /// Hyperparameters as a JSON object, e.g. '{"n_trees": 50}'
        #[arg(long)]
        hyperparameters: Option<String>,

        /// Promote the trained run when it clears the registry gates
        #[arg(long)]
        promote: bool,

        /// Also compute permutation feature importance for the run
        #[arg(long)]
        importance: bool,
    },
    /// List registered models
    List,
    /// Show status, latest run and latest report of a model
    Status {
        #[arg(long)]
        model_id: Uuid,
    },
}

#[derive(Debug, Deserialize)]
struct BarRecord {
    timestamp: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl BarRecord {
    fn into_candle(self, symbol: &str) -> Result<Candle> {
        let parse = |field: &str, raw: &str| {
            Decimal::from_str(raw.trim())
                .with_context(|| format!("Failed to parse {} '{}' at {}", field, raw, self.timestamp))
        };
        Ok(Candle {
            symbol: symbol.to_string(),
            open: parse("open", &self.open)?,
            high: parse("high", &self.high)?,
            low: parse("low", &self.low)?,
            close: parse("close", &self.close)?,
            volume: parse("volume", &self.volume)?,
            timestamp: self.timestamp,
        })
    }
}

fn read_bars(path: &PathBuf, symbol: &str) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut bars = Vec::new();
    for record in reader.deserialize::<BarRecord>() {
        bars.push(record?.into_candle(symbol)?);
    }
    bars.sort_by_key(|c| c.timestamp);
    Ok(bars)
}

fn print_report(report: &WalkForwardReport) {
    println!("\n══════════════════════════════════════════════════════");
    println!("  WALK-FORWARD REPORT {}", report.id);
    println!("══════════════════════════════════════════════════════");
    println!(
        "  {:>3}  {:>13}  {:>13}  {:>8}  {:>9}  {:>7}",
        "#", "train rows", "test rows", "accuracy", "precision", "recall"
    );
    for w in &report.windows {
        println!(
            "  {:>3}  {:>5}..{:<6}  {:>5}..{:<6}  {:>8.4}  {:>9.4}  {:>7.4}",
            w.index,
            w.train_range.start,
            w.train_range.end,
            w.test_range.start,
            w.test_range.end,
            w.accuracy,
            w.precision,
            w.recall
        );
    }
    let agg = &report.aggregate;
    println!(
        "\n  mean {:.4}  std {:.4}  min {:.4}  max {:.4}  consistency {:.2}",
        agg.mean_accuracy, agg.std_accuracy, agg.min_accuracy, agg.max_accuracy, agg.consistency
    );
    println!(
        "  Recommendation: {} ({})",
        agg.recommendation,
        agg.recommendation.description()
    );
}

async fn run_pipeline(engine: &LifecycleEngine, args: RunArgs) -> Result<()> {
    let bars = read_bars(&args.input, &args.symbol)?;
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        bail!("{} contains no bars", args.input.display());
    };
    let range = DataRange::new(first.timestamp, last.timestamp);
    for bar in &bars {
        args.candles.save(bar).await?;
    }
    info!("Imported {} bars for {}", bars.len(), args.symbol);

    let hyperparameters = match &args.hyperparameters {
        Some(raw) => serde_json::from_str::<Hyperparameters>(raw)
            .context("Failed to parse --hyperparameters")?,
        None => Hyperparameters::new(),
    };
    let algorithm = AlgorithmKind::from_str(&args.algorithm)?;
    let model_id = engine
        .create_model(NewModel {
            name: args
                .name
                .clone()
                .unwrap_or_else(|| format!("{}-{}", args.symbol, algorithm)),
            symbols: vec![args.symbol.clone()],
            timeframe: Timeframe::from_str(&args.timeframe)?,
            algorithm,
            hyperparameters,
        })
        .await?;
    println!("Model {} created", model_id);

    let window = engine.config().validation.window_config();
    let report_id = engine.validate_model(model_id, range, window).await?.wait().await?;
    let reports = engine.reports(model_id).await?;
    if let Some(report) = reports.iter().find(|r| r.id == report_id) {
        print_report(report);
    }

    let run_id = engine.train_model(model_id, range).await?.wait().await?;
    let status = engine.get_model_status(model_id).await?;
    if let Some(run) = &status.latest_run {
        println!(
            "\nHoldout run {}: {} (test accuracy {})",
            run.run_id,
            run.status,
            run.test_accuracy
                .map(|a| format!("{:.4}", a))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }

    if args.importance {
        let importances = engine
            .compute_feature_importance(model_id, run_id, range)
            .await?;
        println!("\n  Feature importance (permutation):");
        for imp in importances.iter().take(10) {
            println!(
                "    {:>2}. {:<18} {:.4}",
                imp.rank, imp.feature_name, imp.importance
            );
        }
    }

    if args.promote {
        match engine.promote(model_id, run_id).await {
            Ok(model) => println!("\nModel {} is now {}", model.id, model.status),
            Err(e) => println!("\nPromotion refused: {}", e),
        }
    }
    Ok(())
}

struct RunArgs {
    input: PathBuf,
    symbol: String,
    timeframe: String,
    algorithm: String,
    name: Option<String>,
    hyperparameters: Option<String>,
    promote: bool,
    importance: bool,
    candles: Arc<dyn CandleRepository>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Model lifecycle {} starting", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };

    let persistence = PersistenceBootstrap::init(&config.storage).await?;
    let event_bus = EventBus::new();
    let metrics = Metrics::new()?;
    event_bus.subscribe(Arc::new(LoggingListener)).await;
    event_bus
        .subscribe(Arc::new(MetricsListener::new(metrics.clone())))
        .await;

    let engine = LifecycleEngine::new(
        persistence.stores.clone(),
        persistence.bar_source.clone(),
        event_bus,
        config,
    );

    match cli.command {
        Commands::Run {
            input,
            symbol,
            timeframe,
            algorithm,
            name,
            hyperparameters,
            promote,
            importance,
        } => {
            let args = RunArgs {
                input,
                symbol,
                timeframe,
                algorithm,
                name,
                hyperparameters,
                promote,
                importance,
                candles: persistence.candle_repository.clone(),
            };
            run_pipeline(&engine, args).await?;
            println!("\n{}", metrics.gather_text());
        }
        Commands::List => {
            for model in engine.list_models(ModelFilter::default()).await? {
                println!(
                    "{}  {:<24} {:<10} {:<14} {}{}",
                    model.id,
                    model.name,
                    model.status,
                    model.algorithm,
                    model.symbols.join(","),
                    if model.drift_detected { "  [DRIFT]" } else { "" }
                );
            }
        }
        Commands::Status { model_id } => {
            let status = engine.get_model_status(model_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
