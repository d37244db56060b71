//! campaign-predict: command-line front end for campaign success
//! prediction, early-signal analysis and budget optimisation.
//!
//! Inputs are JSON files; results are printed to stdout as JSON. Logs go to
//! stderr so output can be piped.

use anyhow::{bail, Context};
use campaign_budget::{BudgetAllocationRequest, ChannelPerformanceProfile};
use campaign_core::{AppConfig, CampaignRecord, CampaignResult, ModelVersion};
use campaign_early_signal::{EarlyMetricsSnapshot, LabeledSnapshot};
use campaign_service::{JobStatus, PredictionService, TrainingHandle};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "campaign-predict")]
#[command(about = "Campaign success prediction, early signals and budget allocation")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Model artifact directory (overrides config)
    #[arg(long, env = "CAMPAIGN_PREDICT__REGISTRY__ARTIFACT_DIR")]
    artifact_dir: Option<String>,

    /// Instance identifier (overrides config)
    #[arg(long, env = "CAMPAIGN_PREDICT__INSTANCE_ID")]
    instance_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train and publish a campaign success model from labelled campaigns
    Train {
        /// JSON array of campaign records with `outcome_label`
        records: PathBuf,
    },
    /// Train and publish an early-signal model from finished campaigns
    TrainEarly {
        /// JSON array of early snapshots with `succeeded`
        snapshots: PathBuf,
    },
    /// Predict success for one campaign record or an array of them
    Predict {
        records: PathBuf,
        /// Model version to score against (default: current)
        #[arg(long)]
        model_version: Option<u64>,
    },
    /// Analyze early metrics of a live campaign
    Early {
        snapshot: PathBuf,
        /// Early-signal model version (default: current, or rules only)
        #[arg(long)]
        model_version: Option<u64>,
    },
    /// Allocate a budget across channels
    Optimize {
        request: PathBuf,
        profiles: PathBuf,
    },
    /// List published model versions
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_predict=info,campaign_service=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(path.to_str())
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(dir) = cli.artifact_dir {
        config.registry.artifact_dir = dir;
    }
    if let Some(id) = cli.instance_id {
        config.instance_id = id;
    }

    info!(
        instance_id = %config.instance_id,
        artifact_dir = %config.registry.artifact_dir,
        "Configuration loaded"
    );

    let service = PredictionService::open(&config)?;

    match cli.command {
        Command::Train { records } => {
            let handle = service.submit_training_json(read_json(&records)?)?;
            finish_training(&service, handle).await
        }
        Command::TrainEarly { snapshots } => {
            let samples: Vec<LabeledSnapshot> = read_json(&snapshots)?;
            let handle = service.submit_early_training(samples)?;
            finish_training(&service, handle).await
        }
        Command::Predict {
            records,
            model_version,
        } => {
            let version = model_version.map(ModelVersion);
            let value: serde_json::Value = read_json(&records)?;
            if value.is_array() {
                let results = service.predict_batch_json(value, version)?;
                let out: Vec<serde_json::Value> = results.iter().map(outcome_json).collect();
                print_json(&out)
            } else {
                let record: CampaignRecord = serde_json::from_value(value)?;
                print_json(&service.predict(&record, version)?)
            }
        }
        Command::Early {
            snapshot,
            model_version,
        } => {
            let snapshot: EarlyMetricsSnapshot = read_json(&snapshot)?;
            let result = service.analyze_early(&snapshot, model_version.map(ModelVersion))?;
            print_json(&result)
        }
        Command::Optimize { request, profiles } => {
            let request: BudgetAllocationRequest = read_json(&request)?;
            let profiles: Vec<ChannelPerformanceProfile> = read_json(&profiles)?;
            print_json(&service.optimize(&request, &profiles)?)
        }
        Command::Models => print_json(&service.models()),
    }
}

/// Wait for the job, cancelling it on Ctrl-C.
async fn finish_training(
    service: &PredictionService,
    handle: TrainingHandle,
) -> anyhow::Result<()> {
    let job_id = handle.job_id();
    info!(job_id = %job_id, "Waiting for training job");

    let wait = handle.wait();
    tokio::pin!(wait);
    let status = tokio::select! {
        status = &mut wait => status,
        _ = tokio::signal::ctrl_c() => {
            warn!(job_id = %job_id, "Interrupt received, cancelling training");
            service.cancel_job(job_id);
            wait.await
        }
    };

    print_json(&status)?;
    match status {
        JobStatus::Completed { .. } => Ok(()),
        JobStatus::Cancelled => bail!("training job {job_id} was cancelled"),
        JobStatus::Failed { message, .. } => bail!("training job {job_id} failed: {message}"),
        JobStatus::Queued | JobStatus::Running => {
            bail!("training job {job_id} ended without a result")
        }
    }
}

fn outcome_json<T: Serialize>(outcome: &CampaignResult<T>) -> serde_json::Value {
    match outcome {
        Ok(value) => serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        Err(e) => serde_json::json!({ "error": { "kind": e.kind(), "message": e.to_string() } }),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
