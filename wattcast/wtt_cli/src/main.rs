mod manifest;
mod server;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use tokio::runtime::Runtime;
use wattcast_forecasting::{
    pipeline::{build_features, load_frame},
    EvaluationPipeline, ForecastTelemetry, PredictRequest, PredictionService, TrainingPipeline,
    WattcastConfig,
};

use crate::{
    manifest::{
        append_manifest, compute_log_path, read_manifest, update_entry, update_status,
        RunManifestEntry,
    },
    server::AppState,
};

#[derive(Parser, Debug)]
#[command(name = "wtt", version, about = "Smart-building energy forecasting toolkit")]
struct Cli {
    /// TOML configuration; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Builds the feature matrix and prints the schema and VIF removals.
    Features {
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Trains the Ridge model and persists the artifacts.
    Train {
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Evaluates the stored model and writes the JSON report.
    Evaluate {
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Runs one prediction.
    Predict {
        /// JSON object with one value per feature.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Inline `name=value` pairs; they override `--input`.
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
        #[command(flatten)]
        factors: FactorArgs,
    },
    /// Prints the top energy drivers.
    Insights {
        #[command(flatten)]
        factors: FactorArgs,
    },
    /// Prints model metadata.
    Stats {
        #[command(flatten)]
        factors: FactorArgs,
    },
    /// Serves the prediction API over HTTP.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[command(flatten)]
        factors: FactorArgs,
    },
    /// Queries the run manifest.
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
        #[arg(long, global = true)]
        manifest: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum RunsCommand {
    /// Lists the most recent runs.
    List {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Shows one run.
    Status { run_id: String },
}

#[derive(Args, Debug, Default)]
struct FactorArgs {
    /// Currency units per kWh.
    #[arg(long)]
    cost_per_kwh: Option<f64>,
    /// kg CO2 per kWh.
    #[arg(long)]
    co2_per_kwh: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WattcastConfig::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Commands::Features { data } => handle_features(&config, data),
        Commands::Train { data, manifest } => handle_train(&config, data, manifest),
        Commands::Evaluate { data } => handle_evaluate(&config, data),
        Commands::Predict {
            input,
            fields,
            factors,
        } => {
            let service = build_service(&config, &factors)?;
            let request = read_request(input.as_deref(), &fields)?;
            let response = service.predict(&request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Commands::Insights { factors } => {
            let service = build_service(&config, &factors)?;
            println!("{}", serde_json::to_string_pretty(&service.insights())?);
            Ok(())
        }
        Commands::Stats { factors } => {
            let service = build_service(&config, &factors)?;
            println!("{}", serde_json::to_string_pretty(&service.stats())?);
            Ok(())
        }
        Commands::Serve {
            host,
            port,
            factors,
        } => {
            let service = build_service(&config, &factors)?;
            let telemetry = telemetry_for(&config, "serve")?;
            let host = host.unwrap_or_else(|| config.serving.host.clone());
            let port = port.unwrap_or(config.serving.port);
            let rt = Runtime::new()?;
            rt.block_on(server::serve(AppState::new(service, telemetry), &host, port))
        }
        Commands::Runs { command, manifest } => {
            let manifest = manifest.unwrap_or_else(|| config.artifacts.manifest_path.clone());
            let entries = read_manifest(&manifest)?;
            match command {
                RunsCommand::List { limit } => {
                    for entry in entries.into_iter().rev().take(limit) {
                        println!(
                            "{} | {} | {} | {}",
                            entry.run_id,
                            entry.status,
                            entry.submitted_at,
                            entry.data_path.display()
                        );
                    }
                }
                RunsCommand::Status { run_id } => {
                    if let Some(entry) = entries.into_iter().find(|e| e.run_id == run_id) {
                        println!("{}", serde_json::to_string_pretty(&entry)?);
                    } else {
                        println!("run {run_id} not found");
                    }
                }
            }
            Ok(())
        }
    }
}

fn handle_features(config: &WattcastConfig, data: Option<PathBuf>) -> Result<()> {
    let data = data.unwrap_or_else(|| config.training.data_path.clone());
    let telemetry = telemetry_for(config, "features")?;
    let frame = load_frame(config, &data)?;
    let build = build_features(config, &frame, &telemetry)?;
    let summary = json!({
        "data_path": data,
        "rows_in": build.rows_in,
        "samples": build.dataset.len(),
        "dropped_for_lag": build.dropped_for_lag,
        "dropped_for_missing": build.dropped_for_missing,
        "skipped_columns": frame.skipped_columns(),
        "candidates": build.candidates,
        "features": build.feature_names(),
        "removed": build.removals,
        "final_vif": build.final_vif,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn handle_train(
    config: &WattcastConfig,
    data: Option<PathBuf>,
    manifest: Option<PathBuf>,
) -> Result<()> {
    let data = data.unwrap_or_else(|| config.training.data_path.clone());
    let manifest = manifest.unwrap_or_else(|| config.artifacts.manifest_path.clone());
    let log_path = compute_log_path(&config.logging.log_dir, "train")?;
    let telemetry = ForecastTelemetry::builder("wtt")
        .log_path(&log_path)
        .min_level(config.logging.min_level()?)
        .build()?;

    let mut entry = RunManifestEntry::new(
        data.clone(),
        config.artifacts.model_path.clone(),
        log_path,
    );
    entry.status = "queued".into();
    append_manifest(&manifest, &entry)?;
    telemetry.emit(
        LogLevel::Info,
        "run queued",
        json!({ "run_id": entry.run_id, "data_path": data }),
    );

    update_status(&manifest, &entry.run_id, "running")?;
    let pipeline = TrainingPipeline::new(config.clone()).with_telemetry(telemetry.clone());
    match pipeline.run(&data) {
        Ok(outcome) => {
            let report = &outcome.report;
            let metrics = json!({
                "train": report.evaluation.train,
                "test": report.evaluation.test,
                "baseline": report.baseline,
                "features": report.features.len(),
            });
            let summary = report.summary();
            update_entry(&manifest, &entry.run_id, |stored| {
                stored.status = "completed".into();
                stored.finished_at = Some(Utc::now());
                stored.summary = Some(summary.clone());
                stored.metrics = Some(metrics.clone());
            })?;
            telemetry.emit(
                LogLevel::Info,
                "run completed",
                json!({ "run_id": entry.run_id }),
            );
            println!("{summary}");
            println!("{}", serde_json::to_string_pretty(report)?);
            Ok(())
        }
        Err(err) => {
            let message = format!("{err:#}");
            update_entry(&manifest, &entry.run_id, |stored| {
                stored.status = "failed".into();
                stored.finished_at = Some(Utc::now());
                stored.error = Some(message.clone());
            })?;
            telemetry.emit(
                LogLevel::Error,
                "run failed",
                json!({ "run_id": entry.run_id, "error": message }),
            );
            Err(err)
        }
    }
}

fn handle_evaluate(config: &WattcastConfig, data: Option<PathBuf>) -> Result<()> {
    let data = data.unwrap_or_else(|| config.training.data_path.clone());
    let telemetry = telemetry_for(config, "evaluate")?;
    let document = EvaluationPipeline::new(config.clone())
        .with_telemetry(telemetry)
        .run(&data)?;
    println!("{}", document.advisory);
    print!("{}", document.insights.render());
    println!(
        "report written to {}",
        config.artifacts.report_path.display()
    );
    println!("plots written to {}", config.artifacts.plots_dir.display());
    Ok(())
}

fn telemetry_for(config: &WattcastConfig, command: &str) -> Result<ForecastTelemetry> {
    let log_path = compute_log_path(&config.logging.log_dir, command)?;
    ForecastTelemetry::builder("wtt")
        .log_path(log_path)
        .min_level(config.logging.min_level()?)
        .build()
}

fn build_service(config: &WattcastConfig, overrides: &FactorArgs) -> Result<PredictionService> {
    let mut options = config.service_options();
    if let Some(cost) = overrides.cost_per_kwh {
        options.factors.cost_per_kwh = cost;
    }
    if let Some(co2) = overrides.co2_per_kwh {
        options.factors.co2_per_kwh = co2;
    }
    let artifacts = &config.artifacts;
    PredictionService::load(&artifacts.model_path, &artifacts.feature_names_path, options)
        .with_context(|| format!("loading model from {}", artifacts.model_path.display()))
}

fn read_request(input: Option<&Path>, fields: &[String]) -> Result<PredictRequest> {
    let mut request = match input {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading request {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing request {}", path.display()))?
        }
        None => PredictRequest::default(),
    };
    for raw in fields {
        let (name, value) = parse_field(raw)?;
        request.0.insert(name, value);
    }
    if request.0.is_empty() {
        bail!("no request fields given; use --input or --field name=value");
    }
    Ok(request)
}

/// Numbers become JSON numbers; anything else stays a string for the validator to reject.
fn parse_field(raw: &str) -> Result<(String, Value)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("field {raw:?} is not in name=value form");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("field {raw:?} has an empty name");
    }
    let value = value.trim();
    let value = value
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .map_or_else(|| Value::String(value.to_string()), |number| json!(number));
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::tempdir;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        let cli = Cli::parse_from([
            "wtt",
            "predict",
            "--field",
            "hour=14",
            "--field",
            "rv1=3.5",
            "--co2-per-kwh",
            "0.4",
        ]);
        match cli.command {
            Commands::Predict {
                fields, factors, ..
            } => {
                assert_eq!(fields, ["hour=14", "rv1=3.5"]);
                assert_eq!(factors.co2_per_kwh, Some(0.4));
                assert_eq!(factors.cost_per_kwh, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn fields_parse_numbers_and_keep_text() {
        assert_eq!(parse_field("hour=14").unwrap(), ("hour".into(), json!(14.0)));
        assert_eq!(
            parse_field(" RH_6 = abc ").unwrap(),
            ("RH_6".into(), json!("abc"))
        );
        assert!(parse_field("hour").is_err());
        assert!(parse_field("=3").is_err());
    }

    #[test]
    fn inline_fields_override_input_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("request.json");
        fs::write(&input, r#"{"hour": 3, "rv1": 10}"#).unwrap();
        let request = read_request(Some(&input), &["hour=14".to_string()]).unwrap();
        assert_eq!(request.0["hour"], json!(14.0));
        assert_eq!(request.0["rv1"], json!(10));
        assert!(read_request(None, &[]).is_err());
    }

    #[test]
    fn train_records_a_completed_run() {
        let dir = tempdir().unwrap();
        let mut config = WattcastConfig::default();
        config.artifacts.model_path = dir.path().join("models/ridge_model.json");
        config.artifacts.feature_names_path = dir.path().join("models/feature_names.json");
        config.artifacts.manifest_path = dir.path().join("runs/manifest.jsonl");
        config.logging.log_dir = dir.path().join("logs");
        let data = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../forecasting/dataset/energy_sample.csv");

        handle_train(&config, Some(data), None).unwrap();
        let entries = read_manifest(&config.artifacts.manifest_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "completed");
        assert!(entries[0].finished_at.is_some());
        assert!(entries[0].metrics.as_ref().unwrap()["test"]["rmse"].is_number());
        assert!(config.artifacts.model_path.exists());

        let missing = dir.path().join("missing.csv");
        assert!(handle_train(&config, Some(missing), None).is_err());
        let entries = read_manifest(&config.artifacts.manifest_path).unwrap();
        assert_eq!(entries[1].status, "failed");
        assert!(entries[1].error.is_some());
    }
}
