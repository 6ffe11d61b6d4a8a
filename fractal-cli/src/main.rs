//! Command-line front end for the Fractal Policy Controller.

use clap::{Parser, Subcommand};
use fractal_core::{GlobalBudget, RawSpan, Span};
use fractal_engine::Controller;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fractal", version, about = "Inspect and exercise the Fractal Policy Controller")]
struct Cli {
    /// Directory holding policy_table.json, thresholds.json, calibration_set.json.
    /// Falls back to built-in defaults for any file not found.
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a query and print the resulting policy bundle as JSON.
    ShowPolicies {
        query: String,
        #[arg(long, default_value_t = 3500)]
        token_budget: i64,
        /// JSON array of raw spans (`{span_id, span_type, cost, text}`) from
        /// an upstream collaborator. Unrecognized `span_type` values are
        /// remapped to `aux_dep` rather than rejected.
        #[arg(long)]
        spans_file: Option<PathBuf>,
    },
    /// Run the calibration monitor once and report drift status.
    CheckDrift,
    /// Export the current telemetry ring as JSON.
    ExportTelemetry,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let controller = match Controller::load(&cli.config_dir) {
        Ok(controller) => controller,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(controller, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(mut controller: Controller, command: Command) -> Result<(), serde_json::Error> {
    match command {
        Command::ShowPolicies { query, token_budget, spans_file } => {
            let budget = GlobalBudget {
                tokens: token_budget,
                ..GlobalBudget::default()
            };
            let spans = load_spans(spans_file.as_deref());
            let total_tokens = spans.iter().map(|s| s.cost).sum();
            let outcome = controller.handle(&query, &[], spans, total_tokens, &budget, &[], false, false);
            println!("{}", serde_json::to_string_pretty(&outcome.policies)?);
        }
        Command::CheckDrift => {
            let check = controller.check_drift();
            println!(
                "ece={:.4} drift_detected={} logic_floor={:.2}",
                check.ece, check.drift_detected, check.logic_floor
            );
        }
        Command::ExportTelemetry => {
            let export = controller.telemetry.export();
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
    }
    Ok(())
}

/// Load spans from `path`, if given, converting each `RawSpan` via
/// `into_span` so unrecognized `span_type` strings fall back to `aux_dep`
/// instead of being rejected. A missing or malformed file is a collaborator
/// failure: substitute an empty span set and warn, never fail the command.
fn load_spans(path: Option<&std::path::Path>) -> Vec<Span> {
    let Some(path) = path else {
        return Vec::new();
    };
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "failed to read spans file, proceeding with no spans");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<RawSpan>>(&contents) {
        Ok(raw_spans) => raw_spans.into_iter().map(RawSpan::into_span).collect(),
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "failed to parse spans file, proceeding with no spans");
            Vec::new()
        }
    }
}
