//! Eligify CLI
//!
//! Exit codes: `0` passed (or command succeeded), `1` evaluation failed,
//! `2` error (bad criteria, unreadable input, ...).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use eligify_core::{CompiledCriteria, Criteria, EvaluationResult, Record};
use eligify_runtime::{EvaluateOptions, EvaluationOrchestrator, RuntimeConfig, TracingRecorder};

#[derive(Parser)]
#[command(name = "eligify")]
#[command(about = "Evaluate records against eligibility criteria")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a criteria file loads and compiles
    Validate {
        /// Criteria file (.yaml, .yml or .json)
        criteria: PathBuf,
    },

    /// Print the structural fingerprint of a criteria (and optionally a record)
    Fingerprint {
        criteria: PathBuf,

        /// Also fingerprint this record
        #[arg(short, long)]
        record: Option<PathBuf>,
    },

    /// Evaluate one record
    Evaluate {
        #[arg(short, long)]
        criteria: PathBuf,

        /// Record file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        record: PathBuf,

        /// Runtime configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Log the evaluation through the audit recorder
        #[arg(long)]
        record_result: bool,
    },

    /// Evaluate every record in a file (JSON array, YAML list or JSON lines)
    Batch {
        #[arg(short, long)]
        criteria: PathBuf,

        #[arg(short, long)]
        records: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker threads (defaults to the configured concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Validate { criteria } => cmd_validate(&criteria),
        Commands::Fingerprint { criteria, record } => cmd_fingerprint(&criteria, record.as_deref()),
        Commands::Evaluate {
            criteria,
            record,
            config,
            format,
            record_result,
        } => cmd_evaluate(&criteria, &record, config.as_deref(), format, record_result).await,
        Commands::Batch {
            criteria,
            records,
            config,
            concurrency,
            format,
        } => cmd_batch(&criteria, &records, config.as_deref(), concurrency, format).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

fn cmd_validate(path: &Path) -> Result<bool> {
    let compiled = load_criteria(path)?;
    println!(
        "OK: '{}' ({} rules, {} top-level groups)",
        compiled.name(),
        compiled.all_rules().len(),
        compiled.groups().len()
    );
    Ok(true)
}

fn cmd_fingerprint(path: &Path, record: Option<&Path>) -> Result<bool> {
    let compiled = load_criteria(path)?;
    println!("criteria {}", compiled.fingerprint());
    if let Some(record_path) = record {
        let record = parse_record(read_input(record_path)?, record_path)?;
        println!("record   {}", record.fingerprint());
    }
    Ok(true)
}

async fn cmd_evaluate(
    criteria_path: &Path,
    record_path: &Path,
    config_path: Option<&Path>,
    format: Format,
    record_result: bool,
) -> Result<bool> {
    let compiled = load_criteria(criteria_path)?;
    let record = parse_record(read_input(record_path)?, record_path)?;
    let orchestrator = orchestrator(load_config(config_path)?);

    let mut options = orchestrator.default_options();
    options.record_result |= record_result;

    let result = orchestrator
        .evaluate(&compiled, &record, options)
        .await
        .context("Evaluation failed")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_result(&result),
    }
    Ok(result.passed)
}

async fn cmd_batch(
    criteria_path: &Path,
    records_path: &Path,
    config_path: Option<&Path>,
    concurrency: Option<usize>,
    format: Format,
) -> Result<bool> {
    let compiled = Arc::new(load_criteria(criteria_path)?);
    let records = parse_records(read_input(records_path)?, records_path)?;

    let mut config = load_config(config_path)?;
    if let Some(n) = concurrency {
        config = config.with_concurrency(n);
    }
    let orchestrator = orchestrator(config);

    let options = EvaluateOptions {
        use_cache: false,
        ..orchestrator.default_options()
    };
    let batch = orchestrator
        .evaluate_batch(compiled, records, options)
        .await
        .context("Batch evaluation failed")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&batch)?),
        Format::Text => {
            for (i, result) in batch.results.iter().enumerate() {
                println!("#{:<4} {}", i + 1, result.summary());
            }
            println!(
                "\n{} evaluated, {} passed, {} failed",
                batch.total_evaluated, batch.total_passed, batch.total_failed
            );
        }
    }
    Ok(batch.total_failed == 0)
}

fn orchestrator(config: RuntimeConfig) -> EvaluationOrchestrator {
    EvaluationOrchestrator::builder()
        .config(config)
        .recorder(Arc::new(TracingRecorder))
        .build()
}

fn print_result(result: &EvaluationResult) {
    println!("{}", result.summary());
    println!("{}", "=".repeat(50));
    for outcome in &result.execution_log {
        let mark = if outcome.skipped {
            "SKIP"
        } else if outcome.passed {
            "PASS"
        } else {
            "FAIL"
        };
        let actual = outcome
            .actual
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "<missing>".to_string());
        println!(
            "  [{}] {:<10} {} {} {} (actual {}, weight {})",
            mark, outcome.rule_id, outcome.field, outcome.operator, outcome.expected, actual, outcome.weight
        );
        if let Some(error) = &outcome.error {
            println!("         {}", error);
        }
    }
    for group in &result.groups {
        println!(
            "  group {} ({}): {} {}/{}",
            group.group_id,
            group.logic,
            if group.passed { "passed" } else { "failed" },
            group.passed_count,
            group.considered
        );
    }
}

fn load_criteria(path: &Path) -> Result<CompiledCriteria> {
    let criteria = Criteria::from_file(path)
        .with_context(|| format!("Failed to load criteria from {}", path.display()))?;
    criteria
        .compile()
        .with_context(|| format!("Invalid criteria in {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(p) => RuntimeConfig::from_yaml_file(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read stdin")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse_document(content: &str, path: &Path) -> Result<Value> {
    if is_yaml(path) {
        serde_yaml::from_str(content).with_context(|| format!("Invalid YAML in {}", path.display()))
    } else {
        serde_json::from_str(content).with_context(|| format!("Invalid JSON in {}", path.display()))
    }
}

fn parse_record(content: String, path: &Path) -> Result<Record> {
    let value = parse_document(&content, path)?;
    match Record::from_value(value) {
        Some(record) => Ok(record),
        None => bail!("Record in {} must be an object", path.display()),
    }
}

fn parse_records(content: String, path: &Path) -> Result<Vec<Record>> {
    let values: Vec<Value> = match parse_document(&content, path) {
        Ok(Value::Array(items)) => items,
        Ok(other) => vec![other],
        // Not a single document: try JSON lines.
        Err(_) if !is_yaml(path) => content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str::<Value>(line)
                    .with_context(|| format!("Invalid JSON on line {} of {}", i + 1, path.display()))
            })
            .collect::<Result<_>>()?,
        Err(e) => return Err(e),
    };

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            Record::from_value(value)
                .with_context(|| format!("Record #{} in {} is not an object", i + 1, path.display()))
        })
        .collect()
}
