use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod evaluation;
mod models;
mod output;
mod runner;

use crate::config::Config;
use crate::dataset::Metric;
use crate::evaluation::RewardDispatcher;
use crate::output::OutputFormat;
use crate::runner::Runner;

/// RAG evaluation CLI - score question/answer datasets with a reward model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only process the first N rows of the dataset
    #[arg(short, long, global = true)]
    limit: Option<usize>,

    /// Verbose output - log every reward request
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score every row with the reward model and print per-attribute means
    Score {
        /// CSV with question, answer, gt_context and gt_answer columns
        dataset: PathBuf,

        /// Output format: plain or json
        #[arg(short, long, default_value = "plain")]
        output: OutputFormat,
    },
    /// Write the rows as a record set for the external RAG evaluation library
    Export {
        /// CSV with question, answer, gt_context and gt_answer columns
        dataset: PathBuf,

        /// Destination JSON file
        #[arg(long)]
        out: PathBuf,

        /// Metrics to request; defaults to the configured list
        #[arg(short, long = "metric")]
        metrics: Vec<Metric>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rag_reward_eval={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = Config::load(args.config.as_deref())?;
    if args.limit.is_some() {
        config.dataset.limit = args.limit;
    }

    match args.command {
        Command::Score { dataset, output } => score(&config, &dataset, output).await,
        Command::Export {
            dataset,
            out,
            metrics,
        } => export(&config, &dataset, &out, metrics),
    }
}

async fn score(config: &Config, csv_path: &Path, format: OutputFormat) -> Result<()> {
    let api_key = config
        .reward
        .api_key()
        .context("Reward API key is not usable")?;
    let dispatcher = RewardDispatcher::new(&config.reward, api_key)?;

    let records = dataset::load_csv(csv_path, config.dataset.limit)?;
    let runner = Runner::new(Arc::new(dispatcher), config.reward.max_concurrency);
    let report = runner.score_records(records).await;

    output::print_report(&report, format);

    if let Some(storage_path) = &config.reward.storage_path {
        runner::store_results(&report, Path::new(storage_path))?;
    }

    Ok(())
}

fn export(config: &Config, csv_path: &Path, out: &Path, metrics: Vec<Metric>) -> Result<()> {
    let metrics = if metrics.is_empty() {
        config.dataset.metrics.clone()
    } else {
        metrics
    };

    let records = dataset::load_csv(csv_path, config.dataset.limit)?;
    dataset::export_ragas(&records, &metrics, out)
}
