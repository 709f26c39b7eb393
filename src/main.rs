//! IBP XYZ Segment Write-back
//!
//! Command-line front end: loads the write configuration, reads segment rows
//! from a JSON file and writes them to the planning area with the selected
//! strategy. Also exposes the status, message and config checks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ibp_xyz_writeback::{RawSegmentRow, SegmentWriter, WriteConfig, WriteMode, WriteOptions, WriteTarget};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "ibp-xyz-writeback")]
#[command(author, version, about = "Write XYZ segments back to an IBP planning area", long_about = None)]
struct Args {
    /// Path to the configuration YAML file
    #[arg(short, long, value_name = "FILE", global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Overrides `username` from the config file
    #[arg(long, env = "IBP_USERNAME", hide_env_values = true, global = true)]
    username: Option<String>,

    /// Overrides `password` from the config file
    #[arg(long, env = "IBP_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write segment rows from a JSON array file
    Write {
        /// JSON file holding an array of {PRDID, XYZ_Segment, LOCID?, <period field>?}
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// simple, batched or parallel (recommended from volume when omitted)
        #[arg(short, long)]
        mode: Option<WriteMode>,

        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        scenario: Option<String>,

        /// Period field name (e.g. PERIODID3_TSTAMP)
        #[arg(long)]
        period_field: Option<String>,

        /// Location applied to rows without LOCID
        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        max_workers: Option<usize>,
    },
    /// Show export result and messages of a transaction
    Status { transaction_id: String },
    /// Show platform messages of a transaction
    Messages { transaction_id: String },
    /// Report which settings are configured
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = WriteConfig::from_file(&args.config)
        .context(format!("Failed to load configuration from {:?}", args.config))?;
    if let Some(username) = args.username {
        config.username = username;
    }
    if let Some(password) = args.password {
        config.password = password;
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("Loaded configuration from {:?}", args.config);

    match args.command {
        Command::Write {
            input,
            mode,
            version,
            scenario,
            period_field,
            location,
            batch_size,
            max_workers,
        } => {
            config.ensure_writable()?;

            let content = fs::read_to_string(&input)
                .context(format!("Failed to read input file: {:?}", input))?;
            let mut rows: Vec<RawSegmentRow> = serde_json::from_str(&content)
                .context("Input must be a JSON array of segment rows")?;
            info!("Read {} rows from {:?}", rows.len(), input);

            if let Some(location) = location.filter(|l| !l.trim().is_empty()) {
                for row in rows
                    .iter_mut()
                    .filter(|r| matches!(r.location_id, None | Some(Value::Null)))
                {
                    row.location_id = Some(Value::String(location.clone()));
                }
            }

            let target = WriteTarget::from_config(&config)
                .with_version(version)
                .with_scenario(scenario)
                .with_period_field(period_field);
            let options = WriteOptions::from_config(&config)
                .with_batch_size(batch_size)
                .with_max_workers(max_workers);

            let mode = mode.unwrap_or_else(|| {
                let recommended = WriteMode::recommend(rows.len(), config.simple_record_threshold);
                info!("No mode given, using recommended mode: {}", recommended);
                recommended
            });

            let writer = SegmentWriter::from_config(&config)?;
            let result = writer.write_rows(mode, rows, &target, &options).await?;
            info!(
                "Wrote {} records in {} batches (transaction {})",
                result.records_sent, result.batch_count, result.transaction_id
            );
            print_json(&result)?;
        }
        Command::Status { transaction_id } => {
            let writer = SegmentWriter::from_config(&config)?;
            let status = writer.get_status(&transaction_id).await?;
            print_json(&status)?;
        }
        Command::Messages { transaction_id } => {
            let writer = SegmentWriter::from_config(&config)?;
            let messages = writer.get_messages(&transaction_id).await;
            if messages.is_empty() {
                warn!("No messages found for transaction {}", transaction_id);
            }
            print_json(&messages)?;
        }
        Command::ValidateConfig => {
            let status = config.validate();
            if !status.write_operations_enabled {
                warn!("Write operations are disabled in configuration");
            }
            print_json(&status)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}
