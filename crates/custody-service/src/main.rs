//! Main entry point for the order custody service.
//!
//! Loads the configuration, builds the custody engine from the configured
//! implementations and runs one command against it: replaying a stream of
//! stage requests, or printing an order's ledger history.

use clap::{Parser, Subcommand};
use custody_config::Config;
use custody_core::CustodyEngine;
use custody_types::{OrderId, StageRequest};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

mod factory_registry;

/// Command-line arguments for the custody service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Enqueue stage requests from a JSON-lines file and print the affected traces
	Replay {
		#[arg(short, long)]
		requests: PathBuf,
	},
	/// Print the ledger history of one order
	Trace {
		#[arg(short, long)]
		order_id: OrderId,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	// Logs go to stderr so stdout carries only JSON output.
	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = factory_registry::build_engine_from_config(config).await?;

	let result = match args.command {
		Command::Replay { requests } => replay(&engine, &requests).await,
		Command::Trace { order_id } => print_trace(&engine, order_id).await,
	};

	engine.shutdown().await?;
	result
}

/// Parses one stage request per non-blank line.
fn parse_requests(input: &str) -> Result<Vec<StageRequest>, String> {
	input
		.lines()
		.enumerate()
		.filter(|(_, line)| !line.trim().is_empty())
		.map(|(index, line)| {
			serde_json::from_str(line)
				.map_err(|e| format!("Invalid request on line {}: {}", index + 1, e))
		})
		.collect()
}

async fn replay(
	engine: &CustodyEngine,
	path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
	let input = tokio::fs::read_to_string(path).await?;
	let requests = parse_requests(&input)?;
	tracing::info!(count = requests.len(), "Replaying stage requests");

	let mut touched = BTreeSet::new();
	for request in &requests {
		engine.request(request)?;
		touched.insert(request.order_id);
	}
	engine.flush().await?;

	for order_id in touched {
		print_trace(engine, order_id).await?;
	}
	Ok(())
}

async fn print_trace(
	engine: &CustodyEngine,
	order_id: OrderId,
) -> Result<(), Box<dyn std::error::Error>> {
	let history = engine.trace(order_id).await?;
	let output = serde_json::json!({
		"order_id": order_id,
		"history": history,
	});
	println!("{}", serde_json::to_string(&output)?);
	Ok(())
}
