//! # FBR IRIS Connector CLI
//!
//! Runs connector operations against the local record store.
//!
//! ## Usage
//! ```bash
//! # Submit one record now and print the host response
//! iris-cli submit invoice 42
//!
//! # Queue POS orders on the background submitter
//! iris-cli submit-bg pos 1001 1002 1003
//!
//! # Resubmit everything marked Failed
//! iris-cli retry-failed pos
//!
//! # Refresh cached FBR reference tables (ignore staleness with --force)
//! iris-cli refresh-options --force
//!
//! # Look up and store the buyer's registration type
//! iris-cli check-registration invoice 42
//!
//! # Search cached options
//! iris-cli options hs_code 0101 --limit 20
//! ```
//!
//! Global options `--config <PATH>` and `--db <PATH>` override the platform
//! defaults. Logging follows `RUST_LOG` (default `info`).

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use iris_client::{IrisConfig, IrisService, OrderPaidOutcome, ReqwestTransport};
use iris_core::{Channel, OptionType};
use iris_db::{Database, DbConfig};

const DEFAULT_OPTION_LIMIT: u32 = 20;
const FALLBACK_DB_PATH: &str = "./iris.db";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Submit { channel: Channel, id: String },
    SubmitBackground { channel: Channel, ids: Vec<String> },
    OrderPaid { id: String },
    RetryFailed { channel: Channel },
    RefreshOptions { force: bool },
    CheckRegistration { channel: Channel, id: String },
    Options { option_type: OptionType, query: String, limit: u32 },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("error: {}", message);
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if invocation.command == Command::Help {
        print_usage();
        return Ok(());
    }

    // An explicit config file must load; the platform default may be absent.
    let config = match &invocation.config_path {
        Some(path) => IrisConfig::load(Some(path.clone()))?,
        None => IrisConfig::load_or_default(None),
    };

    let db_path = invocation
        .db_path
        .clone()
        .or_else(|| config.database_path())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DB_PATH));
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!(path = %db_path.display(), "Opening record store");
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let mut service = IrisService::new(
        config,
        Arc::new(db.invoices()),
        Arc::new(db.options()),
        Arc::new(ReqwestTransport::new()),
    );

    let result = run(&mut service, invocation.command).await;
    service.shutdown().await?;
    db.close().await;
    result
}

async fn run(service: &mut IrisService, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Submit { channel, id } => {
            let response = service.send(channel, &id).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::SubmitBackground { channel, ids } => {
            service.start_background();
            for id in &ids {
                service.submit_in_background(channel, id).await?;
            }
            println!("Queued {} {} record(s), waiting for completion...", ids.len(), channel);
        }

        Command::OrderPaid { id } => {
            service.start_background();
            match service.handle_order_paid(&id).await? {
                OrderPaidOutcome::Posted(submitted) => println!("Posted: {}", submitted.invoice_number),
                OrderPaidOutcome::Deferred { error } => println!("Deferred to background: {}", error),
                OrderPaidOutcome::Failed { error } => println!("Failed: {}", error),
                OrderPaidOutcome::Skipped => println!("E-invoicing is disabled for POS orders"),
            }
        }

        Command::RetryFailed { channel } => {
            let results = service.retry_failed(channel).await?;
            if results.is_empty() {
                println!("No failed {} records", channel);
            }
            for retry in results {
                match retry.result {
                    Ok(number) => println!("  ✓ {} → {}", retry.id, number),
                    Err(error) => println!("  ✗ {}: {}", retry.id, error),
                }
            }
        }

        Command::RefreshOptions { force } => {
            let report = service.refresh_reference(force).await?;
            for (option_type, inserted) in &report.inserted {
                println!("  {:<18} +{}", option_type.to_string(), inserted);
            }
            for option_type in &report.skipped_fresh {
                println!("  {:<18} fresh, skipped", option_type.to_string());
            }
            for failure in &report.failures {
                println!("  ✗ {}", failure);
            }
            println!("Inserted {} option(s)", report.total_inserted());
        }

        Command::CheckRegistration { channel, id } => match service.check_buyer_registration(channel, &id).await? {
            Some(kind) => println!("{} {}: {}", channel, id, kind),
            None => println!("{} {}: registration type not recognized, record unchanged", channel, id),
        },

        Command::Options {
            option_type,
            query,
            limit,
        } => {
            let options = service.search_options(option_type, &query, limit).await?;
            for option in &options {
                println!("  {:<16} {}", option.code, option.label());
            }
            println!("{} match(es)", options.len());
        }

        Command::Help => print_usage(),
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

// =============================================================================
// Argument parsing
// =============================================================================

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut config_path = None;
    let mut db_path = None;
    let mut force = false;
    let mut limit = DEFAULT_OPTION_LIMIT;
    let mut positional: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                config_path = Some(PathBuf::from(value_of(args, i)?));
                i += 1;
            }
            "-d" | "--db" => {
                db_path = Some(PathBuf::from(value_of(args, i)?));
                i += 1;
            }
            "-l" | "--limit" => {
                let raw = value_of(args, i)?;
                limit = raw.parse().map_err(|_| format!("invalid limit '{}'", raw))?;
                i += 1;
            }
            "-f" | "--force" => force = true,
            "-h" | "--help" => {
                return Ok(Invocation {
                    config_path,
                    db_path,
                    command: Command::Help,
                })
            }
            flag if flag.starts_with('-') => return Err(format!("unknown option '{}'", flag)),
            other => positional.push(other),
        }
        i += 1;
    }

    let (name, rest) = positional.split_first().ok_or("missing command")?;
    let command = match *name {
        "submit" => {
            let [channel, id] = exact::<2>(rest, "submit <channel> <id>")?;
            Command::Submit {
                channel: parse_channel(channel)?,
                id: id.to_string(),
            }
        }
        "submit-bg" => {
            let (channel, ids) = rest.split_first().ok_or("usage: submit-bg <channel> <id>...")?;
            if ids.is_empty() {
                return Err("usage: submit-bg <channel> <id>...".into());
            }
            Command::SubmitBackground {
                channel: parse_channel(channel)?,
                ids: ids.iter().map(|s| s.to_string()).collect(),
            }
        }
        "order-paid" => {
            let [id] = exact::<1>(rest, "order-paid <id>")?;
            Command::OrderPaid { id: id.to_string() }
        }
        "retry-failed" => {
            let [channel] = exact::<1>(rest, "retry-failed <channel>")?;
            Command::RetryFailed {
                channel: parse_channel(channel)?,
            }
        }
        "refresh-options" => {
            exact::<0>(rest, "refresh-options [--force]")?;
            Command::RefreshOptions { force }
        }
        "check-registration" => {
            let [channel, id] = exact::<2>(rest, "check-registration <channel> <id>")?;
            Command::CheckRegistration {
                channel: parse_channel(channel)?,
                id: id.to_string(),
            }
        }
        "options" => {
            let [option_type, query] = exact::<2>(rest, "options <type> <query> [--limit N]")?;
            Command::Options {
                option_type: option_type.parse().map_err(|e| format!("{}", e))?,
                query: query.to_string(),
                limit,
            }
        }
        other => return Err(format!("unknown command '{}'", other)),
    };

    Ok(Invocation {
        config_path,
        db_path,
        command,
    })
}

fn value_of(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} needs a value", args[i]))
}

fn exact<'a, const N: usize>(rest: &[&'a str], usage: &str) -> Result<[&'a str; N], String> {
    <[&str; N]>::try_from(rest).map_err(|_| format!("usage: {}", usage))
}

fn parse_channel(raw: &str) -> Result<Channel, String> {
    raw.parse().map_err(|e| format!("{}", e))
}

fn print_usage() {
    println!("FBR IRIS Connector");
    println!();
    println!("Usage: iris-cli [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  submit <channel> <id>               Submit one record and wait for FBR");
    println!("  submit-bg <channel> <id>...         Submit records on the background submitter");
    println!("  order-paid <id>                     Run the POS order-paid hook");
    println!("  retry-failed <channel>              Resubmit every Failed record");
    println!("  refresh-options                     Refresh cached FBR reference data");
    println!("  check-registration <channel> <id>   Look up the buyer's registration type");
    println!("  options <type> <query>              Search cached reference options");
    println!();
    println!("Channels: invoice, pos");
    println!("Option types: province, doc_type, hs_code, uom, sale_type, rate,");
    println!("              sro_schedule, sro_item, sro_item_general");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir/iris.toml)");
    println!("  -d, --db <PATH>      Database file (default: platform data dir/iris.db)");
    println!("  -f, --force          Refresh reference data even when fresh");
    println!("  -l, --limit <N>      Max search results (default: {})", DEFAULT_OPTION_LIMIT);
    println!("  -h, --help           Show this help message");
}
