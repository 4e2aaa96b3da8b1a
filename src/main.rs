//! hnasctl
//!
//! Command-line front end for the HNAS reconciler: applies YAML task files
//! and gathers facts. Results go to stdout as one JSON document per line;
//! logs go to stderr.

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hnas_reconciler::{
    facts, task, ClientConfig, Credentials, Error, FactFilter, FactType, RestClient, StorageApi,
};

/// Exit status when a task ran but did not reach its desired state
const EXIT_NOT_SUCCESSFUL: u8 = 5;

// =============================================================================
// CLI Arguments
// =============================================================================

/// HNAS Reconciler - desired-state management for Hitachi NAS clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API URL, `protocol://address:port/v<version>`
    #[arg(long, env = "HNAS_API_URL")]
    api_url: String,

    /// API key; takes precedence over username/password
    #[arg(long, env = "HNAS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API username
    #[arg(long, env = "HNAS_API_USERNAME")]
    api_username: Option<String>,

    /// API password
    #[arg(long, env = "HNAS_API_PASSWORD", hide_env_values = true)]
    api_password: Option<String>,

    /// Verify the server's TLS certificate
    #[arg(long, env = "HNAS_VALIDATE_CERTS", default_value_t = true, action = ArgAction::Set)]
    validate_certs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply every task of a task file, stopping at the first failure
    Apply {
        /// YAML task file
        tasks: PathBuf,
    },
    /// Gather facts from the cluster
    Facts {
        /// Fact types to gather
        #[arg(long = "type", required = true, num_args = 1..)]
        types: Vec<FactType>,

        #[arg(long)]
        virtual_server_id: Option<u64>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        filesystem_id: Option<String>,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting hnasctl {}", hnas_reconciler::VERSION);

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{:#}", err);
            println!("{}", json!({ "failed": true, "msg": format!("{:#}", err) }));
            let code = err
                .downcast_ref::<Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<u8> {
    let credentials = Credentials::from_parts(
        args.api_key.clone(),
        args.api_username.clone(),
        args.api_password.clone(),
    )?;
    let config = ClientConfig::new(&args.api_url, credentials, args.validate_certs)?;
    let client = RestClient::new(&config)?;
    let address = client.address().to_string();

    info!("  Endpoint: {}", config.endpoint);
    info!("  Verify TLS: {}", config.verify_tls);

    match args.command {
        Command::Apply { tasks } => {
            let tasks = task::load_tasks(&tasks)
                .with_context(|| format!("cannot load task file {}", tasks.display()))?;
            info!("Loaded {} tasks", tasks.len());

            for task in &tasks {
                let report = task::run_task(&client, task, &config.poll)
                    .await
                    .with_context(|| {
                        format!(
                            "{} task failed on system at [{}]",
                            task.display_name(),
                            address
                        )
                    })?;
                println!("{}", report.to_json(&address)?);

                if !report.success {
                    warn!("Task {} did not reach its desired state, stopping", task.display_name());
                    return Ok(EXIT_NOT_SUCCESSFUL);
                }
            }
            Ok(0)
        }
        Command::Facts {
            types,
            virtual_server_id,
            name,
            label,
            filesystem_id,
        } => {
            let filter = FactFilter {
                virtual_server_id,
                name,
                label,
                filesystem_id,
            };
            let gathered = facts::gather(&client, &types, &filter)
                .await
                .with_context(|| {
                    format!("Failed to obtain facts from system at [{}]", address)
                })?;
            println!(
                "{}",
                json!({
                    "changed": false,
                    "facts": gathered,
                    "msg": format!("Gathered facts from system at [{}]", address),
                })
            );
            Ok(0)
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,reqwest=warn,rustls=warn",
            level
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
