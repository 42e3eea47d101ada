//! `snowpoll`: run Snowflake queries from the command line.
//!
//! Connection settings come from the environment (and `.env`), see
//! `SnowflakeConfig::from_env`. Ctrl-C cancels a running query.

use std::io::Read;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use snowpoll_core::{active_profile, available_profiles, load_dotenv, to_column_name};
use snowpoll_snowflake::{
    CancellationToken, QueryOptions, QueryOutcome, QueryRunner, SnowflakeConfig, WarehouseSelector,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Submit SQL to Snowflake, poll until it finishes, print the result.
#[derive(Parser, Debug)]
#[command(name = "snowpoll", version, about)]
struct Cli {
    /// Config profile; keys are read as `{PROFILE}_SNOWFLAKE_*` first.
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a query and print its result.
    Query {
        /// SQL text, or `-` to read it from stdin.
        sql: String,

        /// Seconds between status checks (defaults to SNOWFLAKE_POLL_DELAY_SECONDS).
        #[arg(long)]
        delay: Option<u64>,

        /// `default`, `async`, `status`, or a literal warehouse name.
        #[arg(long, default_value = "async")]
        warehouse: WarehouseSelector,

        /// Wait for the statement on submission instead of submitting asynchronously.
        #[arg(long)]
        sync: bool,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,

        /// Rewrite column headers into lowercase identifiers.
        #[arg(long)]
        sanitize_headers: bool,
    },

    /// Convert text into column identifiers, one per line.
    Sanitize {
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// List config profiles found in the environment.
    Profiles,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env");
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Query {
            sql,
            delay,
            warehouse,
            sync,
            json,
            sanitize_headers,
        } => {
            let profile = cli
                .profile
                .map(|p| p.to_uppercase())
                .unwrap_or_else(active_profile);
            let sql = if sql == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("failed to read SQL from stdin")?;
                buf
            } else {
                sql
            };
            if sql.trim().is_empty() {
                bail!("no SQL given");
            }

            let mut options = QueryOptions::default().with_warehouse(warehouse);
            if let Some(seconds) = delay {
                options = options.with_delay(seconds);
            }
            if sync {
                options = options.synchronous();
            }

            run_query(&profile, &sql, &options, json, sanitize_headers).await
        }
        Command::Sanitize { text } => {
            for t in text {
                println!("{}", to_column_name(&t));
            }
            Ok(())
        }
        Command::Profiles => {
            for p in available_profiles() {
                println!("{p}");
            }
            Ok(())
        }
    }
}

async fn run_query(
    profile: &str,
    sql: &str,
    options: &QueryOptions,
    json: bool,
    sanitize_headers: bool,
) -> anyhow::Result<()> {
    let config = SnowflakeConfig::from_env_profiled(profile);
    let label = if profile.is_empty() { "default" } else { profile };
    config
        .validate()
        .with_context(|| format!("invalid Snowflake config (profile: {label})"))?;
    let runner = QueryRunner::from_config(config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling query");
            on_interrupt.cancel();
        }
    });

    let report = runner
        .execute_with_cancel(sql, options, &cancel)
        .await
        .context("query failed")?;
    let stats = &report.stats;

    info!(
        query_id = %stats.handle,
        polls = stats.polls,
        elapsed_s = stats.elapsed.as_secs(),
        "Query finished"
    );

    match report.outcome {
        QueryOutcome::Rows(mut table) => {
            if sanitize_headers {
                table.columns = table.sanitized_columns();
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                println!("{table}");
            }
            Ok(())
        }
        QueryOutcome::Empty => {
            println!("(no rows)");
            Ok(())
        }
        QueryOutcome::Failed { status } => {
            bail!("query {} finished with status {}", stats.handle, status)
        }
        QueryOutcome::TimedOut => bail!(
            "query {} was still running after {}s and has been cancelled",
            stats.handle,
            runner.config().timeout_seconds
        ),
        QueryOutcome::Cancelled => bail!("query {} cancelled", stats.handle),
    }
}
