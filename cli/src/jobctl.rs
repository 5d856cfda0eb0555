//! # jobctl
//!
//! Shell access to job registries, locks and state values on the configured
//! Redis. Every command prints one JSON object to stdout; logs go to stderr
//! unless `OUTPUT` says otherwise.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::debug;

use lib_commons::configs::{ConfigSource, LogOutput, LoggerConfig, RedisConfig};
use lib_commons::connections::CacheHandler;
use lib_commons::loggers::init_logging;
use lib_commons::{Job, JobRegistry, JobScanner, LockManager, StateStore};

/// Inspect and drive distributed jobs and state stored in Redis.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON configuration file. Environment variables override it.
    #[arg(long, short = 'c', global = true, env = "JOBCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Prefix of the environment variables to read (`{PREFIX}_REDIS_URL`).
    #[arg(long, short = 'p', global = true, default_value = "", env = "JOBCTL_PREFIX")]
    prefix: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Checks that Redis answers.
    Ping,

    /// Registers a job, or moves the due time of an existing one.
    Add {
        #[arg(long, default_value = "jobs")]
        registry: String,
        name: String,
        due_time: i64,
    },

    /// Claims the first free job and prints it with the owner token.
    Claim {
        #[arg(long, default_value = "jobs")]
        registry: String,
        #[arg(long, default_value = "lock:")]
        lock_ns: String,
        /// Owner token. A random one is generated when omitted.
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value_t = 30_000)]
        ttl_ms: u64,
    },

    /// Releases a lock held by `owner`.
    Unlock {
        #[arg(long, default_value = "lock:")]
        lock_ns: String,
        name: String,
        #[arg(long)]
        owner: String,
    },

    /// Removes a job if its due time still matches.
    Remove {
        #[arg(long, default_value = "jobs")]
        registry: String,
        name: String,
        due_time: i64,
    },

    /// Renews a lock held by `owner`.
    Extend {
        #[arg(long, default_value = "lock:")]
        lock_ns: String,
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value_t = 30_000)]
        ttl_ms: u64,
    },

    /// Stores a JSON value at `namespace:name`.
    StateSet {
        namespace: String,
        name: String,
        value: String,
        /// Expiry in milliseconds. Kept forever when omitted.
        #[arg(long)]
        ttl_ms: Option<u64>,
    },

    /// Reads the JSON value at `namespace:name`.
    StateGet { namespace: String, name: String },

    /// Stores a JSON value in a field of the `namespace` hash.
    Hset {
        namespace: String,
        field: String,
        value: String,
    },

    /// Reads a field of the `namespace` hash.
    Hget { namespace: String, field: String },
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("value is not valid JSON: {}", raw))
}

fn job_json(job: &Job) -> Value {
    json!({ "name": job.name, "due_time": job.due_time })
}

async fn run(command: Command, cache: &CacheHandler) -> Result<Value> {
    let store = cache.store();
    let output = match command {
        Command::Ping => {
            cache.ping().await?;
            json!({ "ok": true })
        }
        Command::Add { registry, name, due_time } => {
            JobRegistry::new(store).add(&registry, &Job::new(name, due_time)).await?;
            json!({ "ok": true })
        }
        Command::Claim { registry, lock_ns, owner, ttl_ms } => {
            let owner = owner.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let claimed = JobScanner::new(store)
                .find_and_lock(&registry, &lock_ns, &owner, Duration::from_millis(ttl_ms))
                .await?;
            json!({ "job": claimed.as_ref().map(job_json), "owner": owner })
        }
        Command::Unlock { lock_ns, name, owner } => {
            let released = LockManager::new(store).unlock(&lock_ns, &name, &owner).await?;
            json!({ "released": released })
        }
        Command::Remove { registry, name, due_time } => {
            let removed = JobRegistry::new(store).remove(&registry, &Job::new(name, due_time)).await?;
            json!({ "removed": removed })
        }
        Command::Extend { lock_ns, name, owner, ttl_ms } => {
            let renewed = LockManager::new(store)
                .extend(&lock_ns, &name, &owner, Duration::from_millis(ttl_ms))
                .await?;
            json!({ "renewed": renewed })
        }
        Command::StateSet { namespace, name, value, ttl_ms } => {
            let value = parse_json(&value)?;
            StateStore::new(store)
                .set(&namespace, &name, &value, ttl_ms.map(Duration::from_millis))
                .await?;
            json!({ "ok": true })
        }
        Command::StateGet { namespace, name } => {
            let value: Option<Value> = StateStore::new(store).fetch(&namespace, &name).await?;
            json!({ "found": value.is_some(), "value": value })
        }
        Command::Hset { namespace, field, value } => {
            let value = parse_json(&value)?;
            StateStore::new(store).hset(&namespace, &field, &value).await?;
            json!({ "ok": true })
        }
        Command::Hget { namespace, field } => {
            let value: Option<Value> = StateStore::new(store).hfetch(&namespace, &field).await?;
            json!({ "found": value.is_some(), "value": value })
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = ConfigSource::load(cli.config.as_deref(), &cli.prefix).context("loading configuration")?;
    let mut logger_config = LoggerConfig::from_source(&source)?;
    if source.get("OUTPUT").is_none() {
        logger_config.output = LogOutput::Stderr;
    }
    let _guard = init_logging(&logger_config)?;

    let redis_config = RedisConfig::from_source(&source)?;
    debug!(url = %redis_config.url, db = redis_config.db, "connecting");
    let cache = CacheHandler::connect(&redis_config)
        .await
        .with_context(|| format!("connecting to redis at {}", redis_config.url))?;

    let output = run(cli.command, &cache).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_claim_with_defaults() {
        let cli = Cli::try_parse_from(["jobctl", "claim", "--owner", "w1"]).unwrap();
        match cli.command {
            Command::Claim { registry, lock_ns, owner, ttl_ms } => {
                assert_eq!(registry, "jobs");
                assert_eq!(lock_ns, "lock:");
                assert_eq!(owner.as_deref(), Some("w1"));
                assert_eq!(ttl_ms, 30_000);
            }
            _ => panic!("expected claim"),
        }
    }

    #[test]
    fn negative_due_times_are_accepted() {
        let cli = Cli::try_parse_from(["jobctl", "remove", "user=1", "--", "-5"]).unwrap();
        assert!(matches!(cli.command, Command::Remove { due_time: -5, .. }));
    }

    #[test]
    fn state_values_must_be_json() {
        assert!(parse_json(r#"{"a": 1}"#).is_ok());
        assert!(parse_json("not json").is_err());
    }
}
