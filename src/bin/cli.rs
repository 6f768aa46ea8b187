//! CLI for the coordination client and its demo scenarios

use clap::{Parser, Subcommand, ValueEnum};
use coordkv::common::parse_duration;
use coordkv::ops::{self, ScenarioConfig};
use coordkv::{Client, ClientConfig, DeleteOptions, GetOptions, LeaseId, PutOptions, WatchOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "coordkv")]
#[command(about = "Client for etcd-style coordination stores")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store endpoints (comma-separated)
    #[arg(long, value_delimiter = ',', global = true)]
    endpoints: Vec<String>,

    /// Connect deadline, e.g. 2s
    #[arg(long, value_parser = parse_duration, global = true)]
    dial_timeout: Option<Duration>,

    /// Per-request deadline, e.g. 10s
    #[arg(long, value_parser = parse_duration, global = true)]
    request_timeout: Option<Duration>,

    /// Use an in-process store instead of connecting
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demonstration scenarios
    Demo {
        #[arg(long, value_enum, default_value_t = Scenario::All)]
        scenario: Scenario,

        /// Wait before checking the leased key is gone
        #[arg(long, default_value = "3s", value_parser = parse_duration)]
        lease_wait: Duration,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Put a key
    Put {
        key: String,
        value: String,

        /// Attach to a lease (hex ID)
        #[arg(long, value_parser = parse_lease_id)]
        lease: Option<LeaseId>,
    },

    /// Get a key or range
    Get {
        key: String,

        #[arg(long)]
        prefix: bool,

        #[arg(long)]
        from_key: bool,

        /// Maximum entries; 0 means all
        #[arg(long, default_value = "0")]
        limit: u64,

        /// Read at a past revision
        #[arg(long)]
        rev: Option<i64>,

        #[arg(long)]
        keys_only: bool,

        #[arg(long)]
        json: bool,
    },

    /// Delete a key or range
    Del {
        key: String,

        #[arg(long)]
        prefix: bool,
    },

    /// Watch a key or range until interrupted
    Watch {
        key: String,

        #[arg(long)]
        prefix: bool,

        /// Replay history from this revision first
        #[arg(long)]
        rev: Option<i64>,

        /// Exit after this many events
        #[arg(long)]
        count: Option<usize>,
    },

    /// Lease commands
    Lease {
        #[command(subcommand)]
        command: LeaseCommands,
    },
}

#[derive(Subcommand)]
enum LeaseCommands {
    /// Grant a lease
    Grant {
        /// TTL in seconds
        ttl: i64,
    },

    /// Revoke a lease and delete its keys
    Revoke {
        #[arg(value_parser = parse_lease_id)]
        id: LeaseId,
    },

    /// Show a lease's remaining TTL
    Ttl {
        #[arg(value_parser = parse_lease_id)]
        id: LeaseId,

        /// Also list attached keys
        #[arg(long)]
        keys: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scenario {
    All,
    SingleValue,
    Pagination,
    Watch,
    Lease,
}

fn parse_lease_id(s: &str) -> Result<LeaseId, String> {
    i64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map(LeaseId::new)
        .map_err(|e| format!("invalid lease ID {}: {}", s, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if !cli.endpoints.is_empty() {
        config.endpoints = cli.endpoints.clone();
    }
    if let Some(timeout) = cli.dial_timeout {
        config.dial_timeout_ms = timeout.as_millis() as u64;
    }
    if let Some(timeout) = cli.request_timeout {
        config.request_timeout_ms = timeout.as_millis() as u64;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let client = if cli.in_memory {
        Client::in_memory(&config)?
    } else {
        Client::connect(&config).await?
    };

    match cli.command {
        Commands::Demo {
            scenario,
            lease_wait,
            json,
        } => {
            let scenarios = ScenarioConfig {
                lease_wait,
                ..Default::default()
            };
            run_demo(&client, scenario, &scenarios, json).await?;
        }

        Commands::Put { key, value, lease } => {
            let mut options = PutOptions::new();
            if let Some(lease) = lease {
                options = options.with_lease(lease);
            }
            let resp = client.put(key, value, options).await?;
            println!("OK (revision {})", resp.revision);
        }

        Commands::Get {
            key,
            prefix,
            from_key,
            limit,
            rev,
            keys_only,
            json,
        } => {
            let mut options = GetOptions::new().with_limit(limit);
            if prefix {
                options = options.with_prefix();
            }
            if from_key {
                options = options.with_from_key();
            }
            if let Some(rev) = rev {
                options = options.with_revision(rev);
            }
            if keys_only {
                options = options.with_keys_only();
            }
            let resp = client.get(key, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resp.kvs)?);
            } else {
                for kv in &resp.kvs {
                    if keys_only {
                        println!("{}", kv.key_str());
                    } else {
                        println!("{} = {}", kv.key_str(), kv.value_str());
                    }
                }
                if resp.more {
                    println!("({} of {} shown)", resp.kvs.len(), resp.count);
                }
            }
        }

        Commands::Del { key, prefix } => {
            let mut options = DeleteOptions::new();
            if prefix {
                options = options.with_prefix();
            }
            let resp = client.delete(key, options).await?;
            println!("Deleted {} (revision {})", resp.deleted, resp.revision);
        }

        Commands::Watch {
            key,
            prefix,
            rev,
            count,
        } => {
            let mut options = WatchOptions::new();
            if prefix {
                options = options.with_prefix();
            }
            if let Some(rev) = rev {
                options = options.with_start_revision(rev);
            }
            let mut stream = client.watch(key, options).await?;
            let mut seen = 0;
            loop {
                let event = tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = stream.next_event() => event,
                };
                match event {
                    Some(Ok(event)) => {
                        println!(
                            "{} {} = {} (revision {})",
                            event.kind,
                            event.kv.key_str(),
                            event.kv.value_str(),
                            event.revision()
                        );
                        seen += 1;
                        if count.is_some_and(|n| seen >= n) {
                            break;
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                }
            }
            stream.close().await?;
        }

        Commands::Lease { command } => match command {
            LeaseCommands::Grant { ttl } => {
                let lease = client.grant_lease(ttl).await?;
                println!("Lease {} granted with TTL {}s", lease.id, lease.ttl);
            }
            LeaseCommands::Revoke { id } => {
                let revision = client.revoke_lease(id).await?;
                println!("Lease {} revoked (revision {})", id, revision);
            }
            LeaseCommands::Ttl { id, keys } => {
                let ttl = client.lease_time_to_live(id, keys).await?;
                if ttl.is_expired() {
                    println!("Lease {} already expired", id);
                } else {
                    println!(
                        "Lease {}: {}s remaining of {}s",
                        id, ttl.ttl, ttl.granted_ttl
                    );
                    for key in &ttl.keys {
                        println!("  {}", String::from_utf8_lossy(key));
                    }
                }
            }
        },
    }

    Ok(())
}

async fn run_demo(
    client: &Client,
    scenario: Scenario,
    config: &ScenarioConfig,
    json: bool,
) -> anyhow::Result<()> {
    match scenario {
        Scenario::All => {
            let report = ops::run_all(client, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_single_value(&report.single_value);
                print_pagination(&report.pagination);
                print_watch(&report.watch);
                print_lease(&report.lease);
            }
        }
        Scenario::SingleValue => {
            let report = ops::single_value(client).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_single_value(&report);
            }
        }
        Scenario::Pagination => {
            let report = ops::paginate_prefix(client, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_pagination(&report);
            }
        }
        Scenario::Watch => {
            let report = ops::watch_prefix(client, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_watch(&report);
            }
        }
        Scenario::Lease => {
            let report = ops::lease_expiry(client, config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_lease(&report);
            }
        }
    }
    Ok(())
}

fn print_single_value(report: &ops::SingleValueReport) {
    println!("Single value report:");
    println!("  First revision: {}", report.first_revision);
    println!("  Second revision: {}", report.second_revision);
    println!("  Latest value: {}", report.latest.as_deref().unwrap_or("<none>"));
    println!(
        "  Value at first revision: {}",
        report.at_first_revision.as_deref().unwrap_or("<none>")
    );
}

fn print_pagination(report: &ops::PaginationReport) {
    println!("Pagination report:");
    println!("  Keys inserted: {}", report.inserted);
    println!("  Keys paged: {}", report.total);
    println!("  Revision: {}", report.revision);
    for (i, page) in report.pages.iter().enumerate() {
        println!(
            "  Page {}: {}..{} ({} keys)",
            i + 1,
            page.first_key,
            page.last_key,
            page.len
        );
    }
}

fn print_watch(report: &ops::WatchReport) {
    println!("Watch report:");
    for event in &report.events {
        println!(
            "  {} {} = {} (revision {})",
            event.kind,
            event.kv.key_str(),
            event.kv.value_str(),
            event.revision()
        );
    }
    println!("  Events after cancel: {}", report.late_events);
}

fn print_lease(report: &ops::LeaseReport) {
    println!("Lease report:");
    println!("  Lease: {} (TTL {}s)", report.lease, report.ttl);
    println!("  Present before grant: {}", report.present_before);
    println!("  Present with lease: {}", report.present_with_lease);
    println!("  Present after expiry: {}", report.present_after_expiry);
}
