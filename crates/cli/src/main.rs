// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! warden: control-plane CLI for the supervisor daemon.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use warden_daemon::Config;
use warden_wire::{Request, Response};

use client::Client;

#[derive(Parser)]
#[command(name = "warden", about = "Single-host process supervisor", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Daemon management
    #[command(subcommand)]
    Daemon(DaemonCommand),

    /// List all managed services
    List,

    /// Show one service's state
    Status { name: String },

    /// Start a stopped service
    Start { name: String },

    /// Stop a service (cascades to hard dependents)
    Stop {
        name: String,
        /// Per-service stop timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Stop then start a service
    Restart { name: String },

    /// Blue/green replace a routed service
    Deploy {
        name: String,
        /// Drain window in seconds before the old instance is stopped
        #[arg(long)]
        drain: Option<u64>,
    },

    /// Show recent captured output
    Logs {
        name: String,
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = 100)]
        lines: usize,
    },

    /// Re-read the spec directory and reconcile
    Reload,

    /// Secret store management
    #[command(subcommand)]
    Secret(SecretCommand),

    /// Stop the daemon
    Shutdown {
        /// Leave native services running for adoption on next start
        #[arg(long)]
        orphan: bool,
    },
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Run the daemon in the foreground
    Run,
}

#[derive(Subcommand)]
enum SecretCommand {
    /// Store a secret
    Set { key: String, value: String },
    /// Print a secret value
    Get { key: String },
    /// List secret keys
    List,
    /// Delete a secret
    Rm { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("cannot load configuration")?;

    if let Command::Daemon(DaemonCommand::Run) = cli.command {
        let _guard = warden_daemon::lifecycle::init_tracing(&config);
        warden_daemon::lifecycle::run_daemon(config).await?;
        return Ok(());
    }

    let client = Client::new(config.socket_path.clone());
    match cli.command {
        Command::Daemon(_) => unreachable!("handled above"),

        Command::List => match client.request(&Request::ListServices).await? {
            Response::Services { services } => print!("{}", output::render_services(&services)),
            other => bail_on(other)?,
        },

        Command::Status { name } => {
            match client.request(&Request::GetService { name }).await? {
                Response::Service { service } => {
                    print!("{}", output::render_service_detail(&service))
                }
                other => bail_on(other)?,
            }
        }

        Command::Start { name } => {
            expect_ok(client.request(&Request::Start { name: name.clone() }).await?)?;
            println!("starting {}", name);
        }

        Command::Stop { name, timeout } => {
            let request = Request::Stop {
                name: name.clone(),
                timeout_ms: timeout.map(|s| s * 1000),
            };
            expect_ok(client.request(&request).await?)?;
            println!("stopped {}", name);
        }

        Command::Restart { name } => {
            expect_ok(client.request(&Request::Restart { name: name.clone() }).await?)?;
            println!("restarted {}", name);
        }

        Command::Deploy { name, drain } => {
            let request = Request::Deploy {
                name: name.clone(),
                drain_ms: drain.map(|s| s * 1000),
            };
            expect_ok(client.request(&request).await?)?;
            println!("deployed {}", name);
        }

        Command::Logs { name, lines } => {
            match client.request(&Request::Logs { name, lines }).await? {
                Response::Logs { lines } => {
                    for line in lines {
                        println!("{}", line);
                    }
                }
                other => bail_on(other)?,
            }
        }

        Command::Reload => match client.request(&Request::Reload).await? {
            Response::Reloaded { summary } => {
                println!(
                    "reloaded: {} added, {} removed, {} restarted",
                    summary.added.len(),
                    summary.removed.len(),
                    summary.restarted.len()
                );
                for name in summary.added {
                    println!("  + {}", name);
                }
                for name in summary.removed {
                    println!("  - {}", name);
                }
                for name in summary.restarted {
                    println!("  ~ {}", name);
                }
            }
            other => bail_on(other)?,
        },

        Command::Secret(secret) => match secret {
            SecretCommand::Set { key, value } => {
                expect_ok(client.request(&Request::SecretSet { key, value }).await?)?;
                println!("ok");
            }
            SecretCommand::Get { key } => {
                match client.request(&Request::SecretGet { key }).await? {
                    Response::Secret { value } => println!("{}", value),
                    other => bail_on(other)?,
                }
            }
            SecretCommand::List => match client.request(&Request::SecretList).await? {
                Response::Secrets { keys } => {
                    for key in keys {
                        println!("{}", key);
                    }
                }
                other => bail_on(other)?,
            },
            SecretCommand::Rm { key } => {
                expect_ok(client.request(&Request::SecretDelete { key }).await?)?;
                println!("ok");
            }
        },

        Command::Shutdown { orphan } => {
            match client.request(&Request::Shutdown { orphan }).await? {
                Response::ShuttingDown => println!("daemon shutting down"),
                other => bail_on(other)?,
            }
        }
    }

    Ok(())
}

/// Any response other than Ok is a failure for mutation commands.
fn expect_ok(response: Response) -> Result<()> {
    match response {
        Response::Ok => Ok(()),
        other => bail_on(other),
    }
}

/// Surface a daemon error (or an unexpected response shape) as exit 1.
fn bail_on<T>(response: Response) -> Result<T> {
    match response {
        Response::Error { message } => bail!("{}", message),
        other => bail!("unexpected response: {:?}", other),
    }
}
