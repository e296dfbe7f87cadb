//! # KSN Node Entry Point
//!
//! Command-line front end for the rewards engine over a JSON ledger file.
//!
//! ## Commands
//!
//! - `run`: reconcile persisted mining sessions, then supervise accrual
//!   until Ctrl-C
//! - `signup`, `verify`, `resend-otp`: account lifecycle
//! - `mine <user>`: run one accrual session in the foreground
//! - `claim <user> [--referred]`: claim the mined (default) or referred balance
//! - `claims <user>`, `release <claim>`: claim records
//! - `table <user>`: downstream team earnings
//! - `bonus <user>`: preview of the upstream level bonus
//! - `milestone <user>`: evaluate and record the milestone reward
//! - `status <user>`: balances, mining flag, referral counts
//!
//! ## Configuration
//!
//! `--config <file>` loads a TOML file; without it the built-in defaults
//! apply. `KSN_STORE_PATH`, `KSN_LOG_LEVEL`, and `KSN_ACCRUAL_PROFILE`
//! override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use ksn_common::config::load_from_file;
use ksn_common::{ClaimId, ClaimKind, Config, JsonFileStore, SystemClock, UserId};
use ksn_node::{AccrualOutcome, KsnNode, LogNotifier, SignUp};

// ════════════════════════════════════════════════════════════════════════════
// CLI
// ════════════════════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(version, about = "KSN rewards node")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover accrual sessions and supervise them until Ctrl-C.
    Run {
        /// Seconds between outcome reports.
        #[arg(long, default_value_t = 30)]
        report_secs: u64,
    },
    /// Register a new account.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        referral_code: Option<String>,
    },
    /// Verify an account with its one-time password.
    Verify {
        #[arg(long)]
        email: String,
        #[arg(long)]
        otp: u32,
    },
    ResendOtp {
        #[arg(long)]
        email: String,
    },
    /// Start an accrual session and wait for it to end.
    Mine { user: UserId },
    Claim {
        user: UserId,
        /// Claim the referred balance instead of the mined balance.
        #[arg(long)]
        referred: bool,
    },
    Claims { user: UserId },
    Release { claim: ClaimId },
    Table { user: UserId },
    Bonus { user: UserId },
    Milestone { user: UserId },
    Status { user: UserId },
}

#[derive(Serialize)]
struct Status {
    user: UserId,
    username: String,
    mined: rust_decimal::Decimal,
    referred: rust_decimal::Decimal,
    is_mining: bool,
    direct_referrals: u64,
    indirect_referrals: u64,
}

fn load_config(path: Option<&PathBuf>, log_level: Option<String>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_from_file(p).with_context(|| format!("loading {}", p.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(level) = log_level {
        config.log_level = level;
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// SUPERVISION LOOP
// ════════════════════════════════════════════════════════════════════════════

async fn run(node: &KsnNode, report_secs: u64) -> Result<()> {
    let report = node.accrual.recover()?;
    info!(
        resumed = report.resumed,
        completed = report.completed,
        restarted = report.restarted,
        credited_ticks = report.credited_ticks,
        "accrual recovery finished"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(report_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                for (user, outcome) in node.accrual.take_finished() {
                    match outcome {
                        AccrualOutcome::Failed { ticks, error } => {
                            error!(user = %user, ticks, error = %error, "session failed");
                        }
                        other => info!(user = %user, outcome = ?other, "session finished"),
                    }
                }
                info!(active = node.accrual.list().len(), "accrual status");
            }
        }
    }

    node.accrual.shutdown();
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// MAIN
// ════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref(), cli.log_level)?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level()?)
        .with_target(false)
        .init();

    let store = Arc::new(
        JsonFileStore::open(&config.store.path)
            .with_context(|| format!("opening ledger {}", config.store.path.display()))?,
    );
    let node = KsnNode::new(config, store, Arc::new(SystemClock), Arc::new(LogNotifier));

    match cli.cmd {
        Commands::Run { report_secs } => run(&node, report_secs).await?,
        Commands::Signup { username, email, address, referral_code } => {
            let user = node
                .registry
                .sign_up(SignUp { username, email, address, referral_code })
                .await?;
            print_json(&user)?;
        }
        Commands::Verify { email, otp } => print_json(&node.registry.verify(&email, otp)?)?,
        Commands::ResendOtp { email } => {
            node.registry.resend_otp(&email).await?;
            info!(email = %email, "one-time password re-sent");
        }
        Commands::Mine { user } => {
            node.accrual.start_accrual(user)?;
            tokio::select! {
                outcome = node.accrual.wait(user) => print_json(&outcome)?,
                _ = tokio::signal::ctrl_c() => {
                    warn!(user = %user, "interrupted, session left for recovery");
                    node.accrual.shutdown();
                }
            }
        }
        Commands::Claim { user, referred } => {
            let kind = if referred { ClaimKind::Referred } else { ClaimKind::Mined };
            print_json(&node.claims.claim(user, kind)?)?;
        }
        Commands::Claims { user } => print_json(&node.claims.claims_for(user)?)?,
        Commands::Release { claim } => print_json(&node.claims.release_claim(claim)?)?,
        Commands::Table { user } => print_json(&node.rewards.build_referral_table(user)?)?,
        Commands::Bonus { user } => print_json(&node.rewards.compute_level_bonus(user)?)?,
        Commands::Milestone { user } => print_json(&node.milestones.evaluate_milestone(user)?)?,
        Commands::Status { user } => {
            let account = node.registry.user(user)?;
            let counts = node.registry.count_referrals(user)?;
            print_json(&Status {
                user,
                username: account.username,
                mined: account.mined_balance,
                referred: account.referred_balance,
                is_mining: account.mining,
                direct_referrals: counts.direct,
                indirect_referrals: counts.indirect,
            })?;
        }
    }

    Ok(())
}
