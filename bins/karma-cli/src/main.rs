//! karma-cli: operational tool for the karma ledger.
//!
//! Registers users, seeds the reward catalog and demo behaviors, prints the
//! admin analytics view, and runs the score reconciliation pass. Works on
//! the same data directory as `karma-server`; RocksDB allows one process at
//! a time, so stop the server first.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{info, warn};

use karma_core::constants::ACTIVITY_WINDOW_DAYS;
use karma_core::ledger::BehaviorRequest;
use karma_core::reconcile;
use karma_core::types::{BehaviorType, NewUser, Role, UserId};
use karma_node::{KarmaService, NodeConfig};

/// Karma ledger command-line interface.
#[derive(Parser)]
#[command(name = "karma-cli")]
#[command(version, about = "Operate a karma ledger data directory.")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User registry subcommands.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Reward catalog subcommands.
    Rewards {
        #[command(subcommand)]
        action: RewardsAction,
    },
    /// Append random behaviors for every registered user.
    DemoSeed(DemoSeedArgs),
    /// Print the admin analytics view as JSON.
    Analytics,
    /// Compare stored scores with ledger sums.
    Reconcile(ReconcileArgs),
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a new user.
    Add(UserAddArgs),
    /// List users in registration order.
    List,
}

#[derive(Subcommand)]
enum RewardsAction {
    /// Replace the catalog with the default rewards.
    Seed,
    /// List every reward, inactive ones included.
    List,
}

#[derive(Args)]
struct UserAddArgs {
    /// Stable user id.
    id: String,

    #[arg(short, long)]
    username: String,

    #[arg(short, long)]
    email: String,

    /// Grant the admin role.
    #[arg(long)]
    admin: bool,
}

#[derive(Args)]
struct DemoSeedArgs {
    /// Behaviors to append per user.
    #[arg(short, long, default_value_t = 20)]
    events: usize,

    /// RNG seed for reproducible data.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct ReconcileArgs {
    /// Apply the corrections instead of only reporting them.
    #[arg(long)]
    repair: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let service = open_service(cli.config, cli.data_dir)?;

    match cli.command {
        Commands::User { action } => match action {
            UserAction::Add(args) => user_add(&service, args),
            UserAction::List => user_list(&service),
        },
        Commands::Rewards { action } => match action {
            RewardsAction::Seed => rewards_seed(&service),
            RewardsAction::List => rewards_list(&service),
        },
        Commands::DemoSeed(args) => demo_seed(&service, args),
        Commands::Analytics => analytics(&service),
        Commands::Reconcile(args) => reconcile_scores(&service, args),
    }
}

fn open_service(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<KarmaService> {
    let mut config = NodeConfig::load(config.as_deref()).context("Failed to load configuration")?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    KarmaService::open(&config).with_context(|| {
        format!(
            "Failed to open the karma store at {}",
            config.db_path().display()
        )
    })
}

fn user_add(service: &KarmaService, args: UserAddArgs) -> Result<()> {
    let user = service
        .store()
        .register_user(NewUser {
            id: UserId::new(args.id),
            username: args.username,
            email: args.email,
            role: if args.admin { Role::Admin } else { Role::User },
        })
        .context("Failed to register user")?;
    println!("Registered {} ({}), ordinal {}", user.id, user.username, user.ordinal);
    Ok(())
}

fn user_list(service: &KarmaService) -> Result<()> {
    let users = service.store().list_users()?;
    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }
    println!("{:<24} {:<20} {:>8}  {:<6} unlocked", "id", "username", "karma", "role");
    for user in users {
        let role = if user.is_admin() { "admin" } else { "user" };
        println!(
            "{:<24} {:<20} {:>8}  {:<6} {}",
            user.id.as_str(),
            user.username,
            user.karma_score,
            role,
            user.unlocked_rewards.len()
        );
    }
    Ok(())
}

fn rewards_seed(service: &KarmaService) -> Result<()> {
    let rewards = service
        .rewards()
        .seed_default_catalog()
        .context("Failed to seed reward catalog")?;
    println!("Seeded {} rewards.", rewards.len());
    Ok(())
}

fn rewards_list(service: &KarmaService) -> Result<()> {
    for reward in service.store().list_rewards()? {
        println!(
            "#{:<4} {:>6} karma  {:<28} {}",
            reward.id.0,
            reward.karma_required,
            reward.title,
            if reward.active { "" } else { "(inactive)" }
        );
    }
    Ok(())
}

/// Description used for demo events of each kind.
fn demo_description(kind: &BehaviorType) -> &'static str {
    match kind {
        BehaviorType::PaymentOnTime => "Paid credit card bill on time",
        BehaviorType::PaymentLate => "Missed a payment due date",
        BehaviorType::CreditUtilizationLow => "Kept credit utilization under 30%",
        BehaviorType::CreditUtilizationHigh => "Credit utilization above 70%",
        BehaviorType::NewCreditAccount => "Opened a new credit account",
        BehaviorType::CreditCheck => "Hard credit inquiry",
        BehaviorType::Other(_) => "Demo behavior",
    }
}

fn demo_seed(service: &KarmaService, args: DemoSeedArgs) -> Result<()> {
    let users = service.store().list_users()?;
    if users.is_empty() {
        bail!("No users registered; add some with `karma-cli user add` first");
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let now = Utc::now();
    let window_secs = Duration::days(ACTIVITY_WINDOW_DAYS).num_seconds();

    let mut appended = 0usize;
    for user in &users {
        for _ in 0..args.events {
            let kind = BehaviorType::KNOWN[rng.gen_range(0..BehaviorType::KNOWN.len())].clone();
            let date = now - Duration::seconds(rng.gen_range(0..window_secs));
            let request = BehaviorRequest {
                kind: Some(kind.to_string()),
                description: Some(demo_description(&kind).to_string()),
                metadata: json!({ "source": "demo" }).as_object().cloned(),
                date: Some(date.to_rfc3339()),
            };
            service
                .ledger()
                .record(&user.id, request, now)
                .with_context(|| format!("Failed to append demo behavior for {}", user.id))?;
            appended += 1;
        }
        info!(user = %user.id, events = args.events, "demo behaviors appended");
    }

    println!("Appended {appended} behaviors across {} users.", users.len());
    Ok(())
}

fn analytics(service: &KarmaService) -> Result<()> {
    let view = service.reporter().global_analytics(Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn reconcile_scores(service: &KarmaService, args: ReconcileArgs) -> Result<()> {
    let store = service.store().as_ref();
    let drifts = reconcile::audit(store).context("Reconciliation audit failed")?;
    if drifts.is_empty() {
        println!("All scores match their ledgers.");
        return Ok(());
    }

    warn!(drifted = drifts.len(), "scores differ from their ledgers");
    println!("{:<24} {:>10} {:>10} {:>10}", "user", "stored", "ledger", "delta");
    for drift in &drifts {
        println!(
            "{:<24} {:>10} {:>10} {:>+10}",
            drift.user_id.as_str(),
            drift.stored,
            drift.ledger_total,
            drift.correction()
        );
    }

    if args.repair {
        let repaired = reconcile::repair(store, &drifts).context("Reconciliation repair failed")?;
        info!(repaired, "reconciliation repair applied");
        println!("Repaired {repaired} users.");
    } else {
        println!("Run again with --repair to apply the corrections.");
    }
    Ok(())
}
