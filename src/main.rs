//! Predictor Bot CLI
//!
//! Multi-wallet betting bot for recurring up/down prediction rounds.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use predictor_bot::oracle::PaperSettings;
use predictor_bot::types::RoundStats;
use predictor_bot::wallet::{signer_address, signer_from_private_key};
use predictor_bot::{
    BotConfigUpdate, BotController, Config, ControlResponse, Database, Dice, EngineContext,
    Keyring, PaperOracle, WalletManager,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "predictor-bot")]
#[command(about = "Multi-wallet betting bot for up/down prediction rounds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot against the paper ledger until Ctrl+C
    Run {
        /// Fund the main wallet with this amount and distribute it across active wallets
        #[arg(long)]
        paper_funding: Option<Decimal>,

        /// Collect all balances back to the main wallet on shutdown
        #[arg(long)]
        collect_on_exit: bool,
    },

    /// Generate new betting wallets
    GenerateWallets {
        /// Number of wallets to create
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// List stored wallets
    Wallets {
        /// Include deactivated wallets
        #[arg(short, long)]
        all: bool,
    },

    /// Show or change the betting config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show recent bets
    History {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show bet statistics
    Stats {
        /// Restrict to one round
        #[arg(short, long)]
        round: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the active config
    Show,

    /// Update config fields; omitted fields keep their value
    Set {
        #[arg(long)]
        min_bet: Option<Decimal>,
        #[arg(long)]
        max_bet: Option<Decimal>,
        /// Earliest bet delay after round start, in seconds
        #[arg(long)]
        bet_time_from: Option<u64>,
        /// Latest bet delay after round start, in seconds
        #[arg(long)]
        bet_time_to: Option<u64>,
        #[arg(long)]
        balance_from: Option<f64>,
        #[arg(long)]
        balance_to: Option<f64>,
        #[arg(long)]
        wallet_count_from: Option<u32>,
        #[arg(long)]
        wallet_count_to: Option<u32>,
        #[arg(long)]
        epoch_from: Option<u64>,
        #[arg(long)]
        epoch_to: Option<u64>,
        /// Remove the epoch window
        #[arg(long, conflicts_with_all = ["epoch_from", "epoch_to"])]
        clear_epochs: bool,
    },
}

/// Everything a command needs, wired against the paper ledger
struct Runtime {
    config: Config,
    db: Arc<Database>,
    oracle: Arc<PaperOracle>,
    ctx: Arc<EngineContext>,
}

impl Runtime {
    async fn new(config: Config) -> Result<Self> {
        let dice = Arc::new(match config.rng_seed {
            Some(seed) => Dice::seeded(seed),
            None => Dice::from_entropy(),
        });
        let db = Arc::new(Database::new(&config.database_path).await?);
        let oracle = Arc::new(PaperOracle::new(
            PaperSettings::for_round_seconds(config.paper_round_seconds),
            Arc::clone(&dice),
        ));
        let keyring = Keyring::from_secret(config.encryption_key.as_deref())?;

        let ctx = Arc::new(EngineContext::new(
            oracle.clone(),
            db.clone(),
            keyring,
            dice,
            config.engine.clone(),
        ));

        Ok(Self {
            config,
            db,
            oracle,
            ctx,
        })
    }

    fn wallet_manager(&self) -> Result<WalletManager> {
        let main_signer = self
            .config
            .main_wallet_private_key
            .as_deref()
            .map(signer_from_private_key)
            .transpose()?;

        Ok(WalletManager::new(
            self.db.clone(),
            self.oracle.clone(),
            self.ctx.keyring.clone(),
            Arc::clone(&self.ctx.dice),
            self.ctx.wallet_locks.clone(),
            main_signer,
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the verbose flag
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let runtime = Runtime::new(config).await?;

    match cli.command {
        Commands::Run {
            paper_funding,
            collect_on_exit,
        } => run_bot(&runtime, paper_funding, collect_on_exit).await?,
        Commands::GenerateWallets { count } => generate_wallets(&runtime, count).await?,
        Commands::Wallets { all } => list_wallets(&runtime, all).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => show_config(&runtime).await?,
            ConfigAction::Set {
                min_bet,
                max_bet,
                bet_time_from,
                bet_time_to,
                balance_from,
                balance_to,
                wallet_count_from,
                wallet_count_to,
                epoch_from,
                epoch_to,
                clear_epochs,
            } => {
                let update = BotConfigUpdate {
                    min_bet,
                    max_bet,
                    bet_time_from,
                    bet_time_to,
                    balance_from,
                    balance_to,
                    wallet_count_from,
                    wallet_count_to,
                    epoch_from: if clear_epochs { Some(None) } else { epoch_from.map(Some) },
                    epoch_to: if clear_epochs { Some(None) } else { epoch_to.map(Some) },
                };
                set_config(&runtime, update).await?
            }
        },
        Commands::History { limit } => show_history(&runtime, limit).await?,
        Commands::Stats { round } => show_stats(&runtime, round).await?,
    }

    Ok(())
}

async fn run_bot(runtime: &Runtime, paper_funding: Option<Decimal>, collect_on_exit: bool) -> Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("  PREDICTOR BOT");
    println!(
        "  Paper Trading: {} | Round length: {}s",
        if runtime.config.paper_trading { "YES" } else { "NO - LIVE MODE" },
        runtime.config.paper_round_seconds
    );
    println!("{}\n", "=".repeat(70));

    let manager = runtime.wallet_manager()?;

    // The paper ledger starts empty: seed it from the stored balances
    let active = manager.list_wallets(true).await?;
    for wallet in &active {
        runtime.oracle.fund(&wallet.address, wallet.balance).await;
    }

    if let Some(total) = paper_funding {
        let main = runtime
            .config
            .main_wallet_private_key
            .as_deref()
            .context("--paper-funding needs MAIN_WALLET_PRIVATE_KEY")?;
        let main_address = signer_address(&signer_from_private_key(main)?);
        runtime
            .oracle
            .fund(
                &main_address,
                total + runtime.oracle.settings().tx_fee * Decimal::from(active.len() as u64),
            )
            .await;
        let report = manager.distribute(total, None, None).await?;
        println!(
            "Distributed {} across {} wallets ({} failed)\n",
            report.total_moved, report.succeeded, report.failed
        );
    }

    let (clock_shutdown, clock_rx) = watch::channel(false);
    let clock = Arc::clone(&runtime.oracle).spawn_clock(clock_rx);

    let controller = BotController::new(Arc::clone(&runtime.ctx));
    let started = ControlResponse::from_result(controller.start().await, "Bot started");
    if !started.success {
        error!("Failed to start: {}", started.message);
        let _ = clock_shutdown.send(true);
        let _ = clock.await;
        return Ok(());
    }

    let report = controller.status().await?;
    println!(
        "Bot running with {} active wallets ({} total balance). Ctrl+C to stop...\n",
        report.active_wallets, report.total_wallet_balance
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Err(e) = controller.stop().await {
        warn!("Stop reported an error: {}", e);
    }

    // Stored balances drift from the ledger as rounds settle
    if let Err(e) = manager.refresh_balances().await {
        warn!("Balance refresh failed: {}", e);
    }

    if collect_on_exit {
        match manager.collect(false).await {
            Ok(report) => println!(
                "Collected {} from {} wallets ({} skipped, {} failed)",
                report.total_moved, report.succeeded, report.skipped, report.failed
            ),
            Err(e) => error!("Collection failed: {}", e),
        }
    }

    let _ = clock_shutdown.send(true);
    let _ = clock.await;

    let stats = controller.get_round_stats(None).await?;
    print_stats(&stats);

    Ok(())
}

async fn generate_wallets(runtime: &Runtime, count: usize) -> Result<()> {
    anyhow::ensure!(
        runtime.ctx.keyring.is_configured(),
        "ENCRYPTION_KEY must be set to generate wallets"
    );
    let manager = runtime.wallet_manager()?;
    let wallets = manager.generate_wallets(count).await?;

    println!("\nGenerated {} wallets:", wallets.len());
    for wallet in &wallets {
        println!("  [{}] {}", wallet.id, wallet.address);
    }
    println!();

    Ok(())
}

async fn list_wallets(runtime: &Runtime, all: bool) -> Result<()> {
    let manager = runtime.wallet_manager()?;
    let wallets = manager.list_wallets(!all).await?;

    println!("\n{}", "=".repeat(70));
    println!("  WALLETS ({})", wallets.len());
    println!("{}\n", "=".repeat(70));

    let mut total = Decimal::ZERO;
    for wallet in &wallets {
        total += wallet.balance;
        println!(
            "  [{:>3}] {} | {:>14} | {}",
            wallet.id,
            wallet.address,
            wallet.balance,
            if wallet.is_active { "active" } else { "retired" }
        );
    }
    println!("\n  Total balance: {}\n", total);

    Ok(())
}

async fn show_config(runtime: &Runtime) -> Result<()> {
    let controller = BotController::new(Arc::clone(&runtime.ctx));
    let config = controller.get_config().await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn set_config(runtime: &Runtime, update: BotConfigUpdate) -> Result<()> {
    let controller = BotController::new(Arc::clone(&runtime.ctx));
    let response = ControlResponse::from_result(controller.update_config(&update).await, "Config updated");
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn show_history(runtime: &Runtime, limit: u32) -> Result<()> {
    let controller = BotController::new(Arc::clone(&runtime.ctx));
    let bets = controller.get_betting_history(limit).await?;

    if bets.is_empty() {
        println!("No bets recorded.\n");
        return Ok(());
    }

    println!("\nRECENT BETS");
    println!("{}", "-".repeat(70));
    for bet in &bets {
        println!(
            "  #{:<6} {} | {}... | {:<4} | {} | {}{}",
            bet.round_number,
            bet.created_at.format("%Y-%m-%d %H:%M:%S"),
            predictor_bot::types::short_address(&bet.wallet_address),
            bet.direction,
            bet.amount,
            bet.status,
            bet.payout.map(|p| format!(" (+{})", p)).unwrap_or_default()
        );
    }
    println!();

    Ok(())
}

async fn show_stats(runtime: &Runtime, round: Option<u64>) -> Result<()> {
    let controller = BotController::new(Arc::clone(&runtime.ctx));
    let stats = controller.get_round_stats(round).await?;
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &RoundStats) {
    println!("\n{}", "=".repeat(70));
    match stats.round_number {
        Some(round) => println!("  ROUND {} STATISTICS", round),
        None => println!("  BOT STATISTICS"),
    }
    println!("{}\n", "=".repeat(70));

    println!("  Total Bets:      {}", stats.total_bets);
    println!("  Total Wagered:   {}", stats.total_amount);
    println!("  Average Bet:     {}", stats.average_bet_amount);
    println!(
        "  Direction:       UP {} ({:.1}%) | DOWN {} ({:.1}%)",
        stats.up_bets, stats.up_percentage, stats.down_bets, stats.down_percentage
    );
    println!(
        "  Outcomes:        {} won | {} lost | {} pending",
        stats.won_bets, stats.lost_bets, stats.pending_bets
    );
    println!("  Total Payout:    {}", stats.total_payout);
    println!();
}
