//! FX Signal Agent
//!
//! Turns directional predictions into risk-sized simulated trades:
//! records signals, opens trades with TP/SL placement, and settles them
//! against rule-triggered or manual exits.

mod agent;
mod db;
mod feed;
mod models;
mod notify;
mod trading;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::agent::{Agent, AgentConfig};
use crate::db::Database;
use crate::feed::CsvTrendSource;
use crate::models::{Account, TradeSide};
use crate::notify::Notifier;
use crate::trading::{pip_size, size_position, LedgerError, OpenTrade, RiskConfig, TradeLedger};

/// FX signal agent CLI.
#[derive(Parser)]
#[command(name = "fxagent")]
#[command(about = "Trade FX signals with risk-bounded position sizing", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "sqlite:./fxagent.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user
    Register {
        /// Username (unique)
        username: String,

        /// Telegram chat id for notifications
        #[arg(long)]
        chat_id: Option<String>,
    },

    /// Manage trading accounts
    Account {
        #[command(subcommand)]
        action: AccountCmd,
    },

    /// Open a trade manually
    Open {
        #[arg(short, long)]
        user: i64,

        /// Account id (defaults to the user's default account)
        #[arg(short, long)]
        account: Option<i64>,

        /// Pair symbol, e.g. EURUSD
        #[arg(short, long)]
        symbol: String,

        /// BUY or SELL
        #[arg(long)]
        side: String,

        /// Entry price
        #[arg(short, long)]
        entry: f64,

        /// Stop-loss price
        #[arg(long)]
        stop: f64,

        /// Take-profit price
        #[arg(long)]
        take_profit: Option<f64>,

        /// Lot size; computed from the account's risk settings when omitted
        #[arg(long)]
        lot: Option<f64>,

        /// Confidence behind the decision (0..1)
        #[arg(long, default_value = "0")]
        confidence: f64,
    },

    /// Close a trade against a price
    Close {
        /// Trade id
        #[arg(short, long)]
        trade: i64,

        /// Current market price
        #[arg(short, long)]
        price: f64,

        /// Force a manual close at the given price, ignoring TP/SL
        #[arg(long)]
        manual: bool,
    },

    /// List a user's trades
    Trades {
        #[arg(short, long)]
        user: i64,

        /// Filter by account
        #[arg(short, long)]
        account: Option<i64>,
    },

    /// List a user's recorded signals
    Signals {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Run the signal agent loop for a symbol
    Run {
        #[arg(short, long)]
        user: i64,

        /// Account id (defaults to the user's default account)
        #[arg(short, long)]
        account: Option<i64>,

        /// Pair symbol, e.g. EURUSD
        #[arg(short, long)]
        symbol: String,

        /// Prediction timeframe
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// Seconds between cycles
        #[arg(short, long, default_value = "3600")]
        interval: u64,

        /// Directory holding <SYMBOL>_<tf>.csv candle files
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum AccountCmd {
    /// Create an account for a user
    Create {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "0")]
        balance: f64,

        /// Fraction of balance risked per trade
        #[arg(short, long, default_value = "0.01")]
        risk: f64,

        /// Informational leverage
        #[arg(short, long, default_value = "100")]
        leverage: i64,
    },

    /// List a user's accounts
    List {
        #[arg(short, long)]
        user: i64,
    },

    /// Make an account the user's default
    SetDefault {
        #[arg(short, long)]
        user: i64,

        #[arg(short, long)]
        account: i64,
    },

    /// Set an account's balance directly
    SetBalance {
        #[arg(short, long)]
        account: i64,

        #[arg(short, long)]
        balance: f64,
    },

    /// Delete an account and its trades
    Delete {
        #[arg(short, long)]
        account: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db = Database::new(&cli.database).await?;

    match cli.command {
        Commands::Register { username, chat_id } => {
            let user = db.create_user(&username, chat_id.as_deref()).await?;
            println!("Registered user {} (id {})", user.username, user.id);
        }

        Commands::Account { action } => handle_account(&db, action).await?,

        Commands::Open {
            user,
            account,
            symbol,
            side,
            entry,
            stop,
            take_profit,
            lot,
            confidence,
        } => {
            let side = TradeSide::parse(&side)
                .with_context(|| format!("invalid side {side:?}, expected BUY or SELL"))?;
            let account = resolve_account(&db, user, account).await?;

            let lot_size = match lot {
                Some(lot) => lot,
                None => {
                    // Derive the stop distance from the price levels and
                    // size off the account's own risk settings.
                    let stop_pips = (entry - stop).abs() / pip_size(&symbol);
                    size_position(
                        account.balance,
                        account.base_risk_pct,
                        stop_pips,
                        &symbol,
                        entry,
                        &RiskConfig::default().lot_constraints(),
                    )
                }
            };

            let ledger = TradeLedger::new(&db);
            let trade = ledger
                .open_trade(OpenTrade {
                    user_id: user,
                    account_id: account.id,
                    symbol,
                    side,
                    entry_price: entry,
                    stop_loss: stop,
                    take_profit,
                    lot_size,
                    confidence,
                    signal_id: None,
                })
                .await?;

            println!(
                "Opened trade {}: {} {} {} lots @ {} (SL {} / TP {:?})",
                trade.id,
                trade.side,
                trade.symbol,
                trade.lot_size,
                trade.entry_price,
                trade.stop_loss,
                trade.take_profit,
            );
        }

        Commands::Close {
            trade,
            price,
            manual,
        } => {
            let ledger = TradeLedger::new(&db);
            match ledger.close_trade(trade, price, manual).await {
                Ok(settled) => {
                    println!(
                        "Closed trade {}: PnL {:.4} (outcome {:+})",
                        settled.id,
                        settled.pnl.unwrap_or(0.0),
                        settled.outcome_score.unwrap_or(0),
                    );
                }
                Err(LedgerError::NotFound(id)) => println!("Trade {id} not found."),
                Err(LedgerError::NotOpen { id, status }) => {
                    println!("Trade {id} is not open (status {status}); nothing settled.")
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Trades { user, account } => {
            let trades = db.get_trades(user, account).await?;
            if trades.is_empty() {
                println!("No trades.");
                return Ok(());
            }

            println!(
                "\n{:<6} {:<8} {:<5} {:<8} {:>10} {:>8} {:>10} {:>6}",
                "ID", "SYMBOL", "SIDE", "STATUS", "ENTRY", "LOTS", "PNL", "SCORE"
            );
            println!("{}", "-".repeat(70));
            for t in trades {
                println!(
                    "{:<6} {:<8} {:<5} {:<8} {:>10.5} {:>8.2} {:>10} {:>6}",
                    t.id,
                    t.symbol,
                    t.side,
                    t.status,
                    t.entry_price,
                    t.lot_size,
                    t.pnl.map_or("-".to_string(), |p| format!("{p:.4}")),
                    t.outcome_score
                        .map_or("-".to_string(), |s| format!("{s:+}")),
                );
            }
        }

        Commands::Signals { user, limit } => {
            let signals = db.get_signals(user, limit).await?;
            if signals.is_empty() {
                println!("No signals recorded.");
                return Ok(());
            }

            println!(
                "\n{:<6} {:<8} {:<4} {:<12} {:>6} {:>10} {:<20}",
                "ID", "SYMBOL", "TF", "SIDE", "CONF", "ENTRY", "AT"
            );
            println!("{}", "-".repeat(72));
            for s in signals {
                println!(
                    "{:<6} {:<8} {:<4} {:<12} {:>5.0}% {:>10.5} {:<20}",
                    s.id,
                    s.symbol,
                    s.timeframe,
                    s.side,
                    s.confidence * 100.0,
                    s.entry_price,
                    s.created_at,
                );
            }
        }

        Commands::Run {
            user,
            account,
            symbol,
            timeframe,
            interval,
            data_dir,
            once,
        } => {
            let account = resolve_account(&db, user, account).await?;

            let config = AgentConfig {
                user_id: user,
                account_id: account.id,
                symbol: symbol.to_uppercase(),
                timeframe,
                interval_secs: interval,
                risk: RiskConfig::default(),
            };

            let source = CsvTrendSource::new(&data_dir);
            let notifier = Notifier::from_env();
            if !notifier.is_configured() {
                info!("Telegram notifications disabled (no TELEGRAM_BOT_TOKEN)");
            }

            let agent = Agent::new(config, db, source, notifier);

            if once {
                let outcome = agent.run_cycle().await?;
                println!(
                    "{}: {} (confidence {:.1}%), trade {} [{}]",
                    outcome.trade.symbol,
                    outcome.action.as_str(),
                    outcome.confidence * 100.0,
                    outcome.trade.id,
                    outcome.trade.status,
                );
            } else {
                println!("Running signal agent for {symbol} every {interval}s. Press Ctrl+C to stop.");
                agent.run().await?;
            }
        }
    }

    Ok(())
}

async fn handle_account(db: &Database, action: AccountCmd) -> Result<()> {
    match action {
        AccountCmd::Create {
            user,
            name,
            balance,
            risk,
            leverage,
        } => {
            let account = db.create_account(user, &name, balance, risk, leverage).await?;
            println!(
                "Created account {} (id {}), balance {:.2}, risk {:.1}%{}",
                account.name,
                account.id,
                account.balance,
                account.base_risk_pct * 100.0,
                if account.is_default { " [default]" } else { "" },
            );
        }

        AccountCmd::List { user } => {
            let accounts = db.get_accounts(user).await?;
            if accounts.is_empty() {
                println!("No accounts. Use 'fxagent account create' to add one.");
                return Ok(());
            }

            println!(
                "\n{:<6} {:<16} {:>12} {:>8} {:>6} {:<8}",
                "ID", "NAME", "BALANCE", "RISK%", "LEV", "DEFAULT"
            );
            println!("{}", "-".repeat(62));
            for a in accounts {
                println!(
                    "{:<6} {:<16} {:>12.2} {:>7.1}% {:>6} {:<8}",
                    a.id,
                    a.name,
                    a.balance,
                    a.base_risk_pct * 100.0,
                    a.leverage,
                    if a.is_default { "yes" } else { "" },
                );
            }
        }

        AccountCmd::SetDefault { user, account } => {
            match db.set_default_account(user, account).await? {
                Some(account) => println!("Default account is now {} (id {})", account.name, account.id),
                None => println!("Account {account} not found for user {user}."),
            }
        }

        AccountCmd::SetBalance { account, balance } => {
            match db.update_balance(account, balance).await? {
                Some(account) => println!("Balance of {} set to {:.2}", account.name, account.balance),
                None => println!("Account {account} not found."),
            }
        }

        AccountCmd::Delete { account } => {
            if db.delete_account(account).await? {
                println!("Deleted account {account} and its trades.");
            } else {
                println!("Account {account} not found.");
            }
        }
    }

    Ok(())
}

/// Pick the explicit account or fall back to the user's default.
async fn resolve_account(db: &Database, user_id: i64, account_id: Option<i64>) -> Result<Account> {
    match account_id {
        Some(id) => db
            .get_account(user_id, id)
            .await?
            .with_context(|| format!("account {id} not found for user {user_id}")),
        None => db
            .default_account(user_id)
            .await?
            .with_context(|| format!("user {user_id} has no default account")),
    }
}
