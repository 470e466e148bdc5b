//! Database persistence for users, accounts, trades, and signals.
//!
//! A single `Database` owns the SQLite pool and runs migrations at
//! startup. Multi-step mutations (default-account flips, cascading
//! deletes) run inside one transaction so no partial state is ever
//! observable. Trade settlement lives in `trading::ledger`, which shares
//! this pool.

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::{Account, Signal, Trade, User};

/// Database connection pool and typed operations.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        // An in-memory SQLite database exists per connection; a pool of
        // them would be several disjoint stores. Clamp to one connection
        // so `sqlite::memory:` behaves like a single database.
        let max_connections = if database_url.contains(":memory:") || database_url.contains("mode=memory") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                telegram_chat_id TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                balance REAL NOT NULL DEFAULT 0,
                base_risk_pct REAL NOT NULL DEFAULT 0.01,
                leverage INTEGER NOT NULL DEFAULT 100,
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                side TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0,
                entry_price REAL NOT NULL DEFAULT 0,
                stop_pips REAL NOT NULL DEFAULT 10,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                entry_price REAL NOT NULL,
                stop_loss REAL NOT NULL DEFAULT 0,
                take_profit REAL,
                lot_size REAL NOT NULL,
                confidence REAL NOT NULL DEFAULT 0,
                pnl REAL,
                outcome_score INTEGER,
                signal_id INTEGER REFERENCES signals(id),
                opened_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                closed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_account ON trades(account_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_user_status ON trades(user_id, status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_signals_user ON signals(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Users ====================

    /// Register a user, optionally linked to a Telegram chat.
    pub async fn create_user(&self, username: &str, telegram_chat_id: Option<&str>) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, telegram_chat_id, created_at)
            VALUES (?, ?, datetime('now'))
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(telegram_chat_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create user")
    }

    /// Get a user by id.
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")
    }

    // ==================== Accounts ====================

    /// Create an account for a user.
    ///
    /// Account names are unique per user; a taken name gets a numeric
    /// suffix ("Main", "Main 2", ...). A user's first account becomes
    /// the default automatically.
    pub async fn create_account(
        &self,
        user_id: i64,
        name: &str,
        balance: f64,
        base_risk_pct: f64,
        leverage: i64,
    ) -> Result<Account> {
        let mut candidate = name.to_string();
        let mut suffix = 1;
        loop {
            let taken: Option<(i64,)> =
                sqlx::query_as("SELECT 1 FROM accounts WHERE user_id = ? AND name = ?")
                    .bind(user_id)
                    .bind(&candidate)
                    .fetch_optional(&self.pool)
                    .await?;
            if taken.is_none() {
                break;
            }
            suffix += 1;
            candidate = format!("{name} {suffix}");
        }

        let is_first: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM accounts WHERE user_id = ? LIMIT 1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (user_id, name, balance, base_risk_pct, leverage, is_default, created_at)
            VALUES (?, ?, ?, ?, ?, ?, datetime('now'))
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&candidate)
        .bind(balance)
        .bind(base_risk_pct)
        .bind(leverage)
        .bind(is_first.is_none())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create account")
    }

    /// Get one of a user's accounts by id. Ownership is part of the
    /// lookup: another user's account id yields None.
    pub async fn get_account(&self, user_id: i64, account_id: i64) -> Result<Option<Account>> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ? AND user_id = ?")
            .bind(account_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")
    }

    /// Get all accounts for a user.
    pub async fn get_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch accounts")
    }

    /// Get the user's default account, if any.
    pub async fn default_account(&self, user_id: i64) -> Result<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE user_id = ? AND is_default = 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch default account")
    }

    /// Make one account the user's default.
    ///
    /// Every sibling is unset and the target set inside one transaction,
    /// so a concurrent reader never sees zero or two defaults. Returns
    /// None when the account does not exist or belongs to someone else.
    pub async fn set_default_account(
        &self,
        user_id: i64,
        account_id: i64,
    ) -> Result<Option<Account>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE accounts SET is_default = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let updated =
            sqlx::query("UPDATE accounts SET is_default = 1 WHERE id = ? AND user_id = ?")
                .bind(account_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

        if updated.rows_affected() != 1 {
            // Unknown account: drop the transaction, leaving defaults as
            // they were.
            return Ok(None);
        }

        let account: Account = sqlx::query_as("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(account))
    }

    /// Set an account's balance directly (admin/manual path). Trade
    /// settlement adjusts balances through the ledger instead.
    pub async fn update_balance(&self, account_id: i64, new_balance: f64) -> Result<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts SET balance = ? WHERE id = ? RETURNING *",
        )
        .bind(new_balance)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to update balance")
    }

    /// Delete an account and all of its trades. Returns false when the
    /// account does not exist.
    pub async fn delete_account(&self, account_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM trades WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected() == 1)
    }

    // ==================== Signals ====================

    /// Record one prediction-to-action decision.
    ///
    /// Symbol and side are normalized to uppercase and the row is
    /// timestamped at insertion. There is no uniqueness constraint;
    /// repeated signals per symbol are expected, one per prediction run.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_signal(
        &self,
        user_id: i64,
        symbol: &str,
        timeframe: &str,
        side: &str,
        confidence: f64,
        entry_price: f64,
        stop_pips: f64,
    ) -> Result<Signal> {
        sqlx::query_as::<_, Signal>(
            r#"
            INSERT INTO signals (user_id, symbol, timeframe, side, confidence, entry_price, stop_pips, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(symbol.to_uppercase())
        .bind(timeframe)
        .bind(side.to_uppercase())
        .bind(confidence)
        .bind(entry_price)
        .bind(stop_pips)
        .fetch_one(&self.pool)
        .await
        .context("Failed to record signal")
    }

    /// Get recent signals for a user, newest first.
    pub async fn get_signals(&self, user_id: i64, limit: i64) -> Result<Vec<Signal>> {
        sqlx::query_as::<_, Signal>(
            "SELECT * FROM signals WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch signals")
    }

    // ==================== Trades ====================

    /// Get a user's trades, optionally filtered by account, newest first.
    pub async fn get_trades(&self, user_id: i64, account_id: Option<i64>) -> Result<Vec<Trade>> {
        let trades = match account_id {
            Some(account_id) => {
                sqlx::query_as::<_, Trade>(
                    "SELECT * FROM trades WHERE user_id = ? AND account_id = ? ORDER BY id DESC",
                )
                .bind(user_id)
                .bind(account_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Trade>(
                    "SELECT * FROM trades WHERE user_id = ? ORDER BY id DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
            }
        };

        trades.context("Failed to fetch trades")
    }

    /// Get all open trades for an account.
    pub async fn get_open_trades(&self, account_id: i64) -> Result<Vec<Trade>> {
        sqlx::query_as::<_, Trade>(
            "SELECT * FROM trades WHERE account_id = ? AND status = 'OPEN' ORDER BY id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch open trades")
    }

    /// Record a decision that never became a position. SKIPPED is
    /// terminal; the ledger refuses to settle these rows. Written here,
    /// outside the ledger, on a Don't Enter decision.
    pub async fn record_skipped_trade(
        &self,
        user_id: i64,
        account_id: i64,
        symbol: &str,
        confidence: f64,
        entry_price: f64,
        signal_id: Option<i64>,
    ) -> Result<Trade> {
        sqlx::query_as::<_, Trade>(
            r#"
            INSERT INTO trades (
                user_id, account_id, symbol, side, status, entry_price,
                stop_loss, take_profit, lot_size, confidence, signal_id, opened_at
            ) VALUES (?, ?, ?, 'NONE', 'SKIPPED', ?, 0, NULL, 0, ?, ?, datetime('now'))
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(symbol.to_uppercase())
        .bind(entry_price)
        .bind(confidence)
        .bind(signal_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to record skipped trade")
    }

    /// Get the connection pool (shared with the trade ledger).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
