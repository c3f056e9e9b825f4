//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, ToSql};
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, Asset, AssetId, PartyRole, Transaction, TransactionFilter, TransactionId, User,
    UserId, ValidatedTrade,
};
use crate::ports::{AccountStore, LedgerStore};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const TRANSACTION_COLUMNS: &str = "transaction_id, quantity::VARCHAR, occurred_at::VARCHAR, \
     buyer_user_id, asset_id, price::VARCHAR, seller_user_id";

const ACCOUNT_COLUMNS: &str =
    "iban, balance::VARCHAR, owner_user_id, created_at::VARCHAR, updated_at::VARCHAR";

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Store(err.to_string())
    }
}

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed ledger and account store
///
/// All access goes through one connection behind a mutex, which serializes
/// id assignment and keeps every operation atomic with respect to others on
/// the same repository.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff on file-locking errors, which occur
    /// when another process holds the file. Attempts are bounded so an
    /// unavailable store surfaces as an error instead of hanging.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::store(format!("failed to open database after {} attempts", MAX_RETRIES))
        }))
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off: everything needed is statically linked
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::store(format!("connection lock poisoned: {}", e)))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }
}

// === Trades and registries ===

impl LedgerStore for DuckDbRepository {
    fn insert_transaction(&self, trade: &ValidatedTrade) -> Result<TransactionId> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sys_transactions (quantity, occurred_at, buyer_user_id, asset_id, price, seller_user_id)
             VALUES (CAST(? AS DECIMAL(38, 18)), CAST(? AS TIMESTAMP_NS), ?, ?, CAST(? AS DECIMAL(38, 18)), ?)
             RETURNING transaction_id",
            params![
                trade.quantity.to_string(),
                format_timestamp_ns(&trade.occurred_at),
                trade.buyer.0,
                trade.asset.0,
                trade.price.to_string(),
                trade.seller.0,
            ],
            |row| row.get(0),
        )?;
        Ok(TransactionId(id))
    }

    fn query_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        if filter.is_empty_window() {
            return Ok(Vec::new());
        }

        let (where_clause, bound) = build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM sys_transactions{} ORDER BY transaction_id",
            TRANSACTION_COLUMNS, where_clause
        );
        let param_refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref()).collect();

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), TransactionRow::from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_transaction()?);
        }
        tracing::debug!(?filter, matched = result.len(), "queried transactions");
        Ok(result)
    }

    fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_transactions WHERE transaction_id = ?",
            TRANSACTION_COLUMNS
        );
        match conn.query_row(&sql, [id.0], TransactionRow::from_row) {
            Ok(row) => Ok(Some(row.into_transaction()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn count_transactions(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM sys_transactions", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn register_user(&self, display_name: Option<&str>) -> Result<User> {
        let display_name = User::normalize_display_name(display_name);
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sys_users (display_name) VALUES (?) RETURNING user_id",
            params![display_name],
            |row| row.get(0),
        )?;
        Ok(User::new(UserId(id), display_name))
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let conn = self.lock()?;
        match conn.query_row(
            "SELECT user_id, display_name FROM sys_users WHERE user_id = ?",
            [id.0],
            |row| Ok(User::new(UserId(row.get(0)?), row.get(1)?)),
        ) {
            Ok(user) => Ok(Some(user)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn register_asset(&self, symbol: &str, name: &str) -> Result<Asset> {
        let symbol = Asset::normalize_symbol(symbol)?;
        let name = Asset::validate_name(name)?;
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO sys_assets (symbol, name) VALUES (?, ?) RETURNING asset_id",
            params![symbol, name],
            |row| row.get(0),
        )?;
        Ok(Asset::new(AssetId(id), symbol, name))
    }

    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>> {
        let conn = self.lock()?;
        match conn.query_row(
            "SELECT asset_id, symbol, name FROM sys_assets WHERE asset_id = ?",
            [id.0],
            row_to_asset,
        ) {
            Ok(asset) => Ok(Some(asset)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>> {
        // A malformed symbol can never have been registered
        let Ok(symbol) = Asset::normalize_symbol(symbol) else {
            return Ok(None);
        };
        let conn = self.lock()?;
        match conn.query_row(
            "SELECT asset_id, symbol, name FROM sys_assets WHERE symbol = ?",
            [symbol],
            row_to_asset,
        ) {
            Ok(asset) => Ok(Some(asset)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_assets(&self) -> Result<Vec<Asset>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT asset_id, symbol, name FROM sys_assets ORDER BY asset_id")?;
        let rows = stmt.query_map([], row_to_asset)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

// === Settlement accounts ===

impl AccountStore for DuckDbRepository {
    fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_accounts (iban, balance, owner_user_id, created_at, updated_at)
             VALUES (?, CAST(? AS DECIMAL(38, 18)), ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
            params![
                account.iban,
                account.balance.to_string(),
                account.owner.map(|o| o.0),
                format_timestamp(&account.created_at),
                format_timestamp(&account.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, iban: &str) -> Result<Option<Account>> {
        let Ok(iban) = Account::normalize_iban(iban) else {
            return Ok(None);
        };
        let conn = self.lock()?;
        load_account(&conn, &iban)
    }

    fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sys_accounts WHERE owner_user_id = ? ORDER BY iban",
            ACCOUNT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([owner.0], AccountRow::from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_account()?);
        }
        Ok(result)
    }

    fn set_owner(&self, iban: &str, owner: UserId) -> Result<Account> {
        let iban = Account::normalize_iban(iban)?;
        let conn = self.lock()?;

        let mut account = load_account(&conn, &iban)?
            .ok_or_else(|| Error::not_found(format!("account {}", iban)))?;
        let user_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_users WHERE user_id = ?",
            [owner.0],
            |row| row.get(0),
        )?;
        if user_count == 0 {
            return Err(Error::not_found(format!("user {}", owner)));
        }

        account.assign_owner(owner)?;
        conn.execute(
            "UPDATE sys_accounts SET owner_user_id = ?, updated_at = CAST(? AS TIMESTAMP) WHERE iban = ?",
            params![owner.0, format_timestamp(&account.updated_at), account.iban],
        )?;
        Ok(account)
    }

    fn adjust_balance(&self, iban: &str, delta: Decimal) -> Result<Account> {
        let iban = Account::normalize_iban(iban)?;
        let conn = self.lock()?;

        let mut account = load_account(&conn, &iban)?
            .ok_or_else(|| Error::not_found(format!("account {}", iban)))?;
        account.apply_delta(delta)?;
        store_balance(&conn, &account)?;
        Ok(account)
    }

    fn transfer(&self, from_iban: &str, to_iban: &str, amount: Decimal) -> Result<()> {
        let from_iban = Account::normalize_iban(from_iban)?;
        let to_iban = Account::normalize_iban(to_iban)?;
        if from_iban == to_iban {
            return Err(Error::validation("cannot transfer to the same account"));
        }
        Account::validate_amount(amount)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut from = load_account(&tx, &from_iban)?
            .ok_or_else(|| Error::not_found(format!("account {}", from_iban)))?;
        let mut to = load_account(&tx, &to_iban)?
            .ok_or_else(|| Error::not_found(format!("account {}", to_iban)))?;

        from.apply_delta(-amount)?;
        to.apply_delta(amount)?;
        store_balance(&tx, &from)?;
        store_balance(&tx, &to)?;

        // Dropping `tx` on any early return above rolls back both updates
        tx.commit()?;
        Ok(())
    }
}

/// Raw trade columns as read from DuckDB, before parsing
struct TransactionRow {
    id: i64,
    quantity: String,
    occurred_at: String,
    buyer: i64,
    asset: i64,
    price: String,
    seller: i64,
}

impl TransactionRow {
    // Column order follows TRANSACTION_COLUMNS
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            quantity: row.get(1)?,
            occurred_at: row.get(2)?,
            buyer: row.get(3)?,
            asset: row.get(4)?,
            price: row.get(5)?,
            seller: row.get(6)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            id: TransactionId(self.id),
            occurred_at: parse_timestamp(&self.occurred_at)?,
            buyer: UserId(self.buyer),
            seller: UserId(self.seller),
            asset: AssetId(self.asset),
            quantity: parse_decimal(&self.quantity)?,
            price: parse_decimal(&self.price)?,
        })
    }
}

struct AccountRow {
    iban: String,
    balance: String,
    owner: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    // Column order follows ACCOUNT_COLUMNS
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            iban: row.get(0)?,
            balance: row.get(1)?,
            owner: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_account(self) -> Result<Account> {
        Ok(Account {
            iban: self.iban,
            balance: parse_decimal(&self.balance)?,
            owner: self.owner.map(UserId),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn row_to_asset(row: &duckdb::Row) -> duckdb::Result<Asset> {
    Ok(Asset::new(AssetId(row.get(0)?), row.get::<_, String>(1)?, row.get::<_, String>(2)?))
}

fn load_account(conn: &Connection, iban: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM sys_accounts WHERE iban = ?", ACCOUNT_COLUMNS);
    match conn.query_row(&sql, [iban], AccountRow::from_row) {
        Ok(row) => Ok(Some(row.into_account()?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn store_balance(conn: &Connection, account: &Account) -> Result<()> {
    conn.execute(
        "UPDATE sys_accounts SET balance = CAST(? AS DECIMAL(38, 18)), updated_at = CAST(? AS TIMESTAMP)
         WHERE iban = ?",
        params![
            account.balance.to_string(),
            format_timestamp(&account.updated_at),
            account.iban,
        ],
    )?;
    Ok(())
}

/// Compile a filter into a `WHERE` clause and its bound parameters
fn build_where_clause(filter: &TransactionFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut bound: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some((user, role)) = filter.party {
        match role {
            PartyRole::Buyer => {
                conditions.push("buyer_user_id = ?");
                bound.push(Box::new(user.0));
            }
            PartyRole::Seller => {
                conditions.push("seller_user_id = ?");
                bound.push(Box::new(user.0));
            }
            PartyRole::Either => {
                conditions.push("(buyer_user_id = ? OR seller_user_id = ?)");
                bound.push(Box::new(user.0));
                bound.push(Box::new(user.0));
            }
        }
    }

    if let Some(asset) = filter.asset {
        conditions.push("asset_id = ?");
        bound.push(Box::new(asset.0));
    }

    if let Some((start, end)) = filter.storable_window() {
        conditions.push("occurred_at BETWEEN CAST(? AS TIMESTAMP_NS) AND CAST(? AS TIMESTAMP_NS)");
        bound.push(Box::new(format_timestamp_ns(&start)));
        bound.push(Box::new(format_timestamp_ns(&end)));
    }

    if conditions.is_empty() {
        (String::new(), bound)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), bound)
    }
}

// Helper functions

/// Format a UTC timestamp for a TIMESTAMP_NS column
fn format_timestamp_ns(dt: &DateTime<Utc>) -> String {
    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Format a UTC timestamp for a (microsecond) TIMESTAMP column
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse a timestamp rendered by DuckDB's `::VARCHAR` cast
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::store(format!("unreadable timestamp '{}': {}", s, e)))
}

/// Parse a DECIMAL rendered as text, dropping the column's trailing zeros
fn parse_decimal(s: &str) -> Result<Decimal> {
    let s = s.trim();
    // Wide DECIMAL text can exceed Decimal's 28 digits until the padding goes
    let digits = if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    };
    Decimal::from_str(digits)
        .map(|d| d.normalize())
        .map_err(|e| Error::store(format!("unreadable decimal '{}': {}", s, e)))
}
