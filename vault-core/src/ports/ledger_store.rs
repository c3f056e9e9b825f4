//! Ledger store port - persistence boundary for trades and the registries
//! they reference

use crate::domain::result::Result;
use crate::domain::{
    Asset, AssetId, Transaction, TransactionFilter, TransactionId, User, UserId, ValidatedTrade,
};

/// Durable, append-only storage for trades
///
/// Implementations must make `insert_transaction` atomic and must serialize
/// id assignment: two concurrent inserts never receive the same id, and ids
/// increase in insertion order within one store instance.
///
/// Query methods return an empty vector when nothing matches. Errors are
/// reserved for storage failures.
pub trait LedgerStore: Send + Sync {
    // === Trades ===

    /// Append a trade and return the id assigned to it
    ///
    /// References that do not resolve to a registered user or asset are
    /// rejected as a store (constraint) error.
    fn insert_transaction(&self, trade: &ValidatedTrade) -> Result<TransactionId>;

    /// Trades matching the filter, ordered by id
    fn query_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    /// Get a trade by id
    fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Number of recorded trades
    fn count_transactions(&self) -> Result<u64>;

    // === Users ===

    /// Register a user; the store assigns the id
    fn register_user(&self, display_name: Option<&str>) -> Result<User>;

    fn get_user(&self, id: UserId) -> Result<Option<User>>;

    // === Asset registry ===

    /// Register a tradable asset; symbols are unique
    fn register_asset(&self, symbol: &str, name: &str) -> Result<Asset>;

    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>>;

    fn get_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>>;

    /// All registered assets, ordered by id
    fn list_assets(&self) -> Result<Vec<Asset>>;
}
