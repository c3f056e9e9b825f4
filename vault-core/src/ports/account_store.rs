//! Account store port - settlement account balances

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{Account, UserId};

/// Storage for settlement accounts, keyed by account number
pub trait AccountStore: Send + Sync {
    /// Insert a new account; a duplicate account number is a store error
    fn insert_account(&self, account: &Account) -> Result<()>;

    fn get_account(&self, iban: &str) -> Result<Option<Account>>;

    /// Accounts owned by a user, ordered by account number
    fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>>;

    /// Set the owner of an account that has none yet
    fn set_owner(&self, iban: &str, owner: UserId) -> Result<Account>;

    /// Add a signed amount to the balance; a negative result is rejected
    fn adjust_balance(&self, iban: &str, delta: Decimal) -> Result<Account>;

    /// Move `amount` between two accounts atomically
    fn transfer(&self, from_iban: &str, to_iban: &str, amount: Decimal) -> Result<()>;
}
