//! In-memory store
//!
//! Implements both ports with the same semantics as the DuckDB repository,
//! including reference checks and sequential ids. Nothing survives the
//! process.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, Asset, AssetId, Transaction, TransactionFilter, TransactionId, User, UserId,
    ValidatedTrade,
};
use crate::ports::{AccountStore, LedgerStore};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    assets: BTreeMap<AssetId, Asset>,
    /// Kept in insertion order, which is also id order
    transactions: Vec<Transaction>,
    accounts: BTreeMap<String, Account>,
    next_user_id: i64,
    next_asset_id: i64,
    next_transaction_id: i64,
}

impl MemoryState {
    fn account_mut(&mut self, iban: &str) -> Result<&mut Account> {
        self.accounts
            .get_mut(iban)
            .ok_or_else(|| Error::not_found(format!("account {}", iban)))
    }
}

/// Process-local ledger and account store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| Error::store(format!("memory store lock poisoned: {}", e)))
    }
}

impl LedgerStore for MemoryStore {
    fn insert_transaction(&self, trade: &ValidatedTrade) -> Result<TransactionId> {
        let mut state = self.lock()?;

        for user in [trade.buyer, trade.seller] {
            if !state.users.contains_key(&user) {
                return Err(Error::store(format!(
                    "constraint violation: unknown user {}",
                    user
                )));
            }
        }
        if !state.assets.contains_key(&trade.asset) {
            return Err(Error::store(format!(
                "constraint violation: unknown asset {}",
                trade.asset
            )));
        }

        state.next_transaction_id += 1;
        let id = TransactionId(state.next_transaction_id);
        state.transactions.push(trade.clone().into_transaction(id));
        Ok(id)
    }

    fn query_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let state = self.lock()?;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect())
    }

    fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let state = self.lock()?;
        Ok(state.transactions.iter().find(|tx| tx.id == id).cloned())
    }

    fn count_transactions(&self) -> Result<u64> {
        Ok(self.lock()?.transactions.len() as u64)
    }

    fn register_user(&self, display_name: Option<&str>) -> Result<User> {
        let mut state = self.lock()?;
        state.next_user_id += 1;
        let user = User::new(
            UserId(state.next_user_id),
            User::normalize_display_name(display_name),
        );
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn register_asset(&self, symbol: &str, name: &str) -> Result<Asset> {
        let symbol = Asset::normalize_symbol(symbol)?;
        let name = Asset::validate_name(name)?;
        let mut state = self.lock()?;

        if state.assets.values().any(|a| a.symbol == symbol) {
            return Err(Error::store(format!(
                "constraint violation: duplicate asset symbol {}",
                symbol
            )));
        }
        state.next_asset_id += 1;
        let asset = Asset::new(AssetId(state.next_asset_id), symbol, name);
        state.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>> {
        Ok(self.lock()?.assets.get(&id).cloned())
    }

    fn get_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>> {
        let Ok(symbol) = Asset::normalize_symbol(symbol) else {
            return Ok(None);
        };
        Ok(self
            .lock()?
            .assets
            .values()
            .find(|a| a.symbol == symbol)
            .cloned())
    }

    fn list_assets(&self) -> Result<Vec<Asset>> {
        Ok(self.lock()?.assets.values().cloned().collect())
    }
}

impl AccountStore for MemoryStore {
    fn insert_account(&self, account: &Account) -> Result<()> {
        let mut state = self.lock()?;
        if state.accounts.contains_key(&account.iban) {
            return Err(Error::store(format!(
                "constraint violation: duplicate account {}",
                account.iban
            )));
        }
        state.accounts.insert(account.iban.clone(), account.clone());
        Ok(())
    }

    fn get_account(&self, iban: &str) -> Result<Option<Account>> {
        let Ok(iban) = Account::normalize_iban(iban) else {
            return Ok(None);
        };
        Ok(self.lock()?.accounts.get(&iban).cloned())
    }

    fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .filter(|a| a.owner == Some(owner))
            .cloned()
            .collect())
    }

    fn set_owner(&self, iban: &str, owner: UserId) -> Result<Account> {
        let iban = Account::normalize_iban(iban)?;
        let mut state = self.lock()?;
        if !state.users.contains_key(&owner) {
            return Err(Error::not_found(format!("user {}", owner)));
        }
        let account = state.account_mut(&iban)?;
        account.assign_owner(owner)?;
        Ok(account.clone())
    }

    fn adjust_balance(&self, iban: &str, delta: Decimal) -> Result<Account> {
        let iban = Account::normalize_iban(iban)?;
        let mut state = self.lock()?;
        let account = state.account_mut(&iban)?;
        account.apply_delta(delta)?;
        Ok(account.clone())
    }

    fn transfer(&self, from_iban: &str, to_iban: &str, amount: Decimal) -> Result<()> {
        let from_iban = Account::normalize_iban(from_iban)?;
        let to_iban = Account::normalize_iban(to_iban)?;
        if from_iban == to_iban {
            return Err(Error::validation("cannot transfer to the same account"));
        }
        Account::validate_amount(amount)?;

        let mut state = self.lock()?;
        // Work on copies so a failure leaves both accounts untouched
        let mut from = state.account_mut(&from_iban)?.clone();
        let mut to = state.account_mut(&to_iban)?.clone();
        from.apply_delta(-amount)?;
        to.apply_delta(amount)?;

        state.accounts.insert(from_iban, from);
        state.accounts.insert(to_iban, to);
        Ok(())
    }
}
