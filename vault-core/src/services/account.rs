//! Account service - settlement account balances

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, Transaction, UserId};
use crate::ports::AccountStore;

/// Service for opening accounts and moving money between them
pub struct AccountService {
    store: Arc<dyn AccountStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Open an unowned account with a non-negative opening balance
    pub fn open_account(&self, iban: &str, opening_balance: Decimal) -> Result<Account> {
        let account = Account::new(iban, opening_balance)?;
        self.store.insert_account(&account)?;
        tracing::info!(
            country = account.iban.get(..2).unwrap_or_default(),
            "opened account"
        );
        Ok(account)
    }

    /// Set the owner of an account; an account changes hands at most once
    pub fn assign_owner(&self, iban: &str, owner: UserId) -> Result<Account> {
        self.store.set_owner(iban, owner)
    }

    pub fn get_account(&self, iban: &str) -> Result<Option<Account>> {
        self.store.get_account(iban)
    }

    pub fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>> {
        self.store.accounts_for_owner(owner)
    }

    pub fn deposit(&self, iban: &str, amount: Decimal) -> Result<Account> {
        Account::validate_amount(amount)?;
        self.store.adjust_balance(iban, amount)
    }

    /// Withdraw funds; overdrawing is rejected
    pub fn withdraw(&self, iban: &str, amount: Decimal) -> Result<Account> {
        Account::validate_amount(amount)?;
        self.store.adjust_balance(iban, -amount)
    }

    /// Pay for a recorded trade: the price moves from the buyer's account to
    /// the seller's account, or nothing moves at all
    pub fn settle(&self, trade: &Transaction, buyer_iban: &str, seller_iban: &str) -> Result<()> {
        let buyer_account = self.require(buyer_iban)?;
        let seller_account = self.require(seller_iban)?;

        if buyer_account.owner != Some(trade.buyer) {
            return Err(Error::validation(format!(
                "account {} is not owned by buyer {}",
                buyer_account.iban, trade.buyer
            )));
        }
        if seller_account.owner != Some(trade.seller) {
            return Err(Error::validation(format!(
                "account {} is not owned by seller {}",
                seller_account.iban, trade.seller
            )));
        }

        if trade.price.is_zero() {
            return Ok(());
        }
        self.store
            .transfer(&buyer_account.iban, &seller_account.iban, trade.price)?;
        tracing::info!(transaction = %trade.id, "settled trade");
        Ok(())
    }

    fn require(&self, iban: &str) -> Result<Account> {
        self.store
            .get_account(iban)?
            .ok_or_else(|| Error::not_found(format!("account {}", iban)))
    }
}
