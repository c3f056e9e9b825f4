//! Account domain model

use std::sync::OnceLock;

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::transaction::{check_storable, MAX_SCALE};
use super::user::UserId;

/// A settlement account holding a monetary balance for one user
///
/// An account may be opened before an owner is known; `owner` is set once
/// and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// IBAN-style account number, uppercase without spaces
    pub iban: String,
    pub balance: Decimal,
    pub owner: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn iban_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z0-9]{11,30}$").expect("static regex"))
}

/// Current time at the microsecond precision the store keeps
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl Account {
    /// Open an unowned account
    pub fn new(iban: &str, balance: Decimal) -> Result<Self> {
        let iban = Self::normalize_iban(iban)?;
        if balance < Decimal::ZERO {
            return Err(Error::validation("opening balance cannot be negative"));
        }
        check_storable("opening balance", balance)?;
        let now = now();
        Ok(Self {
            iban,
            balance,
            owner: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Normalize an account number: strip spaces, uppercase, check shape
    pub fn normalize_iban(iban: &str) -> Result<String> {
        let normalized: String = iban
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        if !iban_pattern().is_match(&normalized) {
            return Err(Error::validation(format!("invalid account number '{}'", iban)));
        }
        Ok(normalized)
    }

    /// Assign the owner of a not-yet-owned account
    pub fn assign_owner(&mut self, owner: UserId) -> Result<()> {
        match self.owner {
            Some(existing) if existing == owner => Ok(()),
            Some(existing) => Err(Error::validation(format!(
                "account {} is already owned by user {}",
                self.iban, existing
            ))),
            None => {
                self.owner = Some(owner);
                self.updated_at = now();
                Ok(())
            }
        }
    }

    /// Apply a signed balance change, refusing to go below zero or past
    /// what the store can hold
    pub fn apply_delta(&mut self, delta: Decimal) -> Result<()> {
        let next = self
            .balance
            .checked_add(delta)
            .ok_or_else(|| Error::validation(format!("balance overflow on account {}", self.iban)))?;
        if next < Decimal::ZERO {
            return Err(Error::validation(format!(
                "insufficient funds on account {}",
                self.iban
            )));
        }
        check_storable("balance", next)?;
        self.balance = next;
        self.updated_at = now();
        Ok(())
    }

    /// Check that a deposit/withdrawal amount is usable
    pub fn validate_amount(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::validation("amount must be positive"));
        }
        if amount.normalize().scale() > MAX_SCALE {
            return Err(Error::validation(format!(
                "amount has more than {} decimal places",
                MAX_SCALE
            )));
        }
        check_storable("amount", amount)
    }
}
