//! Transaction domain model
//!
//! A trade goes through three shapes:
//!
//! - [`NewTransaction`]: what the caller hands in. References are optional so
//!   that an incomplete trade is representable and can be rejected.
//! - [`ValidatedTrade`]: a trade that passed validation. Only
//!   [`NewTransaction::validate`] can produce one, so stores never see
//!   malformed input.
//! - [`Transaction`]: a recorded trade carrying its store-assigned id.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::asset::AssetId;
use super::result::{Error, Result};
use super::user::UserId;

/// Maximum number of fractional digits kept for quantities and prices
pub const MAX_SCALE: u32 = 18;

/// Exclusive upper bound on the integer part of quantities and prices
const MAX_MAGNITUDE: i128 = 100_000_000_000_000_000_000;

/// Earliest trade time the store can hold, in nanoseconds since the epoch.
/// One second inside the `i64` range so DuckDB's `TIMESTAMP_NS` casts never
/// overflow.
pub const MIN_TIMESTAMP_NANOS: i64 = i64::MIN + 1_000_000_000;

/// Latest trade time the store can hold, in nanoseconds since the epoch
pub const MAX_TIMESTAMP_NANOS: i64 = i64::MAX - 1_000_000_000;

/// Earliest storable trade time
pub fn earliest_storable() -> DateTime<Utc> {
    Utc.timestamp_nanos(MIN_TIMESTAMP_NANOS)
}

/// Latest storable trade time
pub fn latest_storable() -> DateTime<Utc> {
    Utc.timestamp_nanos(MAX_TIMESTAMP_NANOS)
}

/// Store-assigned identifier of a recorded trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A trade submitted for recording
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTransaction {
    pub occurred_at: Option<DateTime<Utc>>,
    pub buyer: Option<UserId>,
    pub seller: Option<UserId>,
    pub asset: Option<AssetId>,
    /// Amount of the asset exchanged
    pub quantity: Decimal,
    /// Total monetary value of the trade
    pub price: Decimal,
}

impl NewTransaction {
    /// Create a fully populated trade
    pub fn new(
        buyer: UserId,
        seller: UserId,
        asset: AssetId,
        quantity: Decimal,
        price: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            occurred_at: Some(occurred_at),
            buyer: Some(buyer),
            seller: Some(seller),
            asset: Some(asset),
            quantity,
            price,
        }
    }

    pub fn with_buyer(mut self, buyer: UserId) -> Self {
        self.buyer = Some(buyer);
        self
    }

    pub fn with_seller(mut self, seller: UserId) -> Self {
        self.seller = Some(seller);
        self
    }

    pub fn with_asset(mut self, asset: AssetId) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }

    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Check every invariant a recorded trade must satisfy
    pub fn validate(&self) -> Result<ValidatedTrade> {
        let buyer = self.buyer.ok_or_else(|| Error::validation("buyer is required"))?;
        let seller = self
            .seller
            .ok_or_else(|| Error::validation("seller is required"))?;
        let asset = self.asset.ok_or_else(|| Error::validation("asset is required"))?;
        let occurred_at = self
            .occurred_at
            .ok_or_else(|| Error::validation("trade timestamp is required"))?;

        if buyer == seller {
            return Err(Error::validation(format!(
                "buyer and seller must differ (user {})",
                buyer
            )));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(Error::validation("quantity must be positive"));
        }
        if self.price < Decimal::ZERO {
            return Err(Error::validation("price cannot be negative"));
        }
        check_storable("quantity", self.quantity)?;
        check_storable("price", self.price)?;
        if occurred_at < earliest_storable() || occurred_at > latest_storable() {
            return Err(Error::validation(format!(
                "trade timestamp {} is out of range",
                occurred_at
            )));
        }

        Ok(ValidatedTrade {
            occurred_at,
            buyer,
            seller,
            asset,
            quantity: self.quantity,
            price: self.price,
            _sealed: (),
        })
    }
}

/// Reject values a `DECIMAL(38, 18)` column cannot hold
pub(crate) fn check_storable(field: &str, value: Decimal) -> Result<()> {
    if value.normalize().scale() > MAX_SCALE {
        return Err(Error::validation(format!(
            "{} has more than {} fractional digits",
            field, MAX_SCALE
        )));
    }
    if value.abs() >= Decimal::from_i128_with_scale(MAX_MAGNITUDE, 0) {
        return Err(Error::validation(format!("{} is too large", field)));
    }
    Ok(())
}

/// A trade that passed [`NewTransaction::validate`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTrade {
    pub occurred_at: DateTime<Utc>,
    pub buyer: UserId,
    pub seller: UserId,
    pub asset: AssetId,
    pub quantity: Decimal,
    pub price: Decimal,
    _sealed: (),
}

impl ValidatedTrade {
    /// Attach the id the store assigned on insert
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            occurred_at: self.occurred_at,
            buyer: self.buyer,
            seller: self.seller,
            asset: self.asset,
            quantity: self.quantity,
            price: self.price,
        }
    }
}

/// A recorded trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub occurred_at: DateTime<Utc>,
    pub buyer: UserId,
    pub seller: UserId,
    pub asset: AssetId,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl Transaction {
    /// True if the user is the buyer or the seller
    pub fn involves(&self, user: UserId) -> bool {
        self.buyer == user || self.seller == user
    }

    /// Counterparty of `user` in this trade, if `user` took part
    pub fn counterparty_of(&self, user: UserId) -> Option<UserId> {
        if self.buyer == user {
            Some(self.seller)
        } else if self.seller == user {
            Some(self.buyer)
        } else {
            None
        }
    }

    /// Price per unit of asset, `None` when the quotient does not fit
    pub fn unit_price(&self) -> Option<Decimal> {
        self.price.checked_div(self.quantity)
    }
}
