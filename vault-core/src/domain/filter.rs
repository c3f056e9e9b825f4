//! Composable predicate over recorded trades

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::asset::AssetId;
use super::transaction::{earliest_storable, latest_storable, Transaction};
use super::user::UserId;

/// Which side of a trade a user must be on to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Buyer,
    Seller,
    /// Buyer or seller
    Either,
}

/// Filter for trade queries
///
/// All set criteria must hold. An unset criterion matches everything, so the
/// default filter selects every trade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub party: Option<(UserId, PartyRole)>,
    pub asset: Option<AssetId>,
    /// Inclusive `[start, end]` window on `occurred_at`
    pub between: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl TransactionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn involving(mut self, user: UserId) -> Self {
        self.party = Some((user, PartyRole::Either));
        self
    }

    pub fn bought_by(mut self, user: UserId) -> Self {
        self.party = Some((user, PartyRole::Buyer));
        self
    }

    pub fn sold_by(mut self, user: UserId) -> Self {
        self.party = Some((user, PartyRole::Seller));
        self
    }

    pub fn with_asset(mut self, asset: AssetId) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.between = Some((start, end));
        self
    }

    /// True when the time window can never match: `start > end`, or the
    /// window lies wholly outside the storable time range
    pub fn is_empty_window(&self) -> bool {
        matches!(self.between, Some((start, end))
            if start > end || end < earliest_storable() || start > latest_storable())
    }

    /// The time window narrowed to the storable range
    ///
    /// Every recorded trade lies inside that range, so the narrowed window
    /// selects exactly the same trades.
    pub fn storable_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.between
            .map(|(start, end)| (start.max(earliest_storable()), end.min(latest_storable())))
    }

    /// Evaluate the filter against a single trade
    pub fn matches(&self, tx: &Transaction) -> bool {
        let party_ok = match self.party {
            None => true,
            Some((user, PartyRole::Buyer)) => tx.buyer == user,
            Some((user, PartyRole::Seller)) => tx.seller == user,
            Some((user, PartyRole::Either)) => tx.involves(user),
        };
        let asset_ok = self.asset.map_or(true, |asset| tx.asset == asset);
        let time_ok = self
            .between
            .map_or(true, |(start, end)| start <= tx.occurred_at && tx.occurred_at <= end);

        party_ok && asset_ok && time_ok
    }
}
