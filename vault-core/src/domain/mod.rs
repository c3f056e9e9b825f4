//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod asset;
mod filter;
mod transaction;
mod user;
pub mod result;

pub use account::Account;
pub use asset::{Asset, AssetId};
pub use filter::{PartyRole, TransactionFilter};
pub use transaction::{
    earliest_storable, latest_storable, NewTransaction, Transaction, TransactionId,
    ValidatedTrade, MAX_SCALE,
};
pub use user::{User, UserId};
