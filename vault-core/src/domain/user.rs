//! User domain model

use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A party to trades
///
/// The same type plays both the buyer and the seller role; a trade holds two
/// independent references to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: UserId, display_name: Option<String>) -> Self {
        Self { id, display_name }
    }

    /// Trim the display name, treating blank names as absent
    pub fn normalize_display_name(name: Option<&str>) -> Option<String> {
        name.map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}
