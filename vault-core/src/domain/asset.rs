//! Asset registry domain model

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Store-assigned identifier of a tradable asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub i64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tradable cryptocurrency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// Ticker symbol, uppercase (e.g. "BTC")
    pub symbol: String,
    pub name: String,
}

fn symbol_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{1,10}$").expect("static regex"))
}

impl Asset {
    pub fn new(id: AssetId, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            name: name.into(),
        }
    }

    /// Normalize a ticker symbol to uppercase and check its shape
    pub fn normalize_symbol(symbol: &str) -> Result<String> {
        let normalized = symbol.trim().to_uppercase();
        if !symbol_pattern().is_match(&normalized) {
            return Err(Error::validation(format!(
                "asset symbol must be 1-10 alphanumeric characters, got '{}'",
                symbol
            )));
        }
        Ok(normalized)
    }

    /// Validate a display name for registration
    pub fn validate_name(name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("asset name cannot be empty"));
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalization() {
        assert_eq!(Asset::normalize_symbol("btc").unwrap(), "BTC");
        assert_eq!(Asset::normalize_symbol(" eth ").unwrap(), "ETH");
        assert_eq!(Asset::normalize_symbol("usdt").unwrap(), "USDT");
    }

    #[test]
    fn test_symbol_rejects_bad_shapes() {
        assert!(Asset::normalize_symbol("").unwrap_err().is_validation());
        assert!(Asset::normalize_symbol("BTC-USD").is_err());
        assert!(Asset::normalize_symbol("ABCDEFGHIJK").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(Asset::validate_name(" Bitcoin ").unwrap(), "Bitcoin");
        assert!(Asset::validate_name("  ").is_err());
    }
}
