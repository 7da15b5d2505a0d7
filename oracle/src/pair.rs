//! Asset pair identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokenomics_core::ProtocolError;

/// A `BASE/QUOTE` pair such as `ETH/USD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PricePair {
    base: String,
    quote: String,
}

impl PricePair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_ascii_uppercase(),
            quote: quote.into().to_ascii_uppercase(),
        }
    }

    /// `<base>/USD`
    pub fn usd(base: impl Into<String>) -> Self {
        Self::new(base, "USD")
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for PricePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for PricePair {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::UnknownPricePair(s.to_string());
        let (base, quote) = s.trim().split_once('/').ok_or_else(invalid)?;
        let valid = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(base) || !valid(quote) {
            return Err(invalid());
        }
        Ok(Self::new(base, quote))
    }
}

impl TryFrom<String> for PricePair {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PricePair> for String {
    fn from(pair: PricePair) -> Self {
        pair.to_string()
    }
}
