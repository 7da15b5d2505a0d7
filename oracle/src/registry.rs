//! Feed registry and the `PriceOracle` capability

use crate::feed::PriceFeed;
use crate::pair::PricePair;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokenomics_core::math::rescale;
use tokenomics_core::{ProtocolError, Result, Timestamp, TOKEN_DECIMALS};
use tracing::debug;

/// One price observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub pair: PricePair,
    pub round_id: u64,
    /// Raw answer with `decimals` fractional digits
    pub price: u128,
    pub decimals: u8,
    pub updated_at: Timestamp,
}

impl PriceReading {
    /// Price rescaled to 18 decimals
    pub fn price_wad(&self) -> Result<u128> {
        rescale(self.price, u32::from(self.decimals), TOKEN_DECIMALS)
    }

    pub fn age(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.updated_at)
    }
}

pub trait PriceOracle {
    /// Most recent reading, without any freshness check
    fn latest_reading(&self, pair: &PricePair) -> Result<PriceReading>;

    /// Maximum acceptable age of a reading in seconds
    fn max_price_age(&self) -> u64;

    /// Most recent reading, rejected with `StalePrice` when older than
    /// `max_price_age()`. Callers must use this for every pricing decision.
    fn latest_price(&self, pair: &PricePair, now: Timestamp) -> Result<PriceReading> {
        let reading = self.latest_reading(pair)?;
        let age = reading.age(now);
        let max_age = self.max_price_age();
        if age > max_age {
            return Err(ProtocolError::StalePrice {
                pair: pair.to_string(),
                age,
                max_age,
            });
        }
        Ok(reading)
    }
}

/// Registry of independent feeds sharing one staleness policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeeds {
    feeds: BTreeMap<PricePair, PriceFeed>,
    max_price_age_secs: u64,
}

impl PriceFeeds {
    pub fn new(max_price_age_secs: u64) -> Self {
        Self {
            feeds: BTreeMap::new(),
            max_price_age_secs,
        }
    }

    /// Register a feed; registering an existing pair keeps its history.
    /// The decimals of an existing feed cannot change.
    pub fn register(&mut self, pair: PricePair, decimals: u8) -> Result<&mut PriceFeed> {
        let feed = self
            .feeds
            .entry(pair.clone())
            .or_insert_with(|| PriceFeed::new(pair, decimals));
        if feed.decimals() != decimals {
            return Err(ProtocolError::InvalidConfig(format!(
                "feed {} has {} decimals, not {}",
                feed.pair(),
                feed.decimals(),
                decimals
            )));
        }
        Ok(feed)
    }

    pub fn publish(&mut self, pair: &PricePair, answer: u128, at: Timestamp) -> Result<u64> {
        let feed = self
            .feeds
            .get_mut(pair)
            .ok_or_else(|| ProtocolError::UnknownPricePair(pair.to_string()))?;
        let round_id = feed.update_answer(answer, at)?;
        debug!(%pair, answer, at, round_id, "price published");
        Ok(round_id)
    }

    pub fn feed(&self, pair: &PricePair) -> Option<&PriceFeed> {
        self.feeds.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &PricePair> {
        self.feeds.keys()
    }

    pub fn contains(&self, pair: &PricePair) -> bool {
        self.feeds.contains_key(pair)
    }

    pub fn set_max_price_age(&mut self, secs: u64) {
        self.max_price_age_secs = secs;
    }
}

impl PriceOracle for PriceFeeds {
    fn latest_reading(&self, pair: &PricePair) -> Result<PriceReading> {
        let feed = self
            .feeds
            .get(pair)
            .ok_or_else(|| ProtocolError::UnknownPricePair(pair.to_string()))?;
        let round = feed.latest_round().ok_or_else(|| ProtocolError::StalePrice {
            pair: pair.to_string(),
            age: u64::MAX,
            max_age: self.max_price_age_secs,
        })?;

        Ok(PriceReading {
            pair: pair.clone(),
            round_id: round.round_id,
            price: round.answer,
            decimals: feed.decimals(),
            updated_at: round.updated_at,
        })
    }

    fn max_price_age(&self) -> u64 {
        self.max_price_age_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeds() -> PriceFeeds {
        let mut feeds = PriceFeeds::new(60);
        feeds.register(PricePair::usd("ETH"), 8).unwrap();
        feeds.register(PricePair::usd("LINK"), 8).unwrap();
        feeds
    }

    #[test]
    fn test_latest_price_fresh() {
        let mut feeds = feeds();
        let eth = PricePair::usd("ETH");
        feeds.publish(&eth, 161_600_000_000, 1_000).unwrap();

        let reading = feeds.latest_price(&eth, 1_060).unwrap();
        assert_eq!(reading.price, 161_600_000_000);
        assert_eq!(reading.price_wad().unwrap(), 1_616 * 10u128.pow(18));
    }

    #[test]
    fn test_stale_after_max_age() {
        let mut feeds = feeds();
        let eth = PricePair::usd("ETH");
        feeds.publish(&eth, 161_600_000_000, 1_000).unwrap();

        assert_eq!(
            feeds.latest_price(&eth, 1_061),
            Err(ProtocolError::StalePrice {
                pair: "ETH/USD".to_string(),
                age: 61,
                max_age: 60,
            })
        );
        // The raw reading is still there
        assert!(feeds.latest_reading(&eth).is_ok());
    }

    #[test]
    fn test_pairs_go_stale_independently() {
        let mut feeds = feeds();
        let eth = PricePair::usd("ETH");
        let link = PricePair::usd("LINK");
        feeds.publish(&eth, 130_000_000_000, 1_000).unwrap();
        feeds.publish(&link, 800_000_000, 1_050).unwrap();

        assert!(feeds.latest_price(&eth, 1_100).is_err());
        assert!(feeds.latest_price(&link, 1_100).is_ok());
    }

    #[test]
    fn test_future_reading_counts_as_fresh() {
        let mut feeds = feeds();
        let eth = PricePair::usd("ETH");
        feeds.publish(&eth, 1, 5_000).unwrap();
        assert_eq!(feeds.latest_price(&eth, 4_000).unwrap().age(4_000), 0);
    }

    #[test]
    fn test_unknown_and_empty_pairs() {
        let feeds = feeds();
        assert!(matches!(
            feeds.latest_price(&PricePair::usd("BTC"), 0),
            Err(ProtocolError::UnknownPricePair(_))
        ));
        assert!(matches!(
            feeds.latest_price(&PricePair::usd("ETH"), 0),
            Err(ProtocolError::StalePrice { .. })
        ));
    }

    #[test]
    fn test_register_keeps_history() {
        let mut feeds = feeds();
        let eth = PricePair::usd("ETH");
        feeds.publish(&eth, 7, 1).unwrap();
        feeds.register(eth.clone(), 8).unwrap();
        assert_eq!(feeds.feed(&eth).unwrap().round_count(), 1);
    }

    #[test]
    fn test_register_rejects_changed_decimals() {
        let mut feeds = feeds();
        let eth = PricePair::usd("ETH");
        feeds.publish(&eth, 161_600_000_000, 1).unwrap();

        assert!(matches!(
            feeds.register(eth.clone(), 18),
            Err(ProtocolError::InvalidConfig(_))
        ));
        let feed = feeds.feed(&eth).unwrap();
        assert_eq!(feed.decimals(), 8);
        assert_eq!(feed.round_count(), 1);
    }
}
