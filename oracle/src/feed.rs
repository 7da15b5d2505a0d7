//! Round-based price feed
//!
//! Mirrors the shape of a V3 aggregator: every `update_answer` opens a new
//! round with an increasing id. Readings never go back in time.

use crate::pair::PricePair;
use serde::{Deserialize, Serialize};
use tokenomics_core::{ProtocolError, Result, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: u64,
    pub answer: u128,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeed {
    pair: PricePair,
    decimals: u8,
    description: String,
    rounds: Vec<Round>,
}

impl PriceFeed {
    pub fn new(pair: PricePair, decimals: u8) -> Self {
        let description = pair.to_string();
        Self {
            pair,
            decimals,
            description,
            rounds: Vec::new(),
        }
    }

    pub fn pair(&self) -> &PricePair {
        &self.pair
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Publish a new answer; returns the id of the opened round
    pub fn update_answer(&mut self, answer: u128, at: Timestamp) -> Result<u64> {
        if answer == 0 {
            return Err(ProtocolError::InvalidPrice {
                pair: self.pair.to_string(),
                reason: "answer must be greater than 0".to_string(),
            });
        }
        if let Some(latest) = self.latest_round() {
            if at < latest.updated_at {
                return Err(ProtocolError::NonMonotonicReading {
                    pair: self.pair.to_string(),
                    at,
                    latest: latest.updated_at,
                });
            }
        }

        let round_id = self.rounds.len() as u64 + 1;
        self.rounds.push(Round {
            round_id,
            answer,
            updated_at: at,
        });
        Ok(round_id)
    }

    pub fn latest_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    pub fn round(&self, round_id: u64) -> Option<&Round> {
        if round_id == 0 {
            return None;
        }
        self.rounds.get(round_id as usize - 1)
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_increase() {
        let mut feed = PriceFeed::new(PricePair::usd("ETH"), 8);
        assert!(feed.latest_round().is_none());

        assert_eq!(feed.update_answer(161_600_000_000, 100).unwrap(), 1);
        assert_eq!(feed.update_answer(130_000_000_000, 100).unwrap(), 2);
        assert_eq!(feed.latest_round().unwrap().answer, 130_000_000_000);
        assert_eq!(feed.round(1).unwrap().answer, 161_600_000_000);
        assert!(feed.round(0).is_none());
        assert!(feed.round(3).is_none());
        assert_eq!(feed.description(), "ETH/USD");
    }

    #[test]
    fn test_rejects_older_reading() {
        let mut feed = PriceFeed::new(PricePair::usd("ETH"), 8);
        feed.update_answer(1, 200).unwrap();
        assert_eq!(
            feed.update_answer(2, 199),
            Err(ProtocolError::NonMonotonicReading {
                pair: "ETH/USD".to_string(),
                at: 199,
                latest: 200,
            })
        );
        assert_eq!(feed.round_count(), 1);
    }

    #[test]
    fn test_rejects_zero_answer() {
        let mut feed = PriceFeed::new(PricePair::usd("LINK"), 8);
        assert!(matches!(
            feed.update_answer(0, 1),
            Err(ProtocolError::InvalidPrice { .. })
        ));
    }
}
