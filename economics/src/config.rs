//! Protocol configuration
//!
//! Loaded from TOML. Token amounts and prices are decimal strings (`"0.01"`,
//! `"1616"`) so they survive TOML's 64-bit integers; they are scaled with
//! `parse_units` when the economy is built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokenomics_core::math::parse_units;
use tokenomics_core::{
    AccountId, Amount, AssetId, Bps, ProtocolError, Result, BPS_DENOMINATOR, MAX_PRICE_AGE_SECS,
    ORACLE_DECIMALS, SECONDS_PER_DAY, SECONDS_PER_YEAR, TOKEN_DECIMALS,
};
use tokenomics_oracle::PricePair;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Account allowed to change rates and periods
    pub admin: AccountId,
    pub token: TokenConfig,
    pub oracle: OracleConfig,
    pub sale: SaleConfig,
    pub staking: StakingConfig,
    pub lending: LendingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: AssetId,
    pub issuer: AccountId,
    /// Whole tokens minted to the issuer at genesis
    pub initial_supply: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    pub max_price_age_secs: u64,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub pair: PricePair,
    #[serde(default = "default_feed_decimals")]
    pub decimals: u8,
    /// First answer, published at genesis
    pub initial_price: String,
}

fn default_feed_decimals() -> u8 {
    ORACLE_DECIMALS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleConfig {
    pub spender: AccountId,
    pub native_pair: PricePair,
    /// USD per whole token
    pub price_in_usd: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingConfig {
    pub custody: AccountId,
    pub interest_rate_bps: Bps,
    pub min_staking_period_secs: u64,
    pub period_length_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingConfig {
    pub borrowed_asset: AssetId,
    pub reserve_holder: AccountId,
    /// Whole units of the borrowed asset minted to the reserve holder
    pub reserve_supply: String,
    pub spender: AccountId,
    pub collateral_pair: PricePair,
    pub borrowed_pair: PricePair,
    pub interest_rate_bps: Bps,
    pub max_lending_percent_bps: Bps,
    pub period_length_secs: u64,
}

impl ProtocolConfig {
    /// Values used by the local deployment: 1M tokens at 0.01 USD, ETH at
    /// 1616 USD, LINK at 8 USD, 90% staking APR with a 90 day lock, 1.25%
    /// debt APR and a 70% lending cap.
    pub fn local() -> Self {
        Self {
            admin: AccountId::new("founder"),
            token: TokenConfig {
                symbol: AssetId::new("TKN"),
                issuer: AccountId::new("founder"),
                initial_supply: "1000000".to_string(),
            },
            oracle: OracleConfig {
                max_price_age_secs: MAX_PRICE_AGE_SECS,
                feeds: vec![
                    FeedConfig {
                        pair: PricePair::usd("ETH"),
                        decimals: ORACLE_DECIMALS,
                        initial_price: "1616".to_string(),
                    },
                    FeedConfig {
                        pair: PricePair::usd("LINK"),
                        decimals: ORACLE_DECIMALS,
                        initial_price: "8".to_string(),
                    },
                ],
            },
            sale: SaleConfig {
                spender: AccountId::new("sale"),
                native_pair: PricePair::usd("ETH"),
                price_in_usd: "0.01".to_string(),
            },
            staking: StakingConfig {
                custody: AccountId::new("staking"),
                interest_rate_bps: 9_000,
                min_staking_period_secs: 90 * SECONDS_PER_DAY,
                period_length_secs: SECONDS_PER_YEAR,
            },
            lending: LendingConfig {
                borrowed_asset: AssetId::new("LINK"),
                reserve_holder: AccountId::new("link-reserve"),
                reserve_supply: "1000000".to_string(),
                spender: AccountId::new("lending"),
                collateral_pair: PricePair::usd("ETH"),
                borrowed_pair: PricePair::usd("LINK"),
                interest_rate_bps: 125,
                max_lending_percent_bps: 7_000,
                period_length_secs: SECONDS_PER_YEAR,
            },
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| ProtocolError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ProtocolError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, bps) in [
            ("staking.interest_rate_bps", self.staking.interest_rate_bps),
            ("lending.interest_rate_bps", self.lending.interest_rate_bps),
            (
                "lending.max_lending_percent_bps",
                self.lending.max_lending_percent_bps,
            ),
        ] {
            if bps > BPS_DENOMINATOR {
                return Err(ProtocolError::InvalidConfig(format!(
                    "{} is {} bps, above {}",
                    name, bps, BPS_DENOMINATOR
                )));
            }
        }
        if self.staking.period_length_secs == 0 || self.lending.period_length_secs == 0 {
            return Err(ProtocolError::InvalidConfig(
                "interest period length must be greater than 0".to_string(),
            ));
        }
        if self.token.symbol == self.lending.borrowed_asset {
            return Err(ProtocolError::InvalidConfig(format!(
                "borrowed asset must differ from {}",
                self.token.symbol
            )));
        }
        // Custody balance above total_staked is the reward reserve
        for (name, holder) in [
            ("token.issuer", &self.token.issuer),
            ("lending.reserve_holder", &self.lending.reserve_holder),
        ] {
            if holder == &self.staking.custody {
                return Err(ProtocolError::InvalidConfig(format!(
                    "staking.custody must differ from {}",
                    name
                )));
            }
        }

        let mut pairs = BTreeSet::new();
        for feed in &self.oracle.feeds {
            if !pairs.insert(&feed.pair) {
                return Err(ProtocolError::InvalidConfig(format!(
                    "feed {} configured twice",
                    feed.pair
                )));
            }
            if self.feed_answer(feed)? == 0 {
                return Err(ProtocolError::InvalidConfig(format!(
                    "initial price of {} must be greater than 0",
                    feed.pair
                )));
            }
        }
        for pair in [
            &self.sale.native_pair,
            &self.lending.collateral_pair,
            &self.lending.borrowed_pair,
        ] {
            if !pairs.contains(pair) {
                return Err(ProtocolError::InvalidConfig(format!(
                    "no feed configured for {}",
                    pair
                )));
            }
        }

        if self.price_in_usd()? == 0 {
            return Err(ProtocolError::InvalidConfig(
                "sale price must be greater than 0".to_string(),
            ));
        }
        self.initial_supply()?;
        self.reserve_supply()?;
        Ok(())
    }

    pub fn initial_supply(&self) -> Result<Amount> {
        parse_units(&self.token.initial_supply, TOKEN_DECIMALS)
    }

    pub fn reserve_supply(&self) -> Result<Amount> {
        parse_units(&self.lending.reserve_supply, TOKEN_DECIMALS)
    }

    pub fn price_in_usd(&self) -> Result<Amount> {
        parse_units(&self.sale.price_in_usd, TOKEN_DECIMALS)
    }

    /// Initial answer scaled to the feed's own decimals
    pub fn feed_answer(&self, feed: &FeedConfig) -> Result<u128> {
        parse_units(&feed.initial_price, u32::from(feed.decimals))
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self::local()
    }
}
