//! Token sale pricing and settlement
//!
//! The sale price is fixed in USD; the native-currency price follows the
//! native/USD feed. Quantities round down and payments round up, so the
//! protocol never under-charges a buyer.

use crate::journal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokenomics_core::math::{mul_div_ceil, mul_div_floor, TryAdd};
use tokenomics_core::{
    AccountId, Amount, AssetId, Ledger, ProtocolError, Result, Timestamp, TOKEN_UNIT,
};
use tokenomics_oracle::{PriceOracle, PricePair};
use tracing::{debug, info};

/// Settled purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub buyer: AccountId,
    /// Micro-units of the primary token delivered
    pub tokens: Amount,
    /// Native micro-units kept by the sale
    pub charged: Amount,
    /// Native micro-units returned to the buyer
    pub refund: Amount,
    /// Native micro-units per whole token at settlement
    pub unit_price: Amount,
    pub at: Timestamp,
}

pub struct PriceCalculator;

impl PriceCalculator {
    /// Native micro-units per whole token:
    /// `floor(price_in_usd * 10^18 / native_usd)`, both 18-decimal
    ///
    /// The sale floors this once and quotes both quantity and cost from the
    /// floored price, so a buyer is never charged above the exact USD price.
    /// The error is under one native micro-unit per whole token.
    pub fn unit_price_in_native(price_in_usd: Amount, native_usd_wad: u128) -> Result<Amount> {
        mul_div_floor(price_in_usd, TOKEN_UNIT, native_usd_wad, "unit price")
    }

    /// Token micro-units bought with `native`, floored
    pub fn tokens_for(native: Amount, unit_price: Amount) -> Result<Amount> {
        mul_div_floor(native, TOKEN_UNIT, unit_price, "token quote")
    }

    /// Native micro-units owed for `tokens`, ceiled
    pub fn cost_of(tokens: Amount, unit_price: Amount) -> Result<Amount> {
        mul_div_ceil(tokens, unit_price, TOKEN_UNIT, "token cost")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleEngine {
    token: AssetId,
    token_source: AccountId,
    spender: AccountId,
    native_pair: PricePair,
    /// USD per whole token, 18 decimals
    price_in_usd: Amount,
    tokens_sold: Amount,
    native_collected: Amount,
    purchases: VecDeque<PurchaseReceipt>,
}

impl SaleEngine {
    pub fn new(
        token: AssetId,
        token_source: AccountId,
        spender: AccountId,
        native_pair: PricePair,
        price_in_usd: Amount,
    ) -> Self {
        Self {
            token,
            token_source,
            spender,
            native_pair,
            price_in_usd,
            tokens_sold: 0,
            native_collected: 0,
            purchases: VecDeque::new(),
        }
    }

    /// Identity the token source must grant an allowance to
    pub fn spender(&self) -> &AccountId {
        &self.spender
    }

    pub fn token_source(&self) -> &AccountId {
        &self.token_source
    }

    pub fn native_pair(&self) -> &PricePair {
        &self.native_pair
    }

    pub fn price_in_usd(&self) -> Amount {
        self.price_in_usd
    }

    pub fn tokens_sold(&self) -> Amount {
        self.tokens_sold
    }

    pub fn native_collected(&self) -> Amount {
        self.native_collected
    }

    pub fn purchases(&self) -> &VecDeque<PurchaseReceipt> {
        &self.purchases
    }

    pub fn unit_price_in_native<O: PriceOracle>(&self, oracle: &O, now: Timestamp) -> Result<Amount> {
        let reading = oracle.latest_price(&self.native_pair, now)?;
        let unit_price =
            PriceCalculator::unit_price_in_native(self.price_in_usd, reading.price_wad()?)?;
        if unit_price == 0 {
            return Err(ProtocolError::InvalidPrice {
                pair: self.native_pair.to_string(),
                reason: "unit price rounds to zero".to_string(),
            });
        }
        Ok(unit_price)
    }

    pub fn quote_tokens<O: PriceOracle>(
        &self,
        oracle: &O,
        native: Amount,
        now: Timestamp,
    ) -> Result<Amount> {
        let unit_price = self.unit_price_in_native(oracle, now)?;
        let tokens = PriceCalculator::tokens_for(native, unit_price)?;
        debug!(native, tokens, unit_price, "token quote");
        Ok(tokens)
    }

    pub fn price_of<O: PriceOracle>(&self, oracle: &O, tokens: Amount, now: Timestamp) -> Result<Amount> {
        let unit_price = self.unit_price_in_native(oracle, now)?;
        PriceCalculator::cost_of(tokens, unit_price)
    }

    /// Sell as many tokens as `native_paid` covers
    pub fn purchase<L: Ledger, O: PriceOracle>(
        &mut self,
        ledger: &mut L,
        oracle: &O,
        buyer: &AccountId,
        native_paid: Amount,
        now: Timestamp,
    ) -> Result<PurchaseReceipt> {
        if native_paid == 0 {
            return Err(ProtocolError::InsufficientPayment(
                "payment must be greater than 0".to_string(),
            ));
        }

        let unit_price = self.unit_price_in_native(oracle, now)?;
        let tokens = PriceCalculator::tokens_for(native_paid, unit_price)?;
        if tokens == 0 {
            return Err(ProtocolError::InsufficientPayment(format!(
                "{} does not buy a single micro-unit at {} per token",
                native_paid, unit_price
            )));
        }
        let charged = PriceCalculator::cost_of(tokens, unit_price)?;
        self.settle(ledger, buyer, tokens, charged, native_paid, unit_price, now)
    }

    /// Sell exactly `tokens`; `native_paid` must cover their ceiled cost
    pub fn purchase_exact<L: Ledger, O: PriceOracle>(
        &mut self,
        ledger: &mut L,
        oracle: &O,
        buyer: &AccountId,
        tokens: Amount,
        native_paid: Amount,
        now: Timestamp,
    ) -> Result<PurchaseReceipt> {
        if tokens == 0 {
            return Err(ProtocolError::InvalidAmount(
                "token amount must be greater than 0".to_string(),
            ));
        }

        let unit_price = self.unit_price_in_native(oracle, now)?;
        let charged = PriceCalculator::cost_of(tokens, unit_price)?;
        if native_paid < charged {
            return Err(ProtocolError::InsufficientPayment(format!(
                "{} tokens cost {}, paid {}",
                tokens, charged, native_paid
            )));
        }
        self.settle(ledger, buyer, tokens, charged, native_paid, unit_price, now)
    }

    #[allow(clippy::too_many_arguments)]
    fn settle<L: Ledger>(
        &mut self,
        ledger: &mut L,
        buyer: &AccountId,
        tokens: Amount,
        charged: Amount,
        native_paid: Amount,
        unit_price: Amount,
        now: Timestamp,
    ) -> Result<PurchaseReceipt> {
        let tokens_sold = self.tokens_sold.try_add(tokens, "tokens sold")?;
        let native_collected = self.native_collected.try_add(charged, "native collected")?;

        ledger.transfer_from(&self.token, &self.token_source, &self.spender, buyer, tokens)?;

        self.tokens_sold = tokens_sold;
        self.native_collected = native_collected;
        let receipt = PurchaseReceipt {
            buyer: buyer.clone(),
            tokens,
            charged,
            refund: native_paid - charged,
            unit_price,
            at: now,
        };
        journal(&mut self.purchases, receipt.clone());

        info!(%buyer, tokens, charged, refund = receipt.refund, "purchase settled");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokenomics_core::TokenLedger;
    use tokenomics_oracle::PriceFeeds;

    const UNIT_PRICE: Amount = 6_188_118_811_881;

    fn setup() -> (TokenLedger, PriceFeeds, SaleEngine) {
        let token = AssetId::new("TKN");
        let founder = AccountId::new("founder");
        let mut ledger = TokenLedger::new();
        ledger
            .create_asset(&token, &founder, 10u128.pow(24))
            .unwrap();

        let pair = PricePair::usd("ETH");
        let mut feeds = PriceFeeds::new(3_600);
        feeds.register(pair.clone(), 8).unwrap();
        feeds.publish(&pair, 161_600_000_000, 0).unwrap();

        let sale = SaleEngine::new(
            token,
            founder,
            AccountId::new("sale"),
            pair,
            10u128.pow(16),
        );
        (ledger, feeds, sale)
    }

    #[test]
    fn test_unit_price_from_feed() {
        let (_, feeds, sale) = setup();
        assert_eq!(sale.unit_price_in_native(&feeds, 10).unwrap(), UNIT_PRICE);
    }

    #[test]
    fn test_floored_unit_price_bounds_cost() {
        // exact price is 10^16 / 1616 = 6188118811881.188...
        assert_eq!(
            PriceCalculator::unit_price_in_native(10u128.pow(16), 1_616 * TOKEN_UNIT).unwrap(),
            UNIT_PRICE
        );
        // a million whole tokens at the exact price would cost 6188118811881188119
        let tokens = 1_000_000 * TOKEN_UNIT;
        let cost = PriceCalculator::cost_of(tokens, UNIT_PRICE).unwrap();
        assert_eq!(cost, 6_188_118_811_881_000_000);
        assert!(cost < 6_188_118_811_881_188_119);
    }

    #[test]
    fn test_one_wei_quote() {
        let (_, feeds, sale) = setup();
        assert_eq!(sale.quote_tokens(&feeds, 1, 0).unwrap(), 161_600);
        assert_eq!(sale.price_of(&feeds, 161_600, 0).unwrap(), 1);
        assert_eq!(sale.price_of(&feeds, 646_400, 0).unwrap(), 4);
        assert_eq!(sale.price_of(&feeds, TOKEN_UNIT, 0).unwrap(), UNIT_PRICE);
    }

    #[test]
    fn test_purchase_needs_allowance() {
        let (mut ledger, feeds, mut sale) = setup();
        let buyer = AccountId::new("buyer");

        assert!(matches!(
            sale.purchase(&mut ledger, &feeds, &buyer, 1, 0),
            Err(ProtocolError::InsufficientAllowance { .. })
        ));
        assert!(sale.purchases().is_empty());

        let token = AssetId::new("TKN");
        ledger
            .increase_allowance(&token, &AccountId::new("founder"), &AccountId::new("sale"), 161_600)
            .unwrap();
        let receipt = sale.purchase(&mut ledger, &feeds, &buyer, 1, 0).unwrap();
        assert_eq!(receipt.tokens, 161_600);
        assert_eq!(receipt.charged, 1);
        assert_eq!(receipt.refund, 0);
        assert_eq!(ledger.balance_of(&token, &buyer), 161_600);
        assert_eq!(sale.tokens_sold(), 161_600);
        assert_eq!(sale.native_collected(), 1);
    }

    #[test]
    fn test_purchase_rejects_dust_payment() {
        let (mut ledger, mut feeds, mut sale) = setup();
        let buyer = AccountId::new("buyer");
        assert!(matches!(
            sale.purchase(&mut ledger, &feeds, &buyer, 0, 0),
            Err(ProtocolError::InsufficientPayment(_))
        ));

        // Native currency this cheap makes one wei worth less than a micro-unit
        let pair = PricePair::usd("ETH");
        feeds.publish(&pair, 1, 1).unwrap();
        let unit = sale.unit_price_in_native(&feeds, 1).unwrap();
        assert!(unit > TOKEN_UNIT);
        assert!(matches!(
            sale.purchase(&mut ledger, &feeds, &buyer, 1, 1),
            Err(ProtocolError::InsufficientPayment(_))
        ));
    }

    #[test]
    fn test_purchase_exact() {
        let (mut ledger, feeds, mut sale) = setup();
        let token = AssetId::new("TKN");
        let buyer = AccountId::new("buyer");
        ledger
            .approve(&token, &AccountId::new("founder"), &AccountId::new("sale"), TOKEN_UNIT)
            .unwrap();

        assert!(matches!(
            sale.purchase_exact(&mut ledger, &feeds, &buyer, TOKEN_UNIT, UNIT_PRICE - 1, 0),
            Err(ProtocolError::InsufficientPayment(_))
        ));
        let receipt = sale
            .purchase_exact(&mut ledger, &feeds, &buyer, TOKEN_UNIT, UNIT_PRICE + 5, 0)
            .unwrap();
        assert_eq!(receipt.charged, UNIT_PRICE);
        assert_eq!(receipt.refund, 5);
    }

    #[test]
    fn test_stale_feed_blocks_sale() {
        let (mut ledger, feeds, mut sale) = setup();
        assert!(matches!(
            sale.purchase(&mut ledger, &feeds, &AccountId::new("b"), 1, 3_601),
            Err(ProtocolError::StalePrice { .. })
        ));
    }

    proptest! {
        #[test]
        fn rounding_never_undercharges(native in 1u128..100_000_000_000_000_000_000, eth in 1u128..1_000_000_000_000) {
            let unit = PriceCalculator::unit_price_in_native(10u128.pow(16), eth * 10u128.pow(10)).unwrap();
            prop_assume!(unit > 0);
            let tokens = PriceCalculator::tokens_for(native, unit).unwrap();
            let cost = PriceCalculator::cost_of(tokens, unit).unwrap();
            prop_assert!(cost <= native);
            // exact product is covered by the charge
            prop_assert!(cost * TOKEN_UNIT >= tokens * unit);
        }
    }
}
