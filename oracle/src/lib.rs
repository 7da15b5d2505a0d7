//! Price oracle capability
//!
//! Read-only latest-price lookup per asset pair, backed by round-based feeds
//! in the style of V3 aggregators, with a configurable staleness bound.

pub mod feed;
pub mod pair;
pub mod registry;

pub use feed::{PriceFeed, Round};
pub use pair::PricePair;
pub use registry::{PriceFeeds, PriceOracle, PriceReading};
