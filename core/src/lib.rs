//! Tokenomics Core Library
//!
//! Shared types, errors, checked fixed-point math, the time source and the
//! token ledger used by the sale, staking and lending engines.

pub mod clock;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod math;
pub mod types;

pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use constants::*;
pub use error::{ErrorKind, ProtocolError, Result};
pub use ledger::{Ledger, LedgerEvent, TokenLedger};
pub use types::{AccountId, Amount, AssetId, Bps, Timestamp};
