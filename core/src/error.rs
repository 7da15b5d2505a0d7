//! Protocol error types

use crate::types::{AccountId, Amount, AssetId, Bps, Timestamp};
use thiserror::Error;

/// Broad classes of failure. Every class is rejected atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, rejected before any state is touched
    InputValidation,
    /// Not enough balance, allowance or reserve
    InsufficientResource,
    /// Operation not allowed in the current record state
    StateViolation,
    /// Price reading missing or too old
    Oracle,
    /// Broken invariant; never expected in a healthy protocol
    Fatal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Percent out of bounds: {value} bps (max {max} bps)")]
    PercentOutOfBounds { value: Bps, max: Bps },

    #[error("Requested {requested} bps exceeds max lending percent {max} bps")]
    PercentExceedsMax { requested: Bps, max: Bps },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unauthorized: {0} is not the administrator")]
    Unauthorized(AccountId),

    #[error("Account {0} is reserved for protocol use")]
    ReservedAccount(AccountId),

    #[error("Unknown asset: {0}")]
    UnknownAsset(AssetId),

    #[error("Asset already exists: {0}")]
    AssetAlreadyExists(AssetId),

    #[error("Insufficient {asset} balance for {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        asset: AssetId,
        account: AccountId,
        requested: Amount,
        available: Amount,
    },

    #[error("Insufficient {asset} allowance for {spender} on {owner}: requested {requested}, allowed {allowed}")]
    InsufficientAllowance {
        asset: AssetId,
        owner: AccountId,
        spender: AccountId,
        requested: Amount,
        allowed: Amount,
    },

    #[error("Insufficient reserve: required {required}, available {available}")]
    InsufficientReserve { required: Amount, available: Amount },

    #[error("Insufficient payment: {0}")]
    InsufficientPayment(String),

    #[error("Insufficient collateral for {0}")]
    InsufficientCollateral(AccountId),

    #[error("Account {0} has no active stake")]
    NotStaked(AccountId),

    #[error("Account {0} already has an active stake")]
    AlreadyStaked(AccountId),

    #[error("Lock period not elapsed: {remaining} seconds remaining")]
    LockPeriodNotElapsed { remaining: u64 },

    #[error("Stake of {0} is collateral for an open loan")]
    CollateralLocked(AccountId),

    #[error("Account {0} already has an open loan")]
    LoanAlreadyOpen(AccountId),

    #[error("Account {0} has no open loan")]
    NoOpenLoan(AccountId),

    #[error("Repayment {amount} exceeds outstanding debt {outstanding}")]
    ExceedsOutstandingDebt { amount: Amount, outstanding: Amount },

    #[error("Unknown price pair: {0}")]
    UnknownPricePair(String),

    #[error("Stale price for {pair}: age {age}s exceeds {max_age}s")]
    StalePrice { pair: String, age: u64, max_age: u64 },

    #[error("Invalid price for {pair}: {reason}")]
    InvalidPrice { pair: String, reason: String },

    #[error("Reading for {pair} at {at} is older than the latest reading at {latest}")]
    NonMonotonicReading {
        pair: String,
        at: Timestamp,
        latest: Timestamp,
    },

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Clock went backwards: {now} is earlier than {last}")]
    ClockRegression { now: Timestamp, last: Timestamp },
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        use ProtocolError::*;
        match self {
            InvalidAmount(_)
            | PercentOutOfBounds { .. }
            | PercentExceedsMax { .. }
            | InvalidConfig(_)
            | Unauthorized(_)
            | ReservedAccount(_)
            | UnknownAsset(_)
            | AssetAlreadyExists(_) => ErrorKind::InputValidation,
            InsufficientBalance { .. }
            | InsufficientAllowance { .. }
            | InsufficientReserve { .. }
            | InsufficientPayment(_)
            | InsufficientCollateral(_) => ErrorKind::InsufficientResource,
            NotStaked(_)
            | AlreadyStaked(_)
            | LockPeriodNotElapsed { .. }
            | CollateralLocked(_)
            | LoanAlreadyOpen(_)
            | NoOpenLoan(_)
            | ExceedsOutstandingDebt { .. } => ErrorKind::StateViolation,
            UnknownPricePair(_)
            | StalePrice { .. }
            | InvalidPrice { .. }
            | NonMonotonicReading { .. } => ErrorKind::Oracle,
            ArithmeticOverflow(_) | ClockRegression { .. } => ErrorKind::Fatal,
        }
    }

    /// True when the same call may succeed later without changing its input
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InsufficientResource | ErrorKind::Oracle
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProtocolError::InvalidAmount("zero".into()).kind(),
            ErrorKind::InputValidation
        );
        assert_eq!(
            ProtocolError::LockPeriodNotElapsed { remaining: 3 }.kind(),
            ErrorKind::StateViolation
        );
        assert!(ProtocolError::StalePrice {
            pair: "ETH/USD".into(),
            age: 10,
            max_age: 5
        }
        .is_retryable());
        assert!(ProtocolError::ArithmeticOverflow("credit").is_fatal());
        assert!(!ProtocolError::LoanAlreadyOpen("alice".into()).is_retryable());
        let reserved = ProtocolError::ReservedAccount("staking".into());
        assert_eq!(reserved.kind(), ErrorKind::InputValidation);
        assert!(!reserved.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::ExceedsOutstandingDebt {
            amount: 11,
            outstanding: 10,
        };
        assert_eq!(
            err.to_string(),
            "Repayment 11 exceeds outstanding debt 10"
        );
    }
}
