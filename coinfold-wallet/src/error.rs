//! Standardized error handling for Coinfold
//!
//! Every failed spend attempt surfaces as a [`CoinfoldError`]. The three
//! selection failures (`InsufficientFunds`, `TooManyInputs`,
//! `UnconfirmedCoins`) carry the counts and amounts gathered while scanning,
//! so a caller can build an actionable message without re-querying the store.
//!
//! # Usage
//!
//! ```
//! use coinfold_wallet::error::{CoinfoldError, ErrorCategory};
//!
//! let err = CoinfoldError::AddressResolution("no change address".to_string());
//! assert_eq!(err.category(), ErrorCategory::Address);
//! ```

use std::fmt;

use bitcoin::OutPoint;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::txauthor::ImpossibleTx;
use crate::types::SATS_PER_COIN;

/// Errors raised by an unspent output store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lock guarding the store was poisoned by a panicking writer
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// A staged delete referenced an output the store does not hold
    #[error("unspent output {0} not found")]
    NotFound(OutPoint),

    /// Backend-specific failure
    #[error("store backend failure: {0}")]
    Backend(String),

    /// Snapshot (de)serialization failure
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Which part of the wallet a funds shortfall applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundsScope {
    /// No address restriction was requested
    Wallet,
    /// Inputs were restricted to these owning addresses
    Addresses(Vec<String>),
}

impl fmt::Display for FundsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundsScope::Wallet => write!(f, "wallet does not have enough balance"),
            FundsScope::Addresses(addrs) => {
                write!(f, "address(es) [{}] do not have enough balance", addrs.join(", "))
            }
        }
    }
}

/// The main error type for the Coinfold wallet engine
#[derive(Debug, Error)]
pub enum CoinfoldError {
    /// Not enough eligible value, even after combining addresses
    #[error("Insufficient funds: {scope}")]
    InsufficientFunds {
        scope: FundsScope,
        #[source]
        source: ImpossibleTx,
    },

    /// Enough value exists but only across more inputs than one transaction may carry
    #[error("Too many inputs: {count} outputs worth {} could not be included", format_coins(*amount))]
    TooManyInputs {
        count: usize,
        amount: u64,
        #[source]
        source: ImpossibleTx,
    },

    /// Enough value exists but part of it lacks the required confirmations
    #[error("Unconfirmed coins: {count} outputs worth {} lack confirmations", format_coins(*amount))]
    UnconfirmedCoins {
        count: usize,
        amount: u64,
        #[source]
        source: ImpossibleTx,
    },

    /// Read, write or delete failure in the backing store
    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: StoreError,
    },

    /// A signed input did not pass script validation
    #[error("Validation failed for input {index}: {context}")]
    Validation { index: usize, context: String },

    /// No address could be determined for the change output
    #[error("Address resolution error: {0}")]
    AddressResolution(String),

    /// Key lookup or signature creation failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// The authoring collaborator failed for a reason other than lack of funds
    #[error("Build error: {0}")]
    Build(String),

    /// The chain tip could not be determined
    #[error("Chain error: {0}")]
    Chain(String),

    /// Invalid request or configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Type alias for a Result with CoinfoldError
pub type CoinfoldResult<T> = Result<T, CoinfoldError>;

/// Create a storage error with context
pub fn storage_error<S: Into<String>>(context: S, source: StoreError) -> CoinfoldError {
    CoinfoldError::Storage {
        context: context.into(),
        source,
    }
}

impl From<bitcoin::address::Error> for CoinfoldError {
    fn from(err: bitcoin::address::Error) -> Self {
        CoinfoldError::AddressResolution(err.to_string())
    }
}

impl From<bitcoin::secp256k1::Error> for CoinfoldError {
    fn from(err: bitcoin::secp256k1::Error) -> Self {
        CoinfoldError::Signing(err.to_string())
    }
}

impl From<bitcoin::sighash::Error> for CoinfoldError {
    fn from(err: bitcoin::sighash::Error) -> Self {
        CoinfoldError::Signing(format!("sighash computation failed: {}", err))
    }
}

/// Error category for logging purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Selection could not fund the request
    Funds,
    /// Storage errors
    Storage,
    /// Script validation errors
    Validation,
    /// Address resolution errors
    Address,
    /// Signing errors
    Signing,
    /// Transaction construction errors
    Build,
    /// Chain state errors
    Chain,
    /// Configuration errors
    Config,
}

impl ErrorCategory {
    /// Convert the error category to a string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Funds => "Funds",
            ErrorCategory::Storage => "Storage",
            ErrorCategory::Validation => "Validation",
            ErrorCategory::Address => "Address",
            ErrorCategory::Signing => "Signing",
            ErrorCategory::Build => "Build",
            ErrorCategory::Chain => "Chain",
            ErrorCategory::Config => "Config",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoinfoldError {
    /// Get the category of this error for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            CoinfoldError::InsufficientFunds { .. }
            | CoinfoldError::TooManyInputs { .. }
            | CoinfoldError::UnconfirmedCoins { .. } => ErrorCategory::Funds,
            CoinfoldError::Storage { .. } => ErrorCategory::Storage,
            CoinfoldError::Validation { .. } => ErrorCategory::Validation,
            CoinfoldError::AddressResolution(_) => ErrorCategory::Address,
            CoinfoldError::Signing(_) => ErrorCategory::Signing,
            CoinfoldError::Build(_) => ErrorCategory::Build,
            CoinfoldError::Chain(_) => ErrorCategory::Chain,
            CoinfoldError::Config(_) => ErrorCategory::Config,
        }
    }

    /// Whether the attempt may succeed later without changes to the request
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoinfoldError::UnconfirmedCoins { .. })
    }

    /// Get a sanitized message suitable for displaying to users
    ///
    /// Key material and storage internals never appear in these messages.
    pub fn user_message(&self) -> String {
        match self {
            CoinfoldError::InsufficientFunds { scope, .. } => {
                format!("Insufficient funds: {}", scope)
            }
            CoinfoldError::TooManyInputs { count, amount, .. } => format!(
                "Too many inputs: {} could not be spent because it is split across {} small outputs. \
                 Send a smaller amount or consolidate your coins first.",
                format_coins(*amount),
                count
            ),
            CoinfoldError::UnconfirmedCoins { count, amount, .. } => format!(
                "{} in {} outputs is not yet confirmed. Wait for more confirmations and try again.",
                format_coins(*amount),
                count
            ),
            CoinfoldError::Storage { context, .. } => {
                format!("Wallet database error: {}", context)
            }
            CoinfoldError::Validation { index, .. } => {
                format!("Signed transaction failed verification at input {}", index)
            }
            CoinfoldError::AddressResolution(message) => {
                format!("Unable to determine change address: {}", message)
            }
            CoinfoldError::Signing(_) => "Unable to sign the transaction".to_string(),
            CoinfoldError::Build(message) => format!("Unable to build transaction: {}", message),
            CoinfoldError::Chain(message) => format!("Chain state unavailable: {}", message),
            CoinfoldError::Config(message) => format!("Configuration error: {}", message),
        }
    }
}

/// Render an amount of base units as whole coins with eight decimals
pub fn format_coins(sat: u64) -> String {
    let coins = Decimal::from(sat) / Decimal::from(SATS_PER_COIN);
    format!("{:.8} BTC", coins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_messages_distinguish_wallet_and_addresses() {
        assert_eq!(FundsScope::Wallet.to_string(), "wallet does not have enough balance");
        let scoped = FundsScope::Addresses(vec!["a".into(), "b".into()]);
        assert_eq!(scoped.to_string(), "address(es) [a, b] do not have enough balance");
    }

    #[test]
    fn coins_render_without_float_rounding() {
        assert_eq!(format_coins(101_000), "0.00101000 BTC");
        assert_eq!(format_coins(2_100_000_000_000_000), "21000000.00000000 BTC");
    }

    #[test]
    fn signing_errors_do_not_leak_detail() {
        let err = CoinfoldError::Signing("no key for bc1qsecret".to_string());
        assert_eq!(err.category(), ErrorCategory::Signing);
        assert!(!err.user_message().contains("bc1qsecret"));
    }

    #[test]
    fn selection_failures_carry_the_author_cause() {
        use std::error::Error as _;

        let err = CoinfoldError::UnconfirmedCoins {
            count: 2,
            amount: 2_000_000,
            source: ImpossibleTx::NoInputs,
        };
        assert!(err.source().is_some());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("0.02000000 BTC"));
    }
}
