//! Coinfold Wallet Engine
//!
//! This crate chooses which unspent outputs fund a payment and assembles,
//! signs and validates the resulting transaction.
//!
//! # Modules
//!
//! - `types`: Core domain types (unspent outputs, chain rules, spend requests)
//! - `error`: Error taxonomy with user-facing messages
//! - `logging`: Logging setup and context helpers
//! - `config`: TOML configuration
//! - `math`: Size, fee and dust arithmetic
//! - `store`: Wallet store, lock set, chain tip and address watcher interfaces
//! - `utxo_selection`: Eligibility filter, selection groups and the selector
//! - `txauthor`: Unsigned transaction authoring
//! - `signing`: Input signing and signed-input validation
//! - `wallet_operations`: The spend attempt orchestrator
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bitcoin::{Network, TxOut, ScriptBuf};
//! use coinfold_wallet::{
//!     ChainParams, CoinfoldError, FixedTip, MemoryStore, SendMode, SpendRequest,
//!     TransactionCreator,
//! };
//!
//! let creator = TransactionCreator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(FixedTip(110)),
//!     ChainParams::new(Network::Regtest),
//! );
//! let pay = TxOut { value: 10_000, script_pubkey: ScriptBuf::new() };
//! let request = SpendRequest::new(vec![pay], 1000).with_send_mode(SendMode::Unsigned);
//!
//! let err = creator.create_transaction(&request).unwrap_err();
//! assert!(matches!(err, CoinfoldError::InsufficientFunds { .. }));
//! ```

/// Core domain types
pub mod types;

/// Error handling
pub mod error;

/// Logging setup and helpers
pub mod logging;

/// Configuration management
pub mod config;

/// Size, fee and dust arithmetic
pub mod math;

/// Store and chain collaborators
pub mod store;

/// Input selection
pub mod utxo_selection;

/// Unsigned transaction authoring
pub mod txauthor;

/// Signing and validation
pub mod signing;

/// Spend attempt orchestration
pub mod wallet_operations;

pub use error::{CoinfoldError, CoinfoldResult, ErrorCategory, FundsScope, StoreError};
pub use store::{
    AddressWatcher, ChainTip, FixedTip, LockSet, MemoryStore, NoopWatcher, OutpointLocks,
    RecordingWatcher, StoreTxn, UnspentStore,
};
pub use types::{ChainParams, SendMode, SpendRequest, UnspentOutput};
pub use utxo_selection::{
    find_eligible_outputs, EligibilityFilter, EligibilityReport, FeeRatePolicy, InputComparator,
    ScanStep, SelectionGroup, Selector, SpendPolicy,
};
pub use txauthor::{FeeRateAuthor, ImpossibleTx, TransactionDraft, TxAuthor};
pub use signing::{Keyring, ScriptValidator, SecretSource, StandardValidator};
pub use wallet_operations::TransactionCreator;

/// Library version information
pub mod version {
    /// Current crate version
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
