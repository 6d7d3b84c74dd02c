//! Input selection module
//!
//! Chooses which unspent outputs fund a spend request.
//!
//! # Module Structure
//!
//! - `eligibility.rs` - Rules deciding whether an output can be spent right now
//! - `types.rs` - Selection groups, the eligibility report and scan steps
//! - `ordering.rs` - Input comparators (biggest first, oldest first, custom)
//! - `policy.rs` - "Is this enough" policies
//! - `selector.rs` - Per-address selection, the cross-address fallback and the scan driver
//!
//! # Typical Usage
//!
//! ```
//! use std::collections::{BTreeSet, HashSet};
//! use bitcoin::{Network, OutPoint};
//! use coinfold_wallet::store::{MemoryStore, UnspentStore};
//! use coinfold_wallet::types::ChainParams;
//! use coinfold_wallet::utxo_selection::{
//!     find_eligible_outputs, EligibilityFilter, FixedTarget, Selector,
//! };
//!
//! let store = MemoryStore::new();
//! let locks: HashSet<OutPoint> = HashSet::new();
//! let policy = FixedTarget::new(10_000);
//!
//! let mut txn = store.begin_rw().unwrap();
//! let filter = EligibilityFilter::new(ChainParams::new(Network::Regtest), 100, &locks);
//! let report = find_eligible_outputs(
//!     txn.as_mut(),
//!     &filter,
//!     Selector::new(&policy),
//!     &BTreeSet::new(),
//! )
//! .unwrap();
//!
//! assert!(report.selected.is_empty());
//! ```

pub mod eligibility;
pub mod ordering;
pub mod policy;
pub mod selector;
pub mod types;

pub use eligibility::{DeletionQueue, Eligibility, EligibilityFilter, MAX_DELETIONS_PER_PASS};
pub use ordering::InputComparator;
pub use policy::{FeeRatePolicy, FixedTarget, SpendPolicy};
pub use selector::{find_eligible_outputs, SelectionOutcome, Selector};
pub use types::{EligibilityReport, ScanStep, SelectionGroup};
