//! Eligibility filter for unspent outputs
//!
//! Each output visited by the store scan is classified exactly once. Rules
//! apply in a fixed order and the first that matches decides:
//!
//! 1. confirmed outputs mined below the minimum height are skipped
//! 2. immature coinbase outputs are skipped
//! 3. coinbase outputs past the burn window are queued for deletion
//! 4. zero-value outputs are queued for deletion
//! 5. outputs lacking the required confirmations are counted as unconfirmed
//! 6. locked outputs are skipped
//!
//! Anything else is eligible and handed to the selector.

use bitcoin::OutPoint;
use log::trace;

use crate::error::StoreError;
use crate::store::{LockSet, StoreTxn};
use crate::types::{confirmed, ChainParams, UnspentOutput};

/// Upper bound on deletions queued during one scan
pub const MAX_DELETIONS_PER_PASS: usize = 1_000_000;

/// Classification of a single unspent output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eligibility {
    Eligible,
    BelowMinHeight,
    ImmatureCoinbase,
    Burned,
    ZeroValue,
    Unconfirmed,
    Locked,
}

impl Eligibility {
    /// Whether the output should be purged from the store
    pub fn should_delete(&self) -> bool {
        matches!(self, Eligibility::Burned | Eligibility::ZeroValue)
    }
}

/// Applies the eligibility rules at a fixed chain tip
pub struct EligibilityFilter<'a> {
    params: ChainParams,
    tip_height: u32,
    min_conf: u32,
    min_height: u32,
    locks: &'a dyn LockSet,
}

impl<'a> EligibilityFilter<'a> {
    pub fn new(params: ChainParams, tip_height: u32, locks: &'a dyn LockSet) -> Self {
        Self {
            params,
            tip_height,
            min_conf: 1,
            min_height: 0,
            locks,
        }
    }

    pub fn with_min_conf(mut self, min_conf: u32) -> Self {
        self.min_conf = min_conf;
        self
    }

    pub fn with_min_height(mut self, min_height: u32) -> Self {
        self.min_height = min_height;
        self
    }

    pub fn tip_height(&self) -> u32 {
        self.tip_height
    }

    /// Classify an output
    pub fn classify(&self, output: &UnspentOutput) -> Eligibility {
        if let Some(height) = output.height {
            if height < self.min_height {
                return Eligibility::BelowMinHeight;
            }
        }

        if output.from_coinbase {
            if !self.params.is_mature(output, self.tip_height) {
                return Eligibility::ImmatureCoinbase;
            }
            if self.params.is_burned(output, self.tip_height) {
                return Eligibility::Burned;
            }
        }

        if output.value == 0 {
            return Eligibility::ZeroValue;
        }

        if !confirmed(self.min_conf, output.height, self.tip_height) {
            return Eligibility::Unconfirmed;
        }

        if self.locks.is_locked(&output.outpoint) {
            return Eligibility::Locked;
        }

        Eligibility::Eligible
    }
}

/// Outputs to purge once the scan has finished
#[derive(Debug, Default)]
pub struct DeletionQueue {
    outpoints: Vec<OutPoint>,
    burned: usize,
    zero_value: usize,
    dropped: usize,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an output for deletion
    ///
    /// Returns false when the per-pass cap has been reached; the output is
    /// left for a later pass.
    pub fn push(&mut self, outpoint: OutPoint, reason: Eligibility) -> bool {
        if self.outpoints.len() >= MAX_DELETIONS_PER_PASS {
            self.dropped += 1;
            return false;
        }
        match reason {
            Eligibility::Burned => self.burned += 1,
            Eligibility::ZeroValue => self.zero_value += 1,
            _ => {}
        }
        self.outpoints.push(outpoint);
        true
    }

    pub fn len(&self) -> usize {
        self.outpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outpoints.is_empty()
    }

    pub fn burned(&self) -> usize {
        self.burned
    }

    pub fn zero_value(&self) -> usize {
        self.zero_value
    }

    /// Outputs that did not fit under the cap
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Stage every queued deletion on the store transaction
    pub fn apply(&self, txn: &mut dyn StoreTxn) -> Result<(), StoreError> {
        for outpoint in &self.outpoints {
            trace!("Deleting unspendable output {}", outpoint);
            txn.delete_unspent(outpoint)?;
        }
        Ok(())
    }
}
