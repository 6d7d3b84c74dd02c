//! Core data structures for input selection
//!
//! - [`SelectionGroup`]: per-address candidate set kept sorted best-first
//! - [`EligibilityReport`]: the selected set plus the bookkeeping needed to
//!   explain a failed attempt
//! - [`ScanStep`]: what the selector asks of the store scan after each output

use std::collections::HashSet;

use bitcoin::OutPoint;

use super::ordering::InputComparator;
use crate::types::{UnspentOutput, MAX_INPUTS_PER_TX, MAX_INPUTS_PER_TX_LEGACY};

/// Ordered collection of candidate outputs with a running total
///
/// Members are sorted best-first by the group's comparator, so the worst
/// candidate is always last. `total` always equals the sum of member values
/// and no outpoint appears twice.
#[derive(Debug, Clone)]
pub struct SelectionGroup {
    members: Vec<UnspentOutput>,
    ids: HashSet<OutPoint>,
    total: u64,
    segwit: bool,
    comparator: InputComparator,
}

impl SelectionGroup {
    pub fn new(comparator: InputComparator) -> Self {
        Self {
            members: Vec::new(),
            ids: HashSet::new(),
            total: 0,
            segwit: true,
            comparator,
        }
    }

    /// Insert a candidate at its sorted position
    ///
    /// Returns false (and leaves the group unchanged) if the outpoint is
    /// already a member.
    pub fn insert(&mut self, output: UnspentOutput) -> bool {
        if self.ids.contains(&output.outpoint) {
            return false;
        }
        let comparator = &self.comparator;
        let pos = self
            .members
            .binary_search_by(|probe| comparator.compare(probe, &output))
            .unwrap_or_else(|e| e);
        self.total += output.value;
        self.segwit &= output.is_segwit();
        self.ids.insert(output.outpoint);
        self.members.insert(pos, output);
        true
    }

    /// The least preferred member
    pub fn worst(&self) -> Option<&UnspentOutput> {
        self.members.last()
    }

    /// Remove and return the least preferred member
    pub fn pop_worst(&mut self) -> Option<UnspentOutput> {
        let worst = self.members.pop()?;
        self.total -= worst.value;
        self.ids.remove(&worst.outpoint);
        Some(worst)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// True while every member added so far has a segwit script
    pub fn is_segwit(&self) -> bool {
        self.segwit
    }

    pub fn members(&self) -> &[UnspentOutput] {
        &self.members
    }

    pub fn into_members(self) -> Vec<UnspentOutput> {
        self.members
    }

    /// Maximum number of members this group may spend in one transaction
    pub fn input_cap(&self, max_inputs: Option<usize>) -> usize {
        match max_inputs {
            Some(n) => n,
            None if self.segwit => MAX_INPUTS_PER_TX,
            None => MAX_INPUTS_PER_TX_LEGACY,
        }
    }

    /// Whether the group holds more members than its cap allows
    pub fn over_limit(&self, max_inputs: Option<usize>) -> bool {
        self.len() > self.input_cap(max_inputs)
    }
}

/// Result of a scan: the chosen inputs plus accounting for error reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityReport {
    /// Inputs to offer the transaction author, best first
    pub selected: Vec<UnspentOutput>,
    /// Address whose group satisfied the request on its own, if any
    pub winner: Option<String>,
    /// Outputs skipped only for lacking confirmations
    pub unconfirmed_count: usize,
    pub unconfirmed_amount: u64,
    /// Eligible outputs left out to respect the input cap
    pub unused_count: usize,
    pub unused_amount: u64,
    /// Outputs visited by the store scan
    pub visited: usize,
    /// Burned coinbase outputs removed from the store
    pub deleted_burned: usize,
    /// Zero-value outputs removed from the store
    pub deleted_zero_value: usize,
}

impl EligibilityReport {
    pub fn selected_total(&self) -> u64 {
        self.selected.iter().map(|o| o.value).sum()
    }
}

/// Instruction returned by the selector for each eligible output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// Keep scanning
    Continue,
    /// The named address can fund the request alone; stop scanning
    StopWithWinner(String),
}
