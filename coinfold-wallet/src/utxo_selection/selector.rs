//! Input selector and scan driver
//!
//! The [`Selector`] receives eligible outputs one at a time and keeps one
//! [`SelectionGroup`] per owning address. Paying from a single address is
//! preferred; only when no address can fund the request alone are groups
//! combined.
//!
//! # Single-address resolution
//!
//! After each insertion the selector asks the [`SpendPolicy`] whether the
//! address's group is enough. A sufficient group sheds its worst member when
//! it stays sufficient without it. With the default biggest-first ordering
//! the first group that is sufficient within its input cap wins immediately
//! and the scan stops. With a
//! caller supplied comparator every group is built in full and the first
//! sufficient group in address order wins.
//!
//! # Input caps
//!
//! A group that grows past its input cap evicts its worst member, counted
//! as unused. When sweeping with the default ordering the first group to
//! reach its cap wins; the rest of the scan only tallies unused outputs.
//!
//! # Cross-address fallback
//!
//! Without a winner, groups are folded in address order into one
//! biggest-first pool, evicting to stay under the cap, until the pool is
//! enough. Groups left unfolded count as unused. A sweep is never enough,
//! so it folds every group and keeps the biggest outputs that fit.
//!
//! # Usage
//!
//! ```
//! use coinfold_wallet::utxo_selection::policy::FixedTarget;
//! use coinfold_wallet::utxo_selection::selector::Selector;
//!
//! let policy = FixedTarget::new(50_000);
//! let selector = Selector::new(&policy);
//! let outcome = selector.finish();
//! assert!(outcome.selected.is_empty());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::time::Instant;

use log::{debug, info, trace};
use serde_json::json;

use super::eligibility::{DeletionQueue, Eligibility, EligibilityFilter};
use super::ordering::InputComparator;
use super::policy::SpendPolicy;
use super::types::{EligibilityReport, ScanStep, SelectionGroup};
use crate::error::{storage_error, CoinfoldError};
use crate::logging::{self, LogLevel};
use crate::store::StoreTxn;
use crate::types::UnspentOutput;

/// Inputs chosen by the selector and the eligible value it left out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub selected: Vec<UnspentOutput>,
    pub winner: Option<String>,
    pub unused_count: usize,
    pub unused_amount: u64,
}

/// Groups eligible outputs by address and picks the inputs to spend
pub struct Selector<'p> {
    policy: &'p dyn SpendPolicy,
    comparator: Option<InputComparator>,
    max_inputs: Option<usize>,
    groups: BTreeMap<String, SelectionGroup>,
    winner: Option<String>,
    tally_only: bool,
    unused_count: usize,
    unused_amount: u64,
}

impl<'p> Selector<'p> {
    pub fn new(policy: &'p dyn SpendPolicy) -> Self {
        Self {
            policy,
            comparator: None,
            max_inputs: None,
            groups: BTreeMap::new(),
            winner: None,
            tally_only: false,
            unused_count: 0,
            unused_amount: 0,
        }
    }

    /// Use a caller supplied ordering; `None` keeps biggest-first
    pub fn with_comparator(mut self, comparator: Option<InputComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Override the default input caps
    pub fn with_max_inputs(mut self, max_inputs: Option<usize>) -> Self {
        self.max_inputs = max_inputs.filter(|n| *n > 0);
        self
    }

    /// Address that has already won, if any
    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    fn mark_unused(&mut self, output: &UnspentOutput) {
        self.unused_count += 1;
        self.unused_amount += output.value;
    }

    /// Feed one eligible output
    pub fn push(&mut self, output: UnspentOutput) -> ScanStep {
        if self.tally_only || self.winner.is_some() {
            self.mark_unused(&output);
            return ScanStep::Continue;
        }

        let address = output.address.clone();
        let comparator = self.comparator.clone().unwrap_or_default();
        let group = self
            .groups
            .entry(address.clone())
            .or_insert_with(|| SelectionGroup::new(comparator));

        if !group.insert(output) {
            debug!("Ignoring duplicate output for {}", address);
            return ScanStep::Continue;
        }

        let mut evicted = Vec::new();

        if self.policy.is_enough(group.len(), group.is_segwit(), group.total()) {
            if let Some(worst) = group.worst() {
                let without = group.total() - worst.value;
                if self.policy.is_enough(group.len() - 1, group.is_segwit(), without) {
                    evicted.extend(group.pop_worst());
                }
            }
        }

        if group.over_limit(self.max_inputs) {
            if self.policy.is_sweeping() && self.comparator.is_none() {
                while group.over_limit(self.max_inputs) {
                    evicted.extend(group.pop_worst());
                }
                trace!("Sweep reached the input cap at {} inputs", group.len());
                self.winner = Some(address.clone());
                self.tally_only = true;
            } else {
                evicted.extend(group.pop_worst());
            }
        }

        // A winner must be sufficient after the cap has been enforced
        let step = if self.comparator.is_none()
            && !self.tally_only
            && self.policy.is_enough(group.len(), group.is_segwit(), group.total())
        {
            self.winner = Some(address.clone());
            ScanStep::StopWithWinner(address)
        } else {
            ScanStep::Continue
        };

        for output in &evicted {
            self.mark_unused(output);
        }
        step
    }

    /// Resolve the selection once the scan is over
    pub fn finish(mut self) -> SelectionOutcome {
        if self.winner.is_none() && self.comparator.is_some() {
            let policy = self.policy;
            self.winner = self
                .groups
                .iter()
                .find(|(_, g)| policy.is_enough(g.len(), g.is_segwit(), g.total()))
                .map(|(address, _)| address.clone());
        }

        if let Some(winner) = self.winner.take() {
            let group = self.groups.remove(&winner);
            for other in self.groups.values() {
                self.unused_count += other.len();
                self.unused_amount += other.total();
            }
            return SelectionOutcome {
                selected: group.map(SelectionGroup::into_members).unwrap_or_default(),
                winner: Some(winner),
                unused_count: self.unused_count,
                unused_amount: self.unused_amount,
            };
        }

        self.combine_groups()
    }

    fn combine_groups(mut self) -> SelectionOutcome {
        let groups = std::mem::take(&mut self.groups);
        let mut pool = SelectionGroup::new(InputComparator::prefer_biggest());
        let mut done = false;

        for (address, group) in groups {
            if done {
                self.unused_count += group.len();
                self.unused_amount += group.total();
                continue;
            }

            trace!("Folding {} outputs from {} into the combined pool", group.len(), address);
            for output in group.into_members() {
                let outpoint = output.outpoint;
                if !pool.insert(output) {
                    debug!("Output {} is held under several addresses, keeping one copy", outpoint);
                }
            }

            while pool.over_limit(self.max_inputs) {
                match pool.pop_worst() {
                    Some(worst) => self.mark_unused(&worst),
                    None => break,
                }
            }

            // Sweeps never become enough, so every group gets folded
            if self.policy.is_enough(pool.len(), pool.is_segwit(), pool.total()) {
                done = true;
            }
        }

        SelectionOutcome {
            selected: pool.into_members(),
            winner: None,
            unused_count: self.unused_count,
            unused_amount: self.unused_amount,
        }
    }
}

/// Scan the store, classify every output and select inputs
///
/// Burned and zero-value outputs are staged for deletion on `txn`; they
/// are only removed if the caller commits it. A store error aborts the scan.
pub fn find_eligible_outputs(
    txn: &mut dyn StoreTxn,
    filter: &EligibilityFilter<'_>,
    mut selector: Selector<'_>,
    addresses: &BTreeSet<String>,
) -> Result<EligibilityReport, CoinfoldError> {
    debug!(
        "Looking for unspent outputs at tip {} across {} addresses",
        filter.tip_height(),
        if addresses.is_empty() { "all".to_string() } else { addresses.len().to_string() }
    );
    let started = Instant::now();

    let mut deletions = DeletionQueue::new();
    let mut unconfirmed_count = 0usize;
    let mut unconfirmed_amount = 0u64;

    let visited = txn
        .for_each_unspent(addresses, &mut |output: &UnspentOutput| {
            let class = filter.classify(output);
            match class {
                Eligibility::Eligible => match selector.push(output.clone()) {
                    ScanStep::Continue => ControlFlow::Continue(()),
                    ScanStep::StopWithWinner(address) => {
                        trace!("Address {} can fund the request, ending scan", address);
                        ControlFlow::Break(())
                    }
                },
                Eligibility::Unconfirmed => {
                    unconfirmed_count += 1;
                    unconfirmed_amount += output.value;
                    ControlFlow::Continue(())
                }
                Eligibility::Burned | Eligibility::ZeroValue => {
                    if !deletions.push(output.outpoint, class) {
                        trace!("Deletion queue full, leaving {} for a later pass", output.outpoint);
                    }
                    ControlFlow::Continue(())
                }
                skipped => {
                    trace!("Skipping {}: {:?}", output.outpoint, skipped);
                    ControlFlow::Continue(())
                }
            }
        })
        .map_err(|e| storage_error("scanning unspent outputs", e))?;

    info!(
        "find_eligible_outputs() completed in {:?}, visited {} outputs",
        started.elapsed(),
        visited
    );

    if !deletions.is_empty() {
        logging::log_storage(
            LogLevel::Info,
            "Deleting unspendable outputs",
            Some(json!({
                "burned": deletions.burned(),
                "zero_value": deletions.zero_value(),
                "deferred": deletions.dropped(),
            })),
        );
        deletions
            .apply(txn)
            .map_err(|e| storage_error("deleting unspendable outputs", e))?;
    }

    let outcome = selector.finish();

    logging::log_selection(
        LogLevel::Debug,
        "Eligible inputs chosen",
        Some(json!({
            "selected": outcome.selected.len(),
            "total": outcome.selected.iter().map(|o| o.value).sum::<u64>(),
            "winner": outcome.winner,
            "unused": outcome.unused_count,
            "unconfirmed": unconfirmed_count,
        })),
    );

    Ok(EligibilityReport {
        selected: outcome.selected,
        winner: outcome.winner,
        unconfirmed_count,
        unconfirmed_amount,
        unused_count: outcome.unused_count,
        unused_amount: outcome.unused_amount,
        visited,
        deleted_burned: deletions.burned(),
        deleted_zero_value: deletions.zero_value(),
    })
}
