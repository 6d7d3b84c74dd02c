//! "Is this enough" policies consulted by the selector

use bitcoin::TxOut;

use crate::math::{self, InputCounts, InputKind};

/// Decides whether a candidate set can fund a request
pub trait SpendPolicy {
    /// Whether `count` inputs worth `total` cover the target plus fees
    ///
    /// `segwit` is true when every candidate has a segwit script.
    fn is_enough(&self, count: usize, segwit: bool, total: u64) -> bool;

    /// Whether the request spends everything it is offered
    fn is_sweeping(&self) -> bool;
}

/// Target of the requested outputs plus the relay fee for the estimated size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRatePolicy {
    target: u64,
    outputs_vsize: usize,
    fee_sat_per_kb: u64,
    sweeping: bool,
}

impl FeeRatePolicy {
    /// A zero-valued output marks the request as a sweep
    pub fn new(outputs: &[TxOut], fee_sat_per_kb: u64) -> Self {
        Self {
            target: math::sum_values(outputs),
            outputs_vsize: math::outputs_vsize(outputs),
            fee_sat_per_kb,
            sweeping: outputs.iter().any(|o| o.value == 0),
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Fee estimate for `count` inputs of one kind, with a change output
    pub fn estimated_fee(&self, count: usize, segwit: bool) -> u64 {
        let kind = if segwit {
            InputKind::P2wpkh
        } else {
            InputKind::P2pkh
        };
        let vsize = math::estimate_vsize(&InputCounts::uniform(kind, count), self.outputs_vsize, true);
        math::fee_for_size(self.fee_sat_per_kb, vsize)
    }
}

impl SpendPolicy for FeeRatePolicy {
    fn is_enough(&self, count: usize, segwit: bool, total: u64) -> bool {
        if self.sweeping {
            return false;
        }
        total >= self.target.saturating_add(self.estimated_fee(count, segwit))
    }

    fn is_sweeping(&self) -> bool {
        self.sweeping
    }
}

/// Fixed target that ignores fees
///
/// Useful when fees are settled elsewhere or when exercising the selector
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTarget {
    target: u64,
    sweeping: bool,
}

impl FixedTarget {
    pub fn new(target: u64) -> Self {
        Self {
            target,
            sweeping: false,
        }
    }

    pub fn sweep() -> Self {
        Self {
            target: 0,
            sweeping: true,
        }
    }
}

impl SpendPolicy for FixedTarget {
    fn is_enough(&self, _count: usize, _segwit: bool, total: u64) -> bool {
        !self.sweeping && total >= self.target
    }

    fn is_sweeping(&self) -> bool {
        self.sweeping
    }
}
