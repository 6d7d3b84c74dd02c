//! Size and fee arithmetic for transaction authoring
//!
//! Sizes are virtual bytes of the signed transaction. Inputs are estimated
//! from their prior output script, outputs from their actual script length.
//! Fees are expressed per 1000 bytes and computed with integer arithmetic.
//!
//! Example:
//! ```
//! use coinfold_wallet::math::{fee_for_size, InputKind};
//!
//! assert_eq!(InputKind::P2wpkh.vsize(), 68);
//! assert_eq!(fee_for_size(1000, 250), 250);
//! ```

use bitcoin::{Script, TxOut};

/// Fixed transaction overhead: version, lock time, counts and the segwit marker
pub const TX_OVERHEAD_VBYTES: usize = 11;

/// Size of a P2WPKH output, used for the change output estimate
pub const P2WPKH_OUTPUT_VBYTES: usize = 31;

/// Length of a P2WPKH output script
pub const P2WPKH_SCRIPT_LEN: usize = 22;

/// Largest transaction relayed by standard nodes
pub const MAX_STANDARD_TX_VSIZE: usize = 100_000;

/// Maximum number of base units that can ever exist
pub const MAX_MONEY: u64 = 21_000_000 * crate::types::SATS_PER_COIN;

/// Spending script template of an input, by the prior output it consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Legacy pay-to-pubkey-hash
    P2pkh,
    /// P2WPKH nested in P2SH
    NestedP2wpkh,
    /// Native segwit v0 pay-to-witness-pubkey-hash
    P2wpkh,
}

impl InputKind {
    /// Classify an input by the script of the output it spends
    ///
    /// Unknown templates are treated as P2PKH, the most expensive estimate.
    pub fn from_script(script: &Script) -> Self {
        if script.is_witness_program() {
            InputKind::P2wpkh
        } else if script.is_p2sh() {
            InputKind::NestedP2wpkh
        } else {
            InputKind::P2pkh
        }
    }

    /// Estimated virtual size of a signed input
    pub fn vsize(&self) -> usize {
        match self {
            InputKind::P2pkh => 148,
            InputKind::NestedP2wpkh => 91,
            InputKind::P2wpkh => 68,
        }
    }
}

/// Number of inputs of each kind in a draft
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputCounts {
    pub p2pkh: usize,
    pub nested_p2wpkh: usize,
    pub p2wpkh: usize,
}

impl InputCounts {
    /// `count` inputs of a single kind
    pub fn uniform(kind: InputKind, count: usize) -> Self {
        let mut counts = Self::default();
        counts.add(kind, count);
        counts
    }

    /// Tally the inputs spending the given prior output scripts
    pub fn tally<'a>(scripts: impl IntoIterator<Item = &'a Script>) -> Self {
        let mut counts = Self::default();
        for script in scripts {
            counts.add(InputKind::from_script(script), 1);
        }
        counts
    }

    pub fn add(&mut self, kind: InputKind, count: usize) {
        match kind {
            InputKind::P2pkh => self.p2pkh += count,
            InputKind::NestedP2wpkh => self.nested_p2wpkh += count,
            InputKind::P2wpkh => self.p2wpkh += count,
        }
    }

    pub fn total(&self) -> usize {
        self.p2pkh + self.nested_p2wpkh + self.p2wpkh
    }

    /// Combined estimated size of all inputs
    pub fn vsize(&self) -> usize {
        self.p2pkh * InputKind::P2pkh.vsize()
            + self.nested_p2wpkh * InputKind::NestedP2wpkh.vsize()
            + self.p2wpkh * InputKind::P2wpkh.vsize()
    }
}

/// Serialized length of a compact-size integer
pub fn varint_len(n: usize) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Serialized size of an output with a script of the given length
pub fn output_vsize(script_len: usize) -> usize {
    8 + varint_len(script_len) + script_len
}

/// Combined serialized size of a set of outputs
pub fn outputs_vsize(outputs: &[TxOut]) -> usize {
    outputs
        .iter()
        .map(|o| output_vsize(o.script_pubkey.len()))
        .sum()
}

/// Estimate the signed size of a transaction
///
/// # Arguments
/// * `inputs` - Inputs by script kind
/// * `outputs_vsize` - Combined size of the requested outputs
/// * `add_change` - Whether to reserve room for a P2WPKH change output
pub fn estimate_vsize(inputs: &InputCounts, outputs_vsize: usize, add_change: bool) -> usize {
    let change = if add_change { P2WPKH_OUTPUT_VBYTES } else { 0 };
    TX_OVERHEAD_VBYTES + inputs.vsize() + outputs_vsize + change
}

/// Fee for a transaction of `vsize` bytes at `fee_sat_per_kb`
///
/// A positive fee rate never yields a zero fee. The result is capped at
/// [`MAX_MONEY`].
pub fn fee_for_size(fee_sat_per_kb: u64, vsize: usize) -> u64 {
    let fee = fee_sat_per_kb.saturating_mul(vsize as u64) / 1000;
    let fee = if fee == 0 && fee_sat_per_kb > 0 {
        fee_sat_per_kb
    } else {
        fee
    };
    fee.min(MAX_MONEY)
}

/// Determines if an output amount is dust at the given relay fee
///
/// An output is dust when spending it would cost more than a third of its
/// value, assuming a P2PKH input of 148 bytes.
pub fn is_dust_amount(amount: u64, script_len: usize, fee_sat_per_kb: u64) -> bool {
    let total_size = (output_vsize(script_len) + InputKind::P2pkh.vsize()) as u64;
    amount.saturating_mul(1000) / (3 * total_size) < fee_sat_per_kb
}

/// Sum of output values, saturating at `u64::MAX`
pub fn sum_values(outputs: &[TxOut]) -> u64 {
    outputs.iter().fold(0u64, |acc, o| acc.saturating_add(o.value))
}
