//! Unsigned transaction authoring
//!
//! A [`TxAuthor`] turns requested outputs into an unsigned draft, pulling
//! inputs from an [`InputSource`] and a change script from a
//! [`ChangeSource`]. The default [`FeeRateAuthor`] grows its fee target as
//! inputs are added until the inputs cover the outputs plus the fee for the
//! resulting size.
//!
//! A request containing a zero-valued output is a sweep: every offered input
//! is spent and that output receives what remains after fees.

use bitcoin::absolute::LockTime;
use bitcoin::{ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use log::debug;
use rand::Rng;
use thiserror::Error;

use crate::error::CoinfoldError;
use crate::math::{self, InputCounts, MAX_STANDARD_TX_VSIZE, P2WPKH_SCRIPT_LEN};
use crate::types::UnspentOutput;

/// Reasons a set of outputs cannot be funded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImpossibleTx {
    /// The input source offered nothing
    #[error("no inputs available to fund the transaction")]
    NoInputs,

    /// The offered inputs do not cover outputs plus fee
    #[error("insufficient input value: have {available}, need {required}")]
    Insufficient { available: u64, required: u64 },

    /// The draft would exceed the standard relay size
    #[error("transaction of {vsize} vbytes exceeds the standard size limit")]
    Oversize { vsize: usize },
}

/// Failure reported by a [`TxAuthor`]
#[derive(Debug, Error)]
pub enum AuthorError {
    #[error(transparent)]
    Impossible(#[from] ImpossibleTx),

    #[error(transparent)]
    Failed(#[from] CoinfoldError),
}

/// Supplies inputs until a target value is reached
pub trait InputSource {
    /// Take inputs until their total reaches `target` or the source is empty
    ///
    /// Returns the running total and every input taken so far, in order.
    fn fetch(&mut self, target: u64) -> Result<(u64, &[UnspentOutput]), CoinfoldError>;
}

/// Input source over an already selected set, consumed front to back
#[derive(Debug, Clone, Default)]
pub struct SelectedInputs {
    pending: std::collections::VecDeque<UnspentOutput>,
    taken: Vec<UnspentOutput>,
    total: u64,
}

impl SelectedInputs {
    pub fn new(selected: Vec<UnspentOutput>) -> Self {
        Self {
            pending: selected.into(),
            taken: Vec::new(),
            total: 0,
        }
    }
}

impl InputSource for SelectedInputs {
    fn fetch(&mut self, target: u64) -> Result<(u64, &[UnspentOutput]), CoinfoldError> {
        while self.total < target {
            match self.pending.pop_front() {
                Some(next) => {
                    self.total += next.value;
                    self.taken.push(next);
                }
                None => break,
            }
        }
        Ok((self.total, &self.taken))
    }
}

/// Supplies the script for a change output
pub trait ChangeSource {
    fn change_script(&mut self) -> Result<ScriptBuf, CoinfoldError>;
}

impl<F> ChangeSource for F
where
    F: FnMut() -> Result<ScriptBuf, CoinfoldError>,
{
    fn change_script(&mut self) -> Result<ScriptBuf, CoinfoldError> {
        self()
    }
}

/// An authored transaction with the data needed to sign it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub tx: Transaction,
    /// Prior outputs, one per input
    pub prev_outputs: Vec<TxOut>,
    /// Owning address of each input, used to look up signing keys
    pub input_addresses: Vec<String>,
    pub total_input: u64,
    pub change_index: Option<usize>,
}

impl TransactionDraft {
    /// Fee paid: inputs minus outputs
    pub fn fee(&self) -> u64 {
        self.total_input
            .saturating_sub(self.tx.output.iter().map(|o| o.value).sum::<u64>())
    }

    pub fn change_output(&self) -> Option<&TxOut> {
        self.change_index.and_then(|i| self.tx.output.get(i))
    }

    /// Consensus-serialized transaction as lowercase hex
    pub fn raw_hex(&self) -> String {
        hex::encode(bitcoin::consensus::encode::serialize(&self.tx))
    }

    /// Move the change output to a random position
    pub fn randomize_change_position<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let Some(index) = self.change_index else {
            return;
        };
        let count = self.tx.output.len();
        if count < 2 {
            return;
        }
        let target = rng.random_range(0..count);
        self.tx.output.swap(index, target);
        self.change_index = Some(target);
    }
}

/// Builds unsigned drafts
pub trait TxAuthor: Send + Sync {
    /// Author a draft paying `outputs` at `fee_sat_per_kb`
    ///
    /// `allow_oversize` lifts the standard size limit for callers that set
    /// their own input cap.
    fn new_unsigned_transaction(
        &self,
        outputs: &[TxOut],
        fee_sat_per_kb: u64,
        inputs: &mut dyn InputSource,
        change: &mut dyn ChangeSource,
        allow_oversize: bool,
    ) -> Result<TransactionDraft, AuthorError>;
}

/// Author that pays a per-kilobyte relay fee on the estimated signed size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRateAuthor {
    version: i32,
    lock_time: LockTime,
    sequence: Sequence,
}

impl Default for FeeRateAuthor {
    fn default() -> Self {
        Self {
            version: 2,
            lock_time: LockTime::ZERO,
            sequence: Sequence::MAX,
        }
    }
}

impl FeeRateAuthor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sequence(mut self, sequence: Sequence) -> Self {
        self.sequence = sequence;
        self
    }

    fn assemble(&self, taken: &[UnspentOutput], outputs: Vec<TxOut>) -> TransactionDraft {
        let input = taken
            .iter()
            .map(|utxo| TxIn {
                previous_output: utxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: self.sequence,
                witness: Witness::new(),
            })
            .collect();

        TransactionDraft {
            tx: Transaction {
                version: self.version,
                lock_time: self.lock_time,
                input,
                output: outputs,
            },
            prev_outputs: taken.iter().map(UnspentOutput::prev_out).collect(),
            input_addresses: taken.iter().map(|u| u.address.clone()).collect(),
            total_input: taken.iter().map(|u| u.value).sum(),
            change_index: None,
        }
    }

    fn check_size(vsize: usize, allow_oversize: bool) -> Result<(), ImpossibleTx> {
        if !allow_oversize && vsize > MAX_STANDARD_TX_VSIZE {
            return Err(ImpossibleTx::Oversize { vsize });
        }
        Ok(())
    }

    fn sweep(
        &self,
        outputs: &[TxOut],
        sweep_index: usize,
        fee_sat_per_kb: u64,
        inputs: &mut dyn InputSource,
        allow_oversize: bool,
    ) -> Result<TransactionDraft, AuthorError> {
        let fixed = math::sum_values(outputs);
        let (total, taken) = inputs.fetch(u64::MAX)?;
        if taken.is_empty() {
            return Err(ImpossibleTx::NoInputs.into());
        }

        let counts = InputCounts::tally(taken.iter().map(|u| u.pk_script.as_script()));
        let vsize = math::estimate_vsize(&counts, math::outputs_vsize(outputs), false);
        let fee = math::fee_for_size(fee_sat_per_kb, vsize);
        let required = fixed.saturating_add(fee);

        let script_len = outputs[sweep_index].script_pubkey.len();
        let remaining = total.saturating_sub(required);
        if total <= required || math::is_dust_amount(remaining, script_len, fee_sat_per_kb) {
            return Err(ImpossibleTx::Insufficient {
                available: total,
                required: required.saturating_add(1),
            }
            .into());
        }
        Self::check_size(vsize, allow_oversize)?;

        let mut filled = outputs.to_vec();
        filled[sweep_index].value = remaining;
        debug!("Sweeping {} inputs, fee {} for ~{} vbytes", taken.len(), fee, vsize);
        Ok(self.assemble(taken, filled))
    }
}

impl TxAuthor for FeeRateAuthor {
    fn new_unsigned_transaction(
        &self,
        outputs: &[TxOut],
        fee_sat_per_kb: u64,
        inputs: &mut dyn InputSource,
        change: &mut dyn ChangeSource,
        allow_oversize: bool,
    ) -> Result<TransactionDraft, AuthorError> {
        if let Some(index) = outputs.iter().position(|o| o.value == 0) {
            return self.sweep(outputs, index, fee_sat_per_kb, inputs, allow_oversize);
        }

        let target = math::sum_values(outputs);
        let outputs_vsize = math::outputs_vsize(outputs);
        let mut target_fee = math::fee_for_size(
            fee_sat_per_kb,
            math::estimate_vsize(&InputCounts::default(), outputs_vsize, true),
        );

        loop {
            let required = target.saturating_add(target_fee);
            let (total, taken) = inputs.fetch(required)?;
            if taken.is_empty() {
                return Err(ImpossibleTx::NoInputs.into());
            }
            if total < required {
                return Err(ImpossibleTx::Insufficient {
                    available: total,
                    required,
                }
                .into());
            }

            let counts = InputCounts::tally(taken.iter().map(|u| u.pk_script.as_script()));
            let vsize = math::estimate_vsize(&counts, outputs_vsize, true);
            let max_fee = math::fee_for_size(fee_sat_per_kb, vsize);
            if total - target < max_fee {
                target_fee = max_fee;
                continue;
            }
            Self::check_size(vsize, allow_oversize)?;

            let change_amount = total - target - max_fee;
            let mut draft = self.assemble(taken, outputs.to_vec());
            if change_amount > 0
                && !math::is_dust_amount(change_amount, P2WPKH_SCRIPT_LEN, fee_sat_per_kb)
            {
                let script_pubkey = change.change_script()?;
                draft.change_index = Some(draft.tx.output.len());
                draft.tx.output.push(TxOut {
                    value: change_amount,
                    script_pubkey,
                });
            }

            debug!(
                "Authored draft with {} inputs, fee {} for ~{} vbytes",
                draft.tx.input.len(),
                draft.fee(),
                vsize
            );
            return Ok(draft);
        }
    }
}
