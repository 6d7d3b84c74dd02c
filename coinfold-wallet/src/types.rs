//! Core domain types for the Coinfold wallet
//!
//! This module defines the data model shared by the eligibility filter, the
//! selector and the transaction authoring orchestrator:
//!
//! - [`UnspentOutput`]: a spendable prior output as read from the wallet store
//! - [`ChainParams`]: coinbase maturity and burn rules for the active network
//! - [`SpendRequest`]: the caller's spend request (outputs, fee policy, limits)
//! - [`SendMode`]: how far the orchestrator goes (draft, sign, broadcast)
//!
//! All amounts are integers in the smallest monetary unit.

use std::fmt;
use std::str::FromStr;

use bitcoin::{Address, Network, OutPoint, ScriptBuf, TxOut};
use serde::{Deserialize, Serialize};

use crate::config::WalletConfig;
use crate::utxo_selection::ordering::InputComparator;

/// Maximum number of inputs in a transaction whose inputs are all segwit
pub const MAX_INPUTS_PER_TX: usize = 1460;

/// Maximum number of inputs when at least one input is a legacy script
pub const MAX_INPUTS_PER_TX_LEGACY: usize = 499;

/// Number of base units in one coin
pub const SATS_PER_COIN: u64 = 100_000_000;

/// Default relay fee in base units per 1000 bytes
pub const DEFAULT_FEE_SAT_PER_KB: u64 = 1000;

/// Default coinbase maturity in blocks
pub const DEFAULT_COINBASE_MATURITY: u32 = 100;

/// Default number of blocks past maturity after which an unspent coinbase output is burned
pub const DEFAULT_BURN_WINDOW: u32 = 129_600;

/// Lookahead applied to the tip height when testing for burned outputs
pub const DEFAULT_BURN_LOOKAHEAD: u32 = 1440;

/// Unspent transaction output owned by the wallet
///
/// Immutable once read from the store. `height` is `None` while the output
/// is still unconfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    /// Source transaction id and output index
    pub outpoint: OutPoint,

    /// Owning address, used as the grouping key during selection
    pub address: String,

    /// Value in base units
    pub value: u64,

    /// Height of the containing block, `None` if unconfirmed
    pub height: Option<u32>,

    /// Whether the output was created by a coinbase transaction
    pub from_coinbase: bool,

    /// Script the spending input must satisfy
    pub pk_script: ScriptBuf,
}

impl UnspentOutput {
    /// Create an unconfirmed, non-coinbase output
    pub fn new(
        outpoint: OutPoint,
        address: impl Into<String>,
        value: u64,
        pk_script: ScriptBuf,
    ) -> Self {
        Self {
            outpoint,
            address: address.into(),
            value,
            height: None,
            from_coinbase: false,
            pk_script,
        }
    }

    /// Set the containing block height
    pub fn at_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    /// Mark this output as a coinbase output
    pub fn coinbase(mut self) -> Self {
        self.from_coinbase = true;
        self
    }

    /// Number of confirmations at the given tip height
    pub fn confirmations(&self, tip_height: u32) -> u32 {
        confirmations(self.height, tip_height)
    }

    /// Whether the spending script qualifies for the larger input cap
    pub fn is_segwit(&self) -> bool {
        self.pk_script.is_witness_program()
    }

    /// The prior output as needed for signing and validation
    pub fn prev_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.pk_script.clone(),
        }
    }

    /// Get a unique identifier for this output
    pub fn id(&self) -> String {
        format!("{}:{}", self.outpoint.txid, self.outpoint.vout)
    }
}

/// Confirmations of an output mined at `height` when the chain tip is `tip_height`
///
/// Unconfirmed outputs and outputs above the tip have zero confirmations.
pub fn confirmations(height: Option<u32>, tip_height: u32) -> u32 {
    match height {
        Some(h) if h <= tip_height => tip_height - h + 1,
        _ => 0,
    }
}

/// Whether an output at `height` has at least `min_conf` confirmations
pub fn confirmed(min_conf: u32, height: Option<u32>, tip_height: u32) -> bool {
    confirmations(height, tip_height) >= min_conf
}

/// Chain rules consulted by the eligibility filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Network used to decode addresses from scripts
    pub network: Network,
    /// Confirmations before a coinbase output may be spent
    pub coinbase_maturity: u32,
    /// Blocks past maturity after which an unspent coinbase output is burned
    pub burn_window: u32,
    /// Added to the tip height when testing for burned outputs
    pub burn_lookahead: u32,
}

impl ChainParams {
    /// Default rules for the given network
    pub fn new(network: Network) -> Self {
        Self {
            network,
            coinbase_maturity: DEFAULT_COINBASE_MATURITY,
            burn_window: DEFAULT_BURN_WINDOW,
            burn_lookahead: DEFAULT_BURN_LOOKAHEAD,
        }
    }

    /// Set the coinbase maturity
    pub fn with_coinbase_maturity(mut self, maturity: u32) -> Self {
        self.coinbase_maturity = maturity;
        self
    }

    /// Set the burn window
    pub fn with_burn_window(mut self, window: u32) -> Self {
        self.burn_window = window;
        self
    }

    /// Whether a coinbase output has matured at the given tip height
    pub fn is_mature(&self, output: &UnspentOutput, tip_height: u32) -> bool {
        confirmed(self.coinbase_maturity, output.height, tip_height)
    }

    /// Whether a coinbase output has sat unspent past the burn window
    ///
    /// Burned outputs can never be spent and are purged from the store.
    pub fn is_burned(&self, output: &UnspentOutput, tip_height: u32) -> bool {
        if !output.from_coinbase {
            return false;
        }
        let Some(height) = output.height else {
            return false;
        };
        let horizon = tip_height.saturating_add(self.burn_lookahead);
        let age = u64::from(horizon.saturating_sub(height));
        age > u64::from(self.coinbase_maturity) + u64::from(self.burn_window)
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::new(Network::Bitcoin)
    }
}

/// How far the orchestrator proceeds with an authored transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// Build a draft without signatures; nothing is persisted
    Unsigned,
    /// Sign and validate but do not commit or broadcast
    Signed,
    /// Sign, validate, commit the store transaction and watch the change address
    Broadcast,
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendMode::Unsigned => "unsigned",
            SendMode::Signed => "signed",
            SendMode::Broadcast => "broadcast",
        };
        f.write_str(name)
    }
}

impl FromStr for SendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unsigned" => Ok(SendMode::Unsigned),
            "signed" => Ok(SendMode::Signed),
            "broadcast" => Ok(SendMode::Broadcast),
            other => Err(format!("unknown send mode: {}", other)),
        }
    }
}

/// A request to pay a set of outputs from the wallet
#[derive(Debug, Clone)]
pub struct SpendRequest {
    /// Requested outputs; a zero-valued output receives everything left after fees
    pub outputs: Vec<TxOut>,
    /// Relay fee in base units per 1000 bytes
    pub fee_sat_per_kb: u64,
    /// Minimum confirmations an input must have (0 allows unconfirmed inputs)
    pub min_conf: u32,
    /// Restrict inputs to these owning addresses; empty means the whole wallet
    pub input_addresses: Vec<String>,
    /// Pinned change address
    pub change_address: Option<Address>,
    /// Ignore outputs mined below this height
    pub input_min_height: u32,
    /// Explicit input ordering; disables the biggest-first short-circuit
    pub input_comparator: Option<InputComparator>,
    /// Override of the per-transaction input cap
    pub max_inputs: Option<usize>,
    /// How far to take the authored transaction
    pub send_mode: SendMode,
}

impl SpendRequest {
    /// Create a request with default confirmation and input settings
    pub fn new(outputs: Vec<TxOut>, fee_sat_per_kb: u64) -> Self {
        Self {
            outputs,
            fee_sat_per_kb,
            min_conf: 1,
            input_addresses: Vec::new(),
            change_address: None,
            input_min_height: 0,
            input_comparator: None,
            max_inputs: None,
            send_mode: SendMode::Broadcast,
        }
    }

    /// Create a request seeded from the wallet configuration
    pub fn from_config(outputs: Vec<TxOut>, config: &WalletConfig) -> Self {
        Self {
            min_conf: config.min_conf,
            input_min_height: config.input_min_height,
            max_inputs: config.max_inputs,
            ..Self::new(outputs, config.fee_sat_per_kb)
        }
    }

    pub fn with_min_conf(mut self, min_conf: u32) -> Self {
        self.min_conf = min_conf;
        self
    }

    pub fn from_addresses(mut self, addresses: Vec<String>) -> Self {
        self.input_addresses = addresses;
        self
    }

    pub fn with_change_address(mut self, address: Address) -> Self {
        self.change_address = Some(address);
        self
    }

    pub fn with_min_height(mut self, height: u32) -> Self {
        self.input_min_height = height;
        self
    }

    pub fn with_comparator(mut self, comparator: InputComparator) -> Self {
        self.input_comparator = Some(comparator);
        self
    }

    pub fn with_max_inputs(mut self, max_inputs: usize) -> Self {
        self.max_inputs = Some(max_inputs);
        self
    }

    pub fn with_send_mode(mut self, mode: SendMode) -> Self {
        self.send_mode = mode;
        self
    }

    /// The input cap override, ignoring a zero value
    pub fn effective_max_inputs(&self) -> Option<usize> {
        self.max_inputs.filter(|n| *n > 0)
    }

    /// Human-readable description of the input address restriction
    pub fn address_scope(&self) -> String {
        if self.input_addresses.is_empty() {
            "<all>".to_string()
        } else {
            self.input_addresses.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    fn output(height: Option<u32>) -> UnspentOutput {
        UnspentOutput {
            outpoint: OutPoint::new(Txid::all_zeros(), 0),
            address: "addr".to_string(),
            value: 1_000,
            height,
            from_coinbase: true,
            pk_script: ScriptBuf::new(),
        }
    }

    #[test]
    fn confirmations_count_the_tip_block() {
        assert_eq!(confirmations(Some(100), 110), 11);
        assert_eq!(confirmations(Some(110), 110), 1);
        assert_eq!(confirmations(Some(111), 110), 0);
        assert_eq!(confirmations(None, 110), 0);
    }

    #[test]
    fn min_conf_zero_accepts_unconfirmed() {
        assert!(confirmed(0, None, 10));
        assert!(!confirmed(1, None, 10));
    }

    #[test]
    fn burned_only_after_window_past_maturity() {
        let params = ChainParams::new(Network::Regtest)
            .with_coinbase_maturity(100)
            .with_burn_window(10_000);
        let out = output(Some(50));

        assert!(params.is_burned(&out, 10_200));
        assert!(!params.is_burned(&out, 200));

        let mut regular = out.clone();
        regular.from_coinbase = false;
        assert!(!params.is_burned(&regular, 10_200));
    }

    #[test]
    fn send_mode_parses_case_insensitively() {
        assert_eq!("Broadcast".parse::<SendMode>().unwrap(), SendMode::Broadcast);
        assert_eq!(SendMode::Unsigned.to_string(), "unsigned");
        assert!("later".parse::<SendMode>().is_err());
    }

    #[test]
    fn zero_max_inputs_means_default_cap() {
        let req = SpendRequest::new(Vec::new(), 1000).with_max_inputs(0);
        assert_eq!(req.effective_max_inputs(), None);
        assert_eq!(req.address_scope(), "<all>");
    }
}
