//! Transaction authoring orchestrator
//!
//! [`TransactionCreator::create_transaction`] runs one spend attempt:
//!
//! 1. open a read-write store transaction and scan for eligible inputs
//! 2. author an unsigned draft from the selected inputs
//! 3. shuffle the change output position
//! 4. stop here for [`SendMode::Unsigned`], leaving the store untouched
//! 5. otherwise sign every input and replay it through the validator
//! 6. for [`SendMode::Broadcast`], commit the store transaction and watch
//!    the change address
//!
//! Any error ends the attempt. The store transaction is dropped without
//! committing, so deletions staged during the scan are rolled back. Callers
//! that want to retry re-run the whole attempt.

use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, OutPoint, ScriptBuf};
use log::{debug, error, info, trace, warn};
use serde_json::json;

use crate::error::{storage_error, CoinfoldError, CoinfoldResult, FundsScope};
use crate::logging::{self, LogLevel};
use crate::signing::{sign_draft, validate_draft, ScriptValidator, SecretSource, StandardValidator};
use crate::store::{AddressWatcher, ChainTip, LockSet, NoopWatcher, UnspentStore};
use crate::txauthor::{AuthorError, FeeRateAuthor, ImpossibleTx, SelectedInputs, TransactionDraft, TxAuthor};
use crate::types::{ChainParams, SendMode, SpendRequest, UnspentOutput};
use crate::utxo_selection::{find_eligible_outputs, EligibilityFilter, EligibilityReport, FeeRatePolicy, Selector};

/// Parse an address string and check it belongs to `network`
pub fn parse_address(address: &str, network: Network) -> CoinfoldResult<Address> {
    Address::<NetworkUnchecked>::from_str(address)?
        .require_network(network)
        .map_err(CoinfoldError::from)
}

/// Pick the change address for a draft
///
/// A pinned address wins. Otherwise the last selected input whose script
/// decodes to a single address is reused.
pub fn resolve_change_address(
    pinned: Option<&Address>,
    selected: &[UnspentOutput],
    network: Network,
) -> CoinfoldResult<Address> {
    if let Some(address) = pinned {
        return Ok(address.clone());
    }
    selected
        .iter()
        .filter_map(|o| Address::from_script(&o.pk_script, network).ok())
        .last()
        .ok_or_else(|| {
            CoinfoldError::AddressResolution("unable to find a qualifying change address".to_string())
        })
}

/// Map an impossible-transaction signal onto the most useful selection error
pub fn classify_impossible(
    report: &EligibilityReport,
    request: &SpendRequest,
    cause: ImpossibleTx,
) -> CoinfoldError {
    if report.unused_count > 0 {
        CoinfoldError::TooManyInputs {
            count: report.unused_count,
            amount: report.unused_amount,
            source: cause,
        }
    } else if report.unconfirmed_count > 0 {
        CoinfoldError::UnconfirmedCoins {
            count: report.unconfirmed_count,
            amount: report.unconfirmed_amount,
            source: cause,
        }
    } else {
        let scope = if request.input_addresses.is_empty() {
            FundsScope::Wallet
        } else {
            FundsScope::Addresses(request.input_addresses.clone())
        };
        CoinfoldError::InsufficientFunds {
            scope,
            source: cause,
        }
    }
}

/// Owns the collaborators needed to author, sign and commit spends
pub struct TransactionCreator {
    store: Arc<dyn UnspentStore>,
    chain: Arc<dyn ChainTip>,
    params: ChainParams,
    locks: Arc<dyn LockSet>,
    author: Arc<dyn TxAuthor>,
    secrets: Option<Arc<dyn SecretSource>>,
    validator: Arc<dyn ScriptValidator>,
    watcher: Arc<dyn AddressWatcher>,
}

impl TransactionCreator {
    /// Create an orchestrator with no locks, the fee-rate author, the
    /// standard validator and no signing keys
    pub fn new(store: Arc<dyn UnspentStore>, chain: Arc<dyn ChainTip>, params: ChainParams) -> Self {
        Self {
            store,
            chain,
            params,
            locks: Arc::new(HashSet::<OutPoint>::new()),
            author: Arc::new(FeeRateAuthor::new()),
            secrets: None,
            validator: Arc::new(StandardValidator),
            watcher: Arc::new(NoopWatcher),
        }
    }

    pub fn with_locks(mut self, locks: Arc<dyn LockSet>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_author(mut self, author: Arc<dyn TxAuthor>) -> Self {
        self.author = author;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn ScriptValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn AddressWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Run one spend attempt
    pub fn create_transaction(&self, request: &SpendRequest) -> CoinfoldResult<TransactionDraft> {
        if request.outputs.is_empty() {
            return Err(CoinfoldError::Config("no outputs requested".to_string()));
        }

        let tip = self.chain.best_height()?;
        let started = Instant::now();
        info!(
            "Creating {} transaction with {} outputs at tip {}",
            request.send_mode,
            request.outputs.len(),
            tip
        );

        let mut txn = self
            .store
            .begin_rw()
            .map_err(|e| storage_error("opening store transaction", e))?;

        let policy = FeeRatePolicy::new(&request.outputs, request.fee_sat_per_kb);
        let filter = EligibilityFilter::new(self.params, tip, self.locks.as_ref())
            .with_min_conf(request.min_conf)
            .with_min_height(request.input_min_height);
        let selector = Selector::new(&policy)
            .with_comparator(request.input_comparator.clone())
            .with_max_inputs(request.effective_max_inputs());
        let addresses: BTreeSet<String> = request.input_addresses.iter().cloned().collect();

        let report = find_eligible_outputs(txn.as_mut(), &filter, selector, &addresses)?;
        debug!(
            "Eligible set for {}: {} inputs worth {}",
            request.address_scope(),
            report.selected.len(),
            report.selected_total()
        );

        let network = self.params.network;
        let pinned = request.change_address.as_ref();
        let selected = &report.selected;
        let mut change = || -> CoinfoldResult<ScriptBuf> {
            Ok(resolve_change_address(pinned, selected, network)?.script_pubkey())
        };
        let mut inputs = SelectedInputs::new(report.selected.clone());

        let authored = self.author.new_unsigned_transaction(
            &request.outputs,
            request.fee_sat_per_kb,
            &mut inputs,
            &mut change,
            request.effective_max_inputs().is_some(),
        );
        let mut draft = match authored {
            Ok(draft) => draft,
            Err(AuthorError::Impossible(cause)) => {
                let err = classify_impossible(&report, request, cause);
                warn!("Unable to fund transaction: {}", err);
                return Err(err);
            }
            Err(AuthorError::Failed(err)) => return Err(err),
        };

        if draft.change_index.is_some() {
            draft.randomize_change_position(&mut rand::rng());
        }

        logging::log_transaction(
            LogLevel::Info,
            "Authored draft",
            Some(json!({
                "inputs": draft.tx.input.len(),
                "outputs": draft.tx.output.len(),
                "fee": draft.fee(),
                "change_index": draft.change_index,
            })),
        );

        if request.send_mode == SendMode::Unsigned {
            debug!("Returning unsigned draft after {:?}", started.elapsed());
            return Ok(draft);
        }

        let secrets = self
            .secrets
            .as_ref()
            .ok_or_else(|| CoinfoldError::Signing("no secret source configured".to_string()))?;
        sign_draft(&mut draft, secrets.as_ref())?;

        if let Err(err) = validate_draft(&draft, self.validator.as_ref()) {
            error!("Signed transaction failed validation: {}", err);
            return Err(err);
        }

        if request.send_mode == SendMode::Signed {
            debug!("Returning signed draft after {:?}", started.elapsed());
            return Ok(draft);
        }

        txn.commit()
            .map_err(|e| storage_error("committing spend", e))?;

        if let Some(output) = draft.change_output() {
            let address = Address::from_script(&output.script_pubkey, network)
                .map_err(|e| CoinfoldError::AddressResolution(e.to_string()))?;
            self.watcher.watch_addresses(&[address])?;
        }

        info!(
            "Transaction {} ready for broadcast after {:?}",
            draft.tx.txid(),
            started.elapsed()
        );
        trace!("Raw transaction: {}", draft.raw_hex());
        Ok(draft)
    }
}
