//! Input signing and signed-input validation
//!
//! Supported templates are P2PKH, P2WPKH and P2WPKH nested in P2SH, all
//! signed with `SIGHASH_ALL`. Key material is looked up per input by its
//! owning address through a [`SecretSource`].

use std::collections::HashMap;

use bitcoin::ecdsa::Signature as EcdsaSignature;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::secp256k1::{Message, Secp256k1, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Address, Network, PrivateKey, PublicKey, Script, ScriptBuf, Transaction, TxOut, Witness};
use log::{debug, trace};

use crate::error::{CoinfoldError, CoinfoldResult};
use crate::txauthor::TransactionDraft;

/// Resolves owning addresses to signing material
pub trait SecretSource: Send + Sync {
    /// Private key controlling `address`
    fn key_for(&self, address: &str) -> CoinfoldResult<PrivateKey>;

    /// Redeem script for a P2SH `address`
    fn redeem_script_for(&self, address: &str) -> CoinfoldResult<ScriptBuf>;
}

/// In-memory key store indexed by address
#[derive(Default)]
pub struct Keyring {
    keys: HashMap<String, PrivateKey>,
    scripts: HashMap<String, ScriptBuf>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key under its P2PKH address and, for compressed keys, its
    /// P2WPKH and P2SH-P2WPKH addresses
    ///
    /// Returns the registered addresses.
    pub fn add_key(&mut self, key: PrivateKey, network: Network) -> CoinfoldResult<Vec<Address>> {
        let secp = Secp256k1::signing_only();
        let pubkey = key.public_key(&secp);

        let mut addresses = vec![Address::p2pkh(&pubkey, network)];
        if key.compressed {
            addresses.push(Address::p2wpkh(&pubkey, network)?);
            let nested = Address::p2shwpkh(&pubkey, network)?;
            self.scripts
                .insert(nested.to_string(), witness_program_for(&pubkey)?);
            addresses.push(nested);
        }

        for address in &addresses {
            self.keys.insert(address.to_string(), key);
        }
        Ok(addresses)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("addresses", &self.keys.len())
            .finish()
    }
}

impl SecretSource for Keyring {
    fn key_for(&self, address: &str) -> CoinfoldResult<PrivateKey> {
        self.keys
            .get(address)
            .copied()
            .ok_or_else(|| CoinfoldError::Signing(format!("no key for address {}", address)))
    }

    fn redeem_script_for(&self, address: &str) -> CoinfoldResult<ScriptBuf> {
        self.scripts
            .get(address)
            .cloned()
            .ok_or_else(|| CoinfoldError::Signing(format!("no redeem script for address {}", address)))
    }
}

fn witness_program_for(pubkey: &PublicKey) -> CoinfoldResult<ScriptBuf> {
    let hash = pubkey
        .wpubkey_hash()
        .ok_or_else(|| CoinfoldError::Signing("uncompressed key cannot sign segwit inputs".into()))?;
    Ok(ScriptBuf::new_v0_p2wpkh(&hash))
}

fn segwit_message(
    cache: &mut SighashCache<&Transaction>,
    index: usize,
    pubkey: &PublicKey,
    value: u64,
    sighash_type: EcdsaSighashType,
) -> CoinfoldResult<Message> {
    let script_code = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());
    let sighash = cache.segwit_signature_hash(index, &script_code, value, sighash_type)?;
    Ok(Message::from_slice(&sighash.to_byte_array())?)
}

fn legacy_message(
    cache: &SighashCache<&Transaction>,
    index: usize,
    script_pubkey: &Script,
    sighash_type: EcdsaSighashType,
) -> CoinfoldResult<Message> {
    let sighash = cache.legacy_signature_hash(index, script_pubkey, sighash_type.to_u32())?;
    Ok(Message::from_slice(&sighash.to_byte_array())?)
}

fn sign_message<C: Signing>(secp: &Secp256k1<C>, msg: &Message, key: &PrivateKey) -> Vec<u8> {
    EcdsaSignature::sighash_all(secp.sign_ecdsa(msg, &key.inner)).to_vec()
}

/// Sign every input of a draft in place
pub fn sign_draft(draft: &mut TransactionDraft, secrets: &dyn SecretSource) -> CoinfoldResult<()> {
    if draft.prev_outputs.len() != draft.tx.input.len()
        || draft.input_addresses.len() != draft.tx.input.len()
    {
        return Err(CoinfoldError::Signing(
            "draft inputs and prior outputs are out of step".to_string(),
        ));
    }

    let secp = Secp256k1::new();
    let unsigned = draft.tx.clone();
    let mut cache = SighashCache::new(&unsigned);

    for index in 0..unsigned.input.len() {
        let prev = &draft.prev_outputs[index];
        let address = &draft.input_addresses[index];
        let key = secrets.key_for(address)?;
        let pubkey = key.public_key(&secp);
        let script = prev.script_pubkey.as_script();

        if script.is_v0_p2wpkh() {
            let msg = segwit_message(&mut cache, index, &pubkey, prev.value, EcdsaSighashType::All)?;
            let sig = sign_message(&secp, &msg, &key);
            draft.tx.input[index].witness = Witness::from_slice(&[sig, pubkey.to_bytes()]);
        } else if script.is_p2sh() {
            let redeem = secrets.redeem_script_for(address)?;
            if redeem != witness_program_for(&pubkey)? {
                return Err(CoinfoldError::Signing(format!(
                    "unsupported redeem script for input {}",
                    index
                )));
            }
            let msg = segwit_message(&mut cache, index, &pubkey, prev.value, EcdsaSighashType::All)?;
            let sig = sign_message(&secp, &msg, &key);
            let push = PushBytesBuf::try_from(redeem.to_bytes())
                .map_err(|e| CoinfoldError::Signing(e.to_string()))?;
            draft.tx.input[index].script_sig = Builder::new().push_slice(push).into_script();
            draft.tx.input[index].witness = Witness::from_slice(&[sig, pubkey.to_bytes()]);
        } else if script.is_p2pkh() {
            let msg = legacy_message(&cache, index, script, EcdsaSighashType::All)?;
            let sig = sign_message(&secp, &msg, &key);
            let push = PushBytesBuf::try_from(sig).map_err(|e| CoinfoldError::Signing(e.to_string()))?;
            draft.tx.input[index].script_sig =
                Builder::new().push_slice(push).push_key(&pubkey).into_script();
        } else {
            return Err(CoinfoldError::Signing(format!(
                "unsupported script template for input {}",
                index
            )));
        }
        trace!("Signed input {}", index);
    }

    debug!("Signed {} inputs", unsigned.input.len());
    Ok(())
}

/// Replays a signed input against the output it spends
pub trait ScriptValidator: Send + Sync {
    /// `Err` carries a diagnostic describing why the input is invalid
    fn validate_input(&self, tx: &Transaction, index: usize, prev_out: &TxOut) -> Result<(), String>;
}

/// Validator for the templates produced by [`sign_draft`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardValidator;

fn parse_signature(bytes: &[u8]) -> Result<EcdsaSignature, String> {
    EcdsaSignature::from_slice(bytes).map_err(|e| format!("malformed signature: {}", e))
}

fn parse_pubkey(bytes: &[u8]) -> Result<PublicKey, String> {
    PublicKey::from_slice(bytes).map_err(|e| format!("malformed public key: {}", e))
}

fn script_pushes(script: &Script) -> Result<Vec<Vec<u8>>, String> {
    script
        .instructions()
        .map(|ins| match ins {
            Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
            Ok(Instruction::Op(op)) => Err(format!("unexpected opcode {:?} in script_sig", op)),
            Err(e) => Err(format!("unparsable script_sig: {}", e)),
        })
        .collect()
}

fn witness_pair(witness: &Witness) -> Result<(EcdsaSignature, PublicKey), String> {
    let items: Vec<&[u8]> = witness.iter().collect();
    match items.as_slice() {
        [sig, key] => Ok((parse_signature(sig)?, parse_pubkey(key)?)),
        _ => Err(format!("expected 2 witness items, found {}", items.len())),
    }
}

fn verify<C: Verification>(
    secp: &Secp256k1<C>,
    msg: &Message,
    sig: &EcdsaSignature,
    pubkey: &PublicKey,
) -> Result<(), String> {
    secp.verify_ecdsa(msg, &sig.sig, &pubkey.inner)
        .map_err(|e| format!("signature check failed: {}", e))
}

impl StandardValidator {
    fn validate_segwit(
        &self,
        tx: &Transaction,
        index: usize,
        prev_out: &TxOut,
        program: &Script,
    ) -> Result<(), String> {
        let (sig, pubkey) = witness_pair(&tx.input[index].witness)?;
        let expected = witness_program_for(&pubkey).map_err(|e| e.to_string())?;
        if expected.as_script() != program {
            return Err("witness key does not match the spent script".to_string());
        }
        let mut cache = SighashCache::new(tx);
        let msg = segwit_message(&mut cache, index, &pubkey, prev_out.value, sig.hash_ty)
            .map_err(|e| e.to_string())?;
        verify(&Secp256k1::verification_only(), &msg, &sig, &pubkey)
    }
}

impl ScriptValidator for StandardValidator {
    fn validate_input(&self, tx: &Transaction, index: usize, prev_out: &TxOut) -> Result<(), String> {
        let input = tx
            .input
            .get(index)
            .ok_or_else(|| format!("input {} out of range", index))?;
        let script = prev_out.script_pubkey.as_script();

        if script.is_v0_p2wpkh() {
            if !input.script_sig.is_empty() {
                return Err("native segwit input carries a script_sig".to_string());
            }
            self.validate_segwit(tx, index, prev_out, script)
        } else if script.is_p2sh() {
            let pushes = script_pushes(&input.script_sig)?;
            let [redeem] = pushes.as_slice() else {
                return Err("expected a single redeem script push".to_string());
            };
            let redeem = ScriptBuf::from_bytes(redeem.clone());
            if ScriptBuf::new_p2sh(&redeem.script_hash()) != prev_out.script_pubkey {
                return Err("redeem script does not match the spent script hash".to_string());
            }
            if !redeem.is_v0_p2wpkh() {
                return Err("unsupported redeem script".to_string());
            }
            self.validate_segwit(tx, index, prev_out, &redeem)
        } else if script.is_p2pkh() {
            if !input.witness.is_empty() {
                return Err("legacy input carries a witness".to_string());
            }
            let pushes = script_pushes(&input.script_sig)?;
            let [sig, key] = pushes.as_slice() else {
                return Err("expected signature and key pushes".to_string());
            };
            let sig = parse_signature(sig)?;
            let pubkey = parse_pubkey(key)?;
            if ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()) != prev_out.script_pubkey {
                return Err("public key does not match the spent script".to_string());
            }
            let cache = SighashCache::new(tx);
            let msg = legacy_message(&cache, index, script, sig.hash_ty).map_err(|e| e.to_string())?;
            verify(&Secp256k1::verification_only(), &msg, &sig, &pubkey)
        } else {
            Err("unsupported script template".to_string())
        }
    }
}

/// Validate every signed input of a draft
pub fn validate_draft(draft: &TransactionDraft, validator: &dyn ScriptValidator) -> CoinfoldResult<()> {
    if draft.prev_outputs.len() != draft.tx.input.len() {
        return Err(CoinfoldError::Validation {
            index: draft.prev_outputs.len().min(draft.tx.input.len()),
            context: "missing prior output".to_string(),
        });
    }
    for (index, prev_out) in draft.prev_outputs.iter().enumerate() {
        validator
            .validate_input(&draft.tx, index, prev_out)
            .map_err(|context| CoinfoldError::Validation { index, context })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txauthor::{FeeRateAuthor, SelectedInputs, TxAuthor};
    use crate::types::UnspentOutput;
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::{OutPoint, Txid};

    fn key(byte: u8) -> PrivateKey {
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        PrivateKey::new(secret, Network::Regtest)
    }

    fn draft_spending(addresses: &[Address]) -> TransactionDraft {
        let utxos: Vec<UnspentOutput> = addresses
            .iter()
            .enumerate()
            .map(|(i, a)| {
                UnspentOutput::new(
                    OutPoint::new(Txid::from_byte_array([i as u8 + 1; 32]), 0),
                    a.to_string(),
                    100_000,
                    a.script_pubkey(),
                )
                .at_height(1)
            })
            .collect();
        let pay = TxOut {
            value: 50_000,
            script_pubkey: addresses[0].script_pubkey(),
        };
        let change_script = addresses[0].script_pubkey();
        let mut change = move || -> CoinfoldResult<ScriptBuf> { Ok(change_script.clone()) };
        FeeRateAuthor::new()
            .new_unsigned_transaction(
                &[pay],
                1000,
                &mut SelectedInputs::new(utxos),
                &mut change,
                false,
            )
            .unwrap()
    }

    #[test]
    fn signs_and_validates_all_templates() {
        let mut keyring = Keyring::new();
        let addresses = keyring.add_key(key(7), Network::Regtest).unwrap();
        assert_eq!(addresses.len(), 3);

        for address in &addresses {
            let mut single = draft_spending(std::slice::from_ref(address));
            sign_draft(&mut single, &keyring).unwrap();
            validate_draft(&single, &StandardValidator).unwrap();
        }
    }

    #[test]
    fn tampered_output_fails_validation() {
        let mut keyring = Keyring::new();
        let addresses = keyring.add_key(key(3), Network::Regtest).unwrap();
        let mut draft = draft_spending(&addresses[1..2]);
        sign_draft(&mut draft, &keyring).unwrap();

        draft.tx.output[0].value -= 1;
        let err = validate_draft(&draft, &StandardValidator).unwrap_err();
        assert!(matches!(err, CoinfoldError::Validation { index: 0, .. }));
    }

    #[test]
    fn unknown_address_cannot_be_signed() {
        let mut keyring = Keyring::new();
        let mut other = Keyring::new();
        let addresses = other.add_key(key(5), Network::Regtest).unwrap();
        keyring.add_key(key(6), Network::Regtest).unwrap();

        let mut draft = draft_spending(&addresses[..1]);
        assert!(matches!(
            sign_draft(&mut draft, &keyring),
            Err(CoinfoldError::Signing(_))
        ));
    }

    #[test]
    fn unsigned_input_fails_validation() {
        let keyring_addresses = Keyring::new()
            .add_key(key(9), Network::Regtest)
            .unwrap();
        let draft = draft_spending(&keyring_addresses[1..2]);
        assert!(validate_draft(&draft, &StandardValidator).is_err());
    }
}
