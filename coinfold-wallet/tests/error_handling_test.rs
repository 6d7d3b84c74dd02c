use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, Txid};
use coinfold_wallet::error::{format_coins, storage_error};
use coinfold_wallet::{CoinfoldError, ErrorCategory, FundsScope, ImpossibleTx, StoreError};
use std::error::Error as StdError;

fn shortfall() -> ImpossibleTx {
    ImpossibleTx::Insufficient {
        available: 1_000,
        required: 5_000,
    }
}

#[test]
fn test_error_categories() {
    let cases = vec![
        (
            CoinfoldError::InsufficientFunds {
                scope: FundsScope::Wallet,
                source: shortfall(),
            },
            ErrorCategory::Funds,
        ),
        (
            storage_error("scanning", StoreError::Backend("io".into())),
            ErrorCategory::Storage,
        ),
        (
            CoinfoldError::Validation {
                index: 2,
                context: "bad sig".into(),
            },
            ErrorCategory::Validation,
        ),
        (CoinfoldError::AddressResolution("none".into()), ErrorCategory::Address),
        (CoinfoldError::Signing("no key".into()), ErrorCategory::Signing),
        (CoinfoldError::Build("author".into()), ErrorCategory::Build),
        (CoinfoldError::Chain("offline".into()), ErrorCategory::Chain),
        (CoinfoldError::Config("empty".into()), ErrorCategory::Config),
    ];

    for (error, category) in cases {
        assert_eq!(error.category(), category);
        assert_eq!(error.category().to_string(), category.as_str());
    }
}

#[test]
fn test_funds_errors_keep_their_cause() {
    let err = CoinfoldError::TooManyInputs {
        count: 101,
        amount: 101_000,
        source: shortfall(),
    };
    let cause = err.source().expect("cause attached");
    assert!(cause.to_string().contains("need 5000"));
    assert!(err.to_string().contains("101 outputs"));
    assert!(err.user_message().contains("0.00101000 BTC"));
    assert!(!err.is_retryable());
}

#[test]
fn test_unconfirmed_coins_are_retryable() {
    let err = CoinfoldError::UnconfirmedCoins {
        count: 4,
        amount: 2_000_000,
        source: ImpossibleTx::NoInputs,
    };
    assert!(err.is_retryable());
    assert!(err.user_message().contains("0.02000000 BTC in 4 outputs"));
}

#[test]
fn test_address_scope_messages() {
    let err = CoinfoldError::InsufficientFunds {
        scope: FundsScope::Addresses(vec!["addr-a".into(), "addr-b".into()]),
        source: ImpossibleTx::NoInputs,
    };
    assert_eq!(
        err.user_message(),
        "Insufficient funds: address(es) [addr-a, addr-b] do not have enough balance"
    );
}

#[test]
fn test_signing_messages_hide_details() {
    let err = CoinfoldError::Signing("no key for address secret-detail".into());
    assert!(!err.user_message().contains("secret-detail"));
    assert!(err.to_string().contains("secret-detail"));
}

#[test]
fn test_storage_errors_chain_to_the_store() {
    let missing = OutPoint::new(Txid::all_zeros(), 3);
    let err = storage_error("deleting unspendable outputs", StoreError::NotFound(missing));
    assert!(err.to_string().contains("deleting unspendable outputs"));
    let cause = err.source().expect("store error attached");
    assert!(cause.to_string().contains(&missing.to_string()));
}

#[test]
fn test_coin_formatting() {
    assert_eq!(format_coins(0), "0.00000000 BTC");
    assert_eq!(format_coins(1), "0.00000001 BTC");
    assert_eq!(format_coins(123_456_789), "1.23456789 BTC");
}
