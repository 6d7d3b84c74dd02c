//! Property-based tests for selection groups and the selector
//!
//! These tests use quickcheck to check the bookkeeping invariants that
//! must hold for any mix of output values and input caps.


use bitcoin::ScriptBuf;
use coinfold_wallet::utxo_selection::policy::FixedTarget;
use coinfold_wallet::utxo_selection::InputComparator;
use coinfold_wallet::{SelectionGroup, Selector, UnspentOutput};
use quickcheck::{Arbitrary, Gen, TestResult};
use quickcheck_macros::quickcheck;

use test_helpers::outpoint;

// A small wallet: values spread over a handful of addresses
#[derive(Clone, Debug)]
struct Wallet(Vec<UnspentOutput>);

impl Arbitrary for Wallet {
    fn arbitrary(g: &mut Gen) -> Self {
        let count = usize::arbitrary(g) % 40;
        let outputs = (0..count)
            .map(|n| {
                let address = format!("addr{}", u8::arbitrary(g) % 4);
                let value = u64::arbitrary(g) % 1_000_000 + 1;
                let height = u32::arbitrary(g) % 1_000 + 1;
                let script = ScriptBuf::from_bytes([vec![0x00, 0x14], vec![n as u8; 20]].concat());
                UnspentOutput::new(outpoint(n as u32), address, value, script).at_height(height)
            })
            .collect();
        Wallet(outputs)
    }
}

#[quickcheck]
fn group_total_tracks_members(wallet: Wallet, pops: u8) -> bool {
    let mut group = SelectionGroup::new(InputComparator::prefer_biggest());
    for output in wallet.0 {
        group.insert(output);
    }
    for _ in 0..(pops % 8) {
        group.pop_worst();
    }

    let sum: u64 = group.members().iter().map(|o| o.value).sum();
    let sorted = group
        .members()
        .windows(2)
        .all(|w| w[0].value >= w[1].value);
    sum == group.total() && sorted
}

#[quickcheck]
fn duplicates_never_enter_a_group(wallet: Wallet) -> bool {
    let mut group = SelectionGroup::new(InputComparator::prefer_oldest());
    for output in wallet.0.iter().cloned() {
        group.insert(output);
    }
    let before = group.total();
    let rejected = wallet.0.into_iter().all(|o| !group.insert(o));
    rejected && group.total() == before
}

#[quickcheck]
fn selection_respects_the_input_cap(wallet: Wallet, cap: u8, percent: u8) -> TestResult {
    let cap = (cap % 6) as usize;
    if cap == 0 || wallet.0.is_empty() {
        return TestResult::discard();
    }
    // Targets within reach of the wallet hit the point where one more
    // input would make a group sufficient
    let eligible: u64 = wallet.0.iter().map(|o| o.value).sum();
    let target = eligible * (percent % 100 + 1) as u64 / 100;
    let policy = FixedTarget::new(target);
    let mut selector = Selector::new(&policy).with_max_inputs(Some(cap));
    for output in wallet.0 {
        if !matches!(selector.push(output), coinfold_wallet::ScanStep::Continue) {
            break;
        }
    }
    TestResult::from_bool(selector.finish().selected.len() <= cap)
}

#[quickcheck]
fn single_address_winner_fits_the_cap(values: Vec<u32>, cap: u8) -> TestResult {
    let cap = (cap % 4) as usize + 1;
    if values.len() <= cap {
        return TestResult::discard();
    }
    let outputs: Vec<UnspentOutput> = values
        .iter()
        .enumerate()
        .map(|(n, v)| {
            let script = ScriptBuf::from_bytes([vec![0x00, 0x14], vec![7; 20]].concat());
            UnspentOutput::new(outpoint(n as u32), "only", *v as u64 % 1_000 + 1, script).at_height(1)
        })
        .collect();
    // Just below what every output together would fund
    let target = outputs.iter().map(|o| o.value).sum::<u64>() - 1;
    let policy = FixedTarget::new(target);
    let mut selector = Selector::new(&policy).with_max_inputs(Some(cap));
    for output in outputs {
        if !matches!(selector.push(output), coinfold_wallet::ScanStep::Continue) {
            break;
        }
    }
    let outcome = selector.finish();
    TestResult::from_bool(outcome.selected.len() <= cap)
}

#[quickcheck]
fn sweep_fallback_keeps_the_biggest_outputs(wallet: Wallet, cap: u8) -> TestResult {
    let cap = (cap % 5) as usize + 1;
    let policy = FixedTarget::sweep();
    let mut selector = Selector::new(&policy).with_max_inputs(Some(cap));
    for output in wallet.0.iter().cloned() {
        selector.push(output);
    }
    if selector.winner().is_some() {
        return TestResult::discard();
    }
    let outcome = selector.finish();

    let mut values: Vec<u64> = wallet.0.iter().map(|o| o.value).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));
    values.truncate(cap);
    let selected: u64 = outcome.selected.iter().map(|o| o.value).sum();
    TestResult::from_bool(selected == values.iter().sum::<u64>())
}

#[quickcheck]
fn full_scans_account_for_every_eligible_output(wallet: Wallet, cap: u8, target: u32) -> bool {
    let cap = (cap % 10) as usize + 1;
    let eligible: u64 = wallet.0.iter().map(|o| o.value).sum();
    let policy = FixedTarget::new(target as u64);
    let mut selector = Selector::new(&policy)
        .with_comparator(Some(InputComparator::prefer_oldest()))
        .with_max_inputs(Some(cap));
    for output in wallet.0 {
        selector.push(output);
    }
    let outcome = selector.finish();
    let selected: u64 = outcome.selected.iter().map(|o| o.value).sum();
    selected + outcome.unused_amount == eligible
}

#[quickcheck]
fn selection_is_deterministic(wallet: Wallet, target: u32) -> bool {
    let policy = FixedTarget::new(target as u64);
    let run = |outputs: Vec<UnspentOutput>| {
        let mut selector = Selector::new(&policy);
        for output in outputs {
            if !matches!(selector.push(output), coinfold_wallet::ScanStep::Continue) {
                break;
            }
        }
        selector.finish()
    };
    run(wallet.0.clone()) == run(wallet.0)
}

#[quickcheck]
fn sweeps_select_everything_under_the_cap(wallet: Wallet) -> TestResult {
    if wallet.0.is_empty() {
        return TestResult::discard();
    }
    let policy = FixedTarget::sweep();
    let mut selector = Selector::new(&policy);
    for output in wallet.0.iter().cloned() {
        selector.push(output);
    }
    let outcome = selector.finish();
    TestResult::from_bool(outcome.selected.len() == wallet.0.len() && outcome.unused_count == 0)
}
