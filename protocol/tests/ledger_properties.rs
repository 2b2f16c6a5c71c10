//! Behavioural properties of the vault ledger.
//!
//! These tests drive `VaultLedger` only through its public API and a manual
//! clock: deposit sequences, lock gating, reward monotonicity, emergency mode
//! and the owner-withdrawal bound. The last section hammers one ledger from
//! many threads and checks the books still balance.

use std::sync::Arc;
use std::thread;

use timelock_protocol::config::LedgerParams;
use timelock_protocol::types::WEI_PER_ETH;
use timelock_protocol::vault::{DepositInfo, VaultEvent};
use timelock_protocol::{Address, ManualClock, VaultError, VaultLedger};

const DAY: u64 = 86_400;
const START: u64 = 1_700_000_000;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn setup() -> (Arc<VaultLedger>, Arc<ManualClock>, Address) {
    let clock = Arc::new(ManualClock::new(START));
    let ledger = VaultLedger::new(LedgerParams::default(), clock.clone()).expect("valid params");
    let owner = Address::from_label("owner");
    ledger.initialize(owner, 100, 150).expect("initialize");
    (Arc::new(ledger), clock, owner)
}

fn user(i: usize) -> Address {
    Address::from_label(&format!("user-{}", i))
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn total_locked_tracks_accepted_deposits_minus_exits() {
    let (ledger, clock, _) = setup();
    let alice = user(1);
    let mut expected: u128 = 0;

    for (i, amount) in [5u128, 17, 1_000, 3, 250].into_iter().enumerate() {
        ledger.deposit(alice, amount, DAY + i as u64).unwrap();
        expected += amount;
        assert_eq!(ledger.get_total_locked(), expected);
        clock.advance(60);
    }
    // Rejected deposits do not count.
    assert!(ledger.deposit(alice, 0, DAY).is_err());
    assert_eq!(ledger.get_total_locked(), expected);

    ledger.emergency_withdraw(alice).unwrap();
    assert_eq!(ledger.get_total_locked(), 0);
    ledger.audit().unwrap();
}

#[test]
fn withdraw_fails_until_unlock_then_succeeds() {
    let (ledger, clock, owner) = setup();
    ledger.fund_vault(owner, WEI_PER_ETH).unwrap();
    let alice = user(1);
    ledger.deposit(alice, WEI_PER_ETH, 3 * DAY).unwrap();
    let unlock = ledger.get_deposit_info(&alice).unlock_time();

    for step in [0, 1, DAY, 2 * DAY, 3 * DAY - 1] {
        clock.set(START + step);
        assert!(
            matches!(ledger.withdraw(alice), Err(VaultError::StillLocked { unlock_time, .. }) if unlock_time == unlock),
            "withdraw should be locked at +{}",
            step
        );
    }

    clock.set(unlock);
    ledger.withdraw(alice).unwrap();
    assert_eq!(ledger.get_deposit_info(&alice), DepositInfo::default());
}

#[test]
fn withdraw_after_unlock_succeeds_for_any_principal() {
    for amount in [
        1u128,
        WEI_PER_ETH,
        1_000 * WEI_PER_ETH,
        1_000_000 * WEI_PER_ETH,
        1_000_000_000 * WEI_PER_ETH,
    ] {
        let clock = Arc::new(ManualClock::new(START));
        let ledger = VaultLedger::new(LedgerParams::default(), clock.clone()).unwrap();
        let owner = Address::from_label("owner");
        let whale = user(7);
        ledger.initialize(owner, 1_000_000_000, 150).unwrap();
        ledger.fund_vault(owner, 1_000 * WEI_PER_ETH).unwrap();
        ledger.deposit(whale, amount, DAY).unwrap();
        clock.advance(5 * DAY);

        let owed = ledger
            .calculate_pending_rewards(&whale)
            .unwrap_or_else(|e| panic!("pending rewards for {} wei: {}", amount, e));
        let applied = ledger
            .withdraw(whale)
            .unwrap_or_else(|e| panic!("withdraw of {} wei: {}", amount, e));
        match applied.events.as_slice() {
            [VaultEvent::Withdrawn {
                amount: returned,
                rewards,
                forfeited_rewards,
                ..
            }] => {
                assert_eq!(*returned, amount);
                assert_eq!(rewards + forfeited_rewards, owed);
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert_eq!(ledger.get_total_locked(), 0);
        ledger.audit().unwrap();
    }
}

#[test]
fn million_eth_position_claims_and_exits() {
    let clock = Arc::new(ManualClock::new(START));
    let ledger = VaultLedger::new(LedgerParams::default(), clock.clone()).unwrap();
    let owner = Address::from_label("owner");
    let whale = user(8);
    let principal = 1_000_000 * WEI_PER_ETH;
    ledger.initialize(owner, 1_000_000_000, 150).unwrap();
    ledger.fund_vault(owner, 1_000_000 * WEI_PER_ETH).unwrap();
    ledger.deposit(whale, principal, DAY).unwrap();
    clock.advance(5 * DAY);

    // 10^6 ETH * 1e9 * 432 000 s / 1e18 * 1.015
    let expected = 1_000_000u128 * 1_000_000_000 * 432_000 * 10_150 / 10_000;
    assert_eq!(ledger.calculate_pending_rewards(&whale).unwrap(), expected);
    ledger.claim_rewards(whale).unwrap();
    ledger.withdraw(whale).unwrap();
    assert_eq!(ledger.get_total_locked(), 0);
    assert_eq!(ledger.vault_balance(), 1_000_000 * WEI_PER_ETH - expected);
}

#[test]
fn pending_rewards_never_decrease_without_claims() {
    let (ledger, clock, owner) = setup();
    ledger.fund_vault(owner, WEI_PER_ETH).unwrap();
    let alice = user(1);
    ledger.deposit(alice, 3 * WEI_PER_ETH, 7 * DAY).unwrap();

    let mut last = 0;
    for _ in 0..50 {
        clock.advance(137);
        let pending = ledger.calculate_pending_rewards(&alice).unwrap();
        assert!(pending >= last);
        last = pending;
    }
    assert!(last > 0);

    ledger.claim_rewards(alice).unwrap();
    assert_eq!(ledger.calculate_pending_rewards(&alice).unwrap(), 0);
}

#[test]
fn longer_locks_earn_at_least_as_much() {
    let (ledger, clock, _) = setup();
    let short = user(1);
    let long = user(2);
    ledger.deposit(short, WEI_PER_ETH, DAY).unwrap();
    ledger.deposit(long, WEI_PER_ETH, 30 * DAY).unwrap();
    clock.advance(1_000);
    assert!(
        ledger.calculate_pending_rewards(&long).unwrap()
            > ledger.calculate_pending_rewards(&short).unwrap()
    );
}

#[test]
fn pending_rewards_read_does_not_mutate() {
    let (ledger, clock, _) = setup();
    ledger.deposit(user(1), WEI_PER_ETH, DAY).unwrap();
    clock.advance(10);
    let before = ledger.snapshot();
    for _ in 0..3 {
        ledger.calculate_pending_rewards(&user(1)).unwrap();
    }
    assert_eq!(ledger.snapshot(), before);
    assert_eq!(ledger.calculate_pending_rewards(&user(99)).unwrap(), 0);
}

#[test]
fn emergency_activation_twice_changes_nothing_more() {
    let (ledger, _, owner) = setup();
    ledger.activate_emergency_mode(owner).unwrap();
    let seq = ledger.seq();
    let snapshot = ledger.snapshot();

    let again = ledger.activate_emergency_mode(owner).unwrap();
    assert!(!again.changed_state());
    assert!(ledger.get_emergency_mode());
    assert_eq!(ledger.seq(), seq);
    assert_eq!(ledger.snapshot(), snapshot);
}

#[test]
fn owner_withdrawal_never_touches_principal() {
    let (ledger, clock, owner) = setup();
    ledger.fund_vault(user(9), 10_000).unwrap();
    for i in 0..5 {
        ledger.deposit(user(i), 1_000 * (i as u128 + 1), DAY).unwrap();
    }
    // An early exit credits its penalty to the owner pool.
    ledger.emergency_withdraw(user(0)).unwrap();
    clock.advance(500);

    let locked = ledger.get_total_locked();
    let applied = ledger.withdraw_vault(owner).unwrap();
    assert!(matches!(
        applied.events[0],
        VaultEvent::VaultWithdrawn { amount: 10_150, .. }
    ));
    assert_eq!(ledger.vault_balance(), locked);
    assert!(ledger.vault_balance() >= ledger.get_total_locked());

    assert!(matches!(
        ledger.withdraw_vault(owner),
        Err(VaultError::InsufficientUnlockedFunds { .. })
    ));
    assert_eq!(ledger.vault_balance(), locked);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn ten_seconds_into_a_one_day_lock() {
    let (ledger, clock, owner) = setup();
    let alice = user(1);
    ledger.deposit(alice, WEI_PER_ETH, DAY).unwrap();
    clock.advance(10);

    let pending = ledger.calculate_pending_rewards(&alice).unwrap();
    assert!(pending > 0);
    // Strictly less than the reward for the whole lock.
    assert!(pending < 100 * DAY as u128 * 10_150 / 10_000);
    assert!(matches!(
        ledger.withdraw(alice),
        Err(VaultError::StillLocked { .. })
    ));

    // Continues into the emergency scenario.
    ledger.activate_emergency_mode(owner).unwrap();
    ledger.emergency_withdraw(alice).unwrap();
    assert_eq!(ledger.get_deposit_info(&alice).amount, 0);
    assert_eq!(ledger.get_total_locked(), 0);
}

#[test]
fn two_back_to_back_deposits_both_succeed() {
    let (ledger, _, _) = setup();
    let alice = user(1);
    ledger.deposit(alice, WEI_PER_ETH, DAY).unwrap();
    let second = ledger.deposit(alice, WEI_PER_ETH / 2, 2 * DAY).unwrap();
    assert!(matches!(
        second.events[0],
        VaultEvent::Deposited { merged: true, .. }
    ));
    assert_eq!(ledger.get_total_locked(), WEI_PER_ETH + WEI_PER_ETH / 2);
    assert_eq!(ledger.depositor_count(), 1);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_callers_keep_the_books_balanced() {
    let (ledger, clock, owner) = setup();
    ledger.fund_vault(owner, WEI_PER_ETH).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let me = user(i);
                for round in 0..50u128 {
                    ledger.deposit(me, 10 + round, DAY).unwrap();
                    let _ = ledger.claim_rewards(me);
                    if round % 10 == 9 {
                        ledger.emergency_withdraw(me).unwrap();
                    }
                }
            })
        })
        .collect();

    let reader = {
        let ledger = Arc::clone(&ledger);
        thread::spawn(move || {
            for _ in 0..500 {
                let snap = ledger.snapshot();
                let sum: u128 = snap.deposits.iter().map(|d| d.deposit.amount).sum();
                assert_eq!(sum, snap.total_locked);
                assert_eq!(snap.vault_balance, snap.total_locked + snap.owner_balance);
            }
        })
    };

    for _ in 0..20 {
        clock.advance(30);
        thread::yield_now();
    }
    for handle in handles {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    ledger.audit().unwrap();
    // Every thread ends on an emergency withdraw.
    assert_eq!(ledger.get_total_locked(), 0);
    assert_eq!(ledger.depositor_count(), 0);
}
