//! Property-based tests for balance invariants
//!
//! These tests use proptest to verify critical invariants:
//! - No balance view ever goes negative under admissible sequences
//! - Rollback exactly reverses a reservation
//! - A rejected batch leaves both views untouched

use mesh_ledger::{
    types::{Address, Hash, TransferLeg},
    BalanceLedger,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Address pool used by generated legs
const ADDRESS_POOL: u8 = 4;

/// Currency pool used by generated legs
const CURRENCY_POOL: u8 = 2;

/// Opening balance per (address, currency) pair, in cents
const FUNDING_CENTS: i64 = 2000;

fn test_address(index: u8) -> Address {
    Address::from_digest([index; 32])
}

fn test_currency(index: u8) -> Hash {
    Hash::from_bytes([0xc0 + index; 32])
}

/// All (address, currency) pairs the strategies can touch
fn all_pairs() -> Vec<(Address, Hash)> {
    let mut pairs = Vec::new();
    for a in 0..ADDRESS_POOL {
        for c in 0..CURRENCY_POOL {
            pairs.push((test_address(a), test_currency(c)));
        }
    }
    pairs
}

/// Ledger with every pair funded to the same opening balance
fn funded_ledger() -> BalanceLedger {
    let ledger = BalanceLedger::new();
    for (address, currency) in all_pairs() {
        ledger
            .load_snapshot_entry(&address, &currency, Decimal::new(FUNDING_CENTS, 2))
            .unwrap();
    }
    ledger
}

/// Strategy for generating single legs (debits and credits)
fn leg_strategy() -> impl Strategy<Value = TransferLeg> {
    (0..ADDRESS_POOL, 0..CURRENCY_POOL, -3000i64..3000i64).prop_map(|(a, c, cents)| {
        TransferLeg::new(test_address(a), test_currency(c), Decimal::new(cents, 2))
    })
}

/// Strategy for generating admission batches
fn batch_strategy() -> impl Strategy<Value = Vec<TransferLeg>> {
    prop::collection::vec(leg_strategy(), 1..5)
}

/// Speculative balances of every known pair
fn speculative_view(ledger: &BalanceLedger) -> Vec<Decimal> {
    all_pairs()
        .iter()
        .map(|(address, currency)| ledger.speculative_balance(address, currency))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: No balance view ever goes negative under any sequence of
    /// admission attempts
    #[test]
    fn prop_views_never_negative(batches in prop::collection::vec(batch_strategy(), 1..25)) {
        let ledger = funded_ledger();

        for batch in &batches {
            ledger.reserve(batch);
        }

        for (address, currency) in all_pairs() {
            prop_assert!(ledger.speculative_balance(&address, &currency) >= Decimal::ZERO);
            // Durable view only moves at confirmation, never at admission
            prop_assert_eq!(
                ledger.balance(&address, &currency),
                Decimal::new(FUNDING_CENTS, 2)
            );
        }

        prop_assert!(ledger.validate().is_ok());
    }

    /// Property: Rollback exactly reverses a reservation, regardless of what
    /// was admitted before
    #[test]
    fn prop_rollback_is_inverse_of_reserve(
        prefix in prop::collection::vec(batch_strategy(), 0..10),
        batch in batch_strategy(),
    ) {
        let ledger = funded_ledger();
        for earlier in &prefix {
            ledger.reserve(earlier);
        }

        let before = speculative_view(&ledger);
        if ledger.reserve(&batch) {
            ledger.rollback(&batch);
        }
        prop_assert_eq!(speculative_view(&ledger), before);
    }

    /// Property: A rejected batch leaves the speculative view untouched
    #[test]
    fn prop_rejected_batch_mutates_nothing(batches in prop::collection::vec(batch_strategy(), 1..25)) {
        let ledger = funded_ledger();

        for batch in &batches {
            let before = speculative_view(&ledger);
            if !ledger.reserve(batch) {
                prop_assert_eq!(speculative_view(&ledger), before);
            }
        }
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_sequential_debits_deplete_speculative_funds() {
        let ledger = BalanceLedger::new();
        let address = test_address(0);
        let currency = test_currency(0);
        ledger
            .load_snapshot_entry(&address, &currency, Decimal::new(1000, 2))
            .unwrap();

        let debit = vec![TransferLeg::new(address, currency, Decimal::new(-400, 2))];

        // 10.00 covers two debits of 4.00; the third would overdraw the
        // speculative view even though the durable view still holds 10.00
        assert!(ledger.reserve(&debit));
        assert!(ledger.reserve(&debit));
        assert!(!ledger.reserve(&debit));

        assert_eq!(
            ledger.speculative_balance(&address, &currency),
            Decimal::new(200, 2)
        );
        assert_eq!(ledger.balance(&address, &currency), Decimal::new(1000, 2));
    }

    #[test]
    fn test_rollback_releases_reserved_funds() {
        let ledger = BalanceLedger::new();
        let address = test_address(0);
        let currency = test_currency(0);
        ledger
            .load_snapshot_entry(&address, &currency, Decimal::new(1000, 2))
            .unwrap();

        let debit = vec![TransferLeg::new(address, currency, Decimal::new(-800, 2))];

        assert!(ledger.reserve(&debit));
        assert!(!ledger.reserve(&debit));

        // Releasing the first reservation makes room again
        ledger.rollback(&debit);
        assert!(ledger.reserve(&debit));
    }

    #[test]
    fn test_transfer_batch_moves_funds_between_addresses() {
        let ledger = BalanceLedger::new();
        let sender = test_address(0);
        let receiver = test_address(1);
        let currency = test_currency(0);
        ledger
            .load_snapshot_entry(&sender, &currency, Decimal::new(5000, 2))
            .unwrap();

        let batch = vec![
            TransferLeg::new(sender, currency, Decimal::new(-1250, 2)),
            TransferLeg::new(receiver, currency, Decimal::new(1250, 2)),
        ];
        assert!(ledger.reserve(&batch));

        assert_eq!(
            ledger.speculative_balance(&sender, &currency),
            Decimal::new(3750, 2)
        );
        assert_eq!(
            ledger.speculative_balance(&receiver, &currency),
            Decimal::new(1250, 2)
        );

        // Durable view is untouched until confirmation
        assert_eq!(ledger.balance(&receiver, &currency), Decimal::ZERO);
    }
}
