//! Property-based tests for registry invariants
//!
//! - Rejected purchases change nothing
//! - Revocation is monotonic
//! - A sweep removes exactly the overdue licenses
//! - Escrow conserves every amount paid in

use proptest::prelude::*;
use rights_core::{Address, CertificateId, Error, ManualClock, PayoutJournal, Registry};
use std::sync::Arc;

const START: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn borrower(i: usize) -> Address {
    addr(&format!("0xb{:04x}", i))
}

fn test_registry() -> (Registry, ManualClock) {
    let clock = ManualClock::new(START);
    let registry = Registry::new(addr("0xad"), Arc::new(clock.clone()));
    (registry, clock)
}

/// Strategy for lending terms: (days, price)
fn terms_strategy() -> impl Strategy<Value = (u64, u128)> {
    (1u64..30, 1u128..1_000_000_000_000u128)
}

/// Operations a certificate owner or buyer may attempt after revocation
#[derive(Debug, Clone)]
enum Attempt {
    Allow(u64, u128),
    Block,
    Buy(usize, u128),
    Revoke,
}

fn attempt_strategy() -> impl Strategy<Value = Attempt> {
    prop_oneof![
        (1u64..10, 0u128..1_000).prop_map(|(d, p)| Attempt::Allow(d, p)),
        Just(Attempt::Block),
        (0usize..8, 0u128..2_000).prop_map(|(b, p)| Attempt::Buy(b, p)),
        Just(Attempt::Revoke),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: paying less than the price fails and leaves all state as it was
    #[test]
    fn prop_underpayment_changes_nothing(
        (days, price) in terms_strategy(),
        shortfall in 1u128..1_000_000,
    ) {
        let (mut registry, _) = test_registry();
        let artist = addr("0xa11ce");
        let id = registry.mint(&artist, "uri");
        registry.allow_lending(&artist, id, days, price).unwrap();
        registry.take_commit();

        let before = registry.snapshot();
        let paid = price.saturating_sub(shortfall);
        let result = registry.buy_license(id, &addr("0xb0b"), paid);

        let is_underpaid = matches!(result, Err(Error::NotEnoughFunds { .. }));
        prop_assert!(is_underpaid);
        let after = registry.snapshot();
        prop_assert_eq!(before.certificates, after.certificates);
        prop_assert_eq!(before.escrow, after.escrow);
        prop_assert!(registry.take_commit().is_empty());
    }

    /// Property: once revoked, nothing makes a certificate valid or lendable again
    #[test]
    fn prop_revocation_is_monotonic(
        lendable_before in any::<bool>(),
        attempts in prop::collection::vec(attempt_strategy(), 0..20),
    ) {
        let (mut registry, _) = test_registry();
        let artist = addr("0xa11ce");
        let admin = addr("0xad");
        let id = registry.mint(&artist, "uri");
        if lendable_before {
            registry.allow_lending(&artist, id, 1, 10).unwrap();
        }
        registry.revoke_certificate(&admin, id).unwrap();

        for attempt in attempts {
            let _ = match attempt {
                Attempt::Allow(days, price) => registry.allow_lending(&artist, id, days, price),
                Attempt::Block => registry.block_lending(&artist, id),
                Attempt::Buy(b, paid) => registry.buy_license(id, &borrower(b), paid).map(|_| ()),
                Attempt::Revoke => registry.revoke_certificate(&admin, id),
            };
            let cert = registry.certificate(id).unwrap();
            prop_assert!(!cert.valid);
            prop_assert!(cert.licenses.is_empty());
        }
    }

    /// Property: the sweep removes exactly the licenses with expires_at <= now
    #[test]
    fn prop_sweep_removes_exactly_overdue(
        grants in prop::collection::vec((1u64..5, 0u64..(5 * DAY)), 1..12),
        elapsed in 0u64..(10 * DAY),
    ) {
        let (mut registry, clock) = test_registry();
        let artist = addr("0xa11ce");

        let mut expiries = Vec::new();
        for (i, (days, offset)) in grants.iter().enumerate() {
            let id = registry.mint(&artist, format!("uri-{}", i));
            registry.allow_lending(&artist, id, *days, 1).unwrap();
            clock.set(START + offset);
            registry.buy_license(id, &borrower(i), 1).unwrap();
            expiries.push((id, borrower(i), START + offset + days * DAY));
        }

        let now = START + elapsed;
        clock.set(now);
        let overdue: Vec<_> = expiries.iter().filter(|(_, _, exp)| *exp <= now).collect();

        prop_assert_eq!(registry.check_upkeep(), !overdue.is_empty());

        match registry.perform_upkeep() {
            Ok(report) => {
                prop_assert_eq!(report.licenses_removed(), overdue.len());
                for (id, b, exp) in &expiries {
                    let holds = registry.borrowers(*id).unwrap().contains(b);
                    prop_assert_eq!(holds, *exp > now);
                }
            }
            Err(e) => {
                prop_assert!(matches!(e, Error::UpkeepNotNeeded));
                prop_assert!(overdue.is_empty());
            }
        }

        prop_assert!(!registry.check_upkeep());
    }

    /// Property: escrow total equals the sum of accepted payments, and
    /// withdrawing everything pays out exactly that sum
    #[test]
    fn prop_escrow_conservation(
        sales in prop::collection::vec((0usize..3, 0u128..1_000_000), 1..30),
    ) {
        let (mut registry, _) = test_registry();
        let owners = [addr("0xa1"), addr("0xa2"), addr("0xa3")];
        let ids: Vec<CertificateId> = owners
            .iter()
            .map(|o| {
                let id = registry.mint(o, "uri");
                registry.allow_lending(o, id, 1, 1_000).unwrap();
                id
            })
            .collect();

        let mut accepted = 0u128;
        for (i, (owner, extra)) in sales.iter().enumerate() {
            let paid = 1_000 + extra;
            registry.buy_license(ids[*owner], &borrower(i), paid).unwrap();
            accepted += paid;
        }
        prop_assert_eq!(registry.total_escrow(), accepted);

        let journal = PayoutJournal::new();
        let mut withdrawn = 0u128;
        for owner in &owners {
            match registry.withdraw_proceeds(owner, &journal) {
                Ok(amount) => withdrawn += amount,
                Err(e) => prop_assert!(matches!(e, Error::NothingToWithdraw(_))),
            }
        }
        prop_assert_eq!(withdrawn, accepted);
        prop_assert_eq!(registry.total_escrow(), 0);
    }
}
