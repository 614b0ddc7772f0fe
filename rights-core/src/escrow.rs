//! Escrow ledger
//!
//! Pull-based proceeds: license sales credit the lender's entry, and only an
//! explicit withdrawal drains it. Entries are created lazily and may rest at
//! zero; they are never removed.

use crate::{
    clock::{Clock, SystemClock},
    types::{Address, UnixSeconds},
    Error, Result,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Withdrawable balances per address
#[derive(Debug, Clone, Default)]
pub struct EscrowLedger {
    balances: BTreeMap<Address, u128>,
}

impl EscrowLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries
    pub fn from_entries(entries: impl IntoIterator<Item = (Address, u128)>) -> Self {
        Self {
            balances: entries.into_iter().collect(),
        }
    }

    /// Balance for `address` (zero when never credited)
    pub fn balance(&self, address: &Address) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Whether `credit(address, amount)` would succeed
    pub fn can_credit(&self, address: &Address, amount: u128) -> bool {
        self.balance(address).checked_add(amount).is_some()
    }

    /// Add sale proceeds
    pub fn credit(&mut self, address: &Address, amount: u128) -> Result<u128> {
        let updated = self
            .balance(address)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow(format!("escrow balance of {}", address)))?;
        self.balances.insert(address.clone(), updated);
        Ok(updated)
    }

    /// Zero the entry and return what it held
    pub fn take(&mut self, address: &Address) -> Result<u128> {
        let amount = self.balance(address);
        if amount == 0 {
            return Err(Error::NothingToWithdraw(address.clone()));
        }
        self.balances.insert(address.clone(), 0);
        Ok(amount)
    }

    /// Put back an amount taken for a payout that did not complete
    pub fn restore(&mut self, address: &Address, amount: u128) -> Result<()> {
        self.credit(address, amount).map(|_| ())
    }

    /// Sum of all balances
    pub fn total(&self) -> u128 {
        self.balances
            .values()
            .fold(0u128, |acc, v| acc.saturating_add(*v))
    }

    /// Entries in address order
    pub fn entries(&self) -> impl Iterator<Item = (&Address, u128)> {
        self.balances.iter().map(|(a, v)| (a, *v))
    }
}

/// External funds transfer used by withdrawals
pub trait Payout: Send + Sync {
    /// Send `amount` to `recipient`; an error means nothing was sent
    fn transfer(&self, recipient: &Address, amount: u128) -> Result<()>;
}

/// Completed disbursement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disbursement {
    /// Recipient
    pub recipient: Address,

    /// Amount sent
    pub amount: u128,

    /// When the transfer was recorded
    pub recorded_at: UnixSeconds,
}

/// Payout that records disbursements for a downstream payment adapter
pub struct PayoutJournal {
    clock: Arc<dyn Clock>,
    disbursements: Mutex<Vec<Disbursement>>,
}

impl std::fmt::Debug for PayoutJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayoutJournal")
            .field("disbursements", &self.disbursements.lock().len())
            .finish()
    }
}

impl Default for PayoutJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl PayoutJournal {
    /// Empty journal stamped with wall-clock time
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty journal stamped by `clock`, normally the registry's own
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            disbursements: Mutex::new(Vec::new()),
        }
    }

    /// Everything paid out so far
    pub fn disbursements(&self) -> Vec<Disbursement> {
        self.disbursements.lock().clone()
    }

    /// Total paid to `recipient`
    pub fn paid_to(&self, recipient: &Address) -> u128 {
        self.disbursements
            .lock()
            .iter()
            .filter(|d| &d.recipient == recipient)
            .fold(0u128, |acc, d| acc.saturating_add(d.amount))
    }
}

impl Payout for PayoutJournal {
    fn transfer(&self, recipient: &Address, amount: u128) -> Result<()> {
        let recorded_at = self.clock.now();
        self.disbursements.lock().push(Disbursement {
            recipient: recipient.clone(),
            amount,
            recorded_at,
        });
        tracing::info!(recipient = %recipient, amount = %amount, "Payout recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn test_credit_accumulates() {
        let mut ledger = EscrowLedger::new();
        let lender = addr("0xa11ce");

        assert_eq!(ledger.balance(&lender), 0);
        ledger.credit(&lender, 777).unwrap();
        assert_eq!(ledger.credit(&lender, 778).unwrap(), 1555);
        assert_eq!(ledger.total(), 1555);
    }

    #[test]
    fn test_credit_overflow_leaves_balance() {
        let mut ledger = EscrowLedger::new();
        let lender = addr("0xa11ce");
        ledger.credit(&lender, u128::MAX).unwrap();

        assert!(!ledger.can_credit(&lender, 1));
        assert!(matches!(ledger.credit(&lender, 1), Err(Error::Overflow(_))));
        assert_eq!(ledger.balance(&lender), u128::MAX);
    }

    #[test]
    fn test_take_zeroes_entry() {
        let mut ledger = EscrowLedger::new();
        let lender = addr("0xa11ce");
        ledger.credit(&lender, 500).unwrap();

        assert_eq!(ledger.take(&lender).unwrap(), 500);
        assert_eq!(ledger.balance(&lender), 0);
        assert!(matches!(ledger.take(&lender), Err(Error::NothingToWithdraw(_))));

        // Entry is kept at zero
        assert_eq!(ledger.entries().count(), 1);
    }

    #[test]
    fn test_restore_after_take() {
        let mut ledger = EscrowLedger::new();
        let lender = addr("0xa11ce");
        ledger.credit(&lender, 42).unwrap();

        let amount = ledger.take(&lender).unwrap();
        ledger.restore(&lender, amount).unwrap();
        assert_eq!(ledger.balance(&lender), 42);
    }

    #[test]
    fn test_payout_journal_records() {
        let clock = ManualClock::new(1_700_000_000);
        let journal = PayoutJournal::with_clock(Arc::new(clock.clone()));
        let lender = addr("0xa11ce");

        journal.transfer(&lender, 10).unwrap();
        clock.advance(60);
        journal.transfer(&lender, 5).unwrap();
        journal.transfer(&addr("0xb0b"), 1).unwrap();

        let disbursements = journal.disbursements();
        assert_eq!(disbursements.len(), 3);
        assert_eq!(disbursements[0].recorded_at, 1_700_000_000);
        assert_eq!(disbursements[1].recorded_at, 1_700_000_060);
        assert_eq!(journal.paid_to(&lender), 15);
    }
}
