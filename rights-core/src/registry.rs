//! Registry façade
//!
//! Owns the certificate store, the escrow ledger, the clock, the
//! administrative owner and the buffer of effects produced since the last
//! commit. It is a plain `&mut self` state machine: serialization of calls is
//! the caller's job (see [`crate::actor`]).
//!
//! # Atomicity
//!
//! Every operation validates its preconditions before its first write, so an
//! `Err` return means nothing changed. Withdrawal is the only operation with
//! an external interaction after a write; a failed payout puts the balance
//! back before the error is returned.
//!
//! # Example
//!
//! ```
//! use rights_core::{clock::ManualClock, Address, Registry};
//! use std::sync::Arc;
//!
//! let clock = ManualClock::new(1_700_000_000);
//! let admin = Address::new("0xad").unwrap();
//! let artist = Address::new("0xa11ce").unwrap();
//! let mut registry = Registry::new(admin, Arc::new(clock.clone()));
//!
//! let id = registry.mint(&artist, "ipfs://artwork");
//! registry.allow_lending(&artist, id, 1, 777).unwrap();
//!
//! let borrower = Address::new("0xb0b").unwrap();
//! registry.buy_license(id, &borrower, 777).unwrap();
//! assert!(registry.license_validity(id, &borrower).unwrap());
//!
//! clock.advance(86_400);
//! assert!(registry.check_upkeep());
//! ```

use crate::{
    clock::Clock,
    crypto::KeyPair,
    escrow::{EscrowLedger, Payout},
    licensing::LicensingEngine,
    store::CertificateStore,
    sweeper,
    types::{
        Address, Certificate, CertificateId, EventRecord, License, RightsEvent, UnixSeconds,
        UpkeepReport, REGISTRY_NAME, REGISTRY_SYMBOL,
    },
    Error, Result,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Effects of the calls since the last [`Registry::take_commit`]
#[derive(Debug, Clone, Default)]
pub struct Commit {
    /// Current state of every touched certificate
    pub certificates: Vec<Certificate>,

    /// Current balance of every touched escrow entry
    pub escrow: Vec<(Address, u128)>,

    /// Emitted events in order
    pub events: Vec<EventRecord>,

    /// Next event sequence after these events
    pub next_sequence: u64,
}

impl Commit {
    /// Nothing to persist
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.escrow.is_empty() && self.events.is_empty()
    }
}

/// Persisted state used to rebuild a registry
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// All certificates
    pub certificates: Vec<Certificate>,

    /// All escrow entries
    pub escrow: Vec<(Address, u128)>,

    /// Next event sequence
    pub next_sequence: u64,
}

/// Digital rights registry
pub struct Registry {
    store: CertificateStore,
    escrow: EscrowLedger,
    admin: Address,
    clock: Arc<dyn Clock>,
    signer: Option<KeyPair>,
    next_sequence: u64,
    pending_events: Vec<EventRecord>,
    touched_certificates: BTreeSet<CertificateId>,
    touched_escrow: BTreeSet<Address>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("admin", &self.admin)
            .field("emitted_count", &self.store.emitted_count())
            .field("signing", &self.signer.is_some())
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}

impl Registry {
    /// Empty registry administered by `admin`
    pub fn new(admin: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: CertificateStore::new(),
            escrow: EscrowLedger::new(),
            admin,
            clock,
            signer: None,
            next_sequence: 0,
            pending_events: Vec::new(),
            touched_certificates: BTreeSet::new(),
            touched_escrow: BTreeSet::new(),
        }
    }

    /// Rebuild from persisted state
    pub fn from_snapshot(
        admin: Address,
        clock: Arc<dyn Clock>,
        snapshot: RegistrySnapshot,
    ) -> Result<Self> {
        let mut registry = Self::new(admin, clock);
        registry.reset(snapshot)?;
        Ok(registry)
    }

    /// Sign clauses with `keypair`
    pub fn with_keypair(mut self, keypair: KeyPair) -> Self {
        self.signer = Some(keypair);
        self
    }

    /// Replace all state with `snapshot`, dropping uncommitted effects
    pub fn reset(&mut self, snapshot: RegistrySnapshot) -> Result<()> {
        self.store = CertificateStore::from_certificates(snapshot.certificates)?;
        self.escrow = EscrowLedger::from_entries(snapshot.escrow);
        self.next_sequence = snapshot.next_sequence;
        self.pending_events.clear();
        self.touched_certificates.clear();
        self.touched_escrow.clear();
        Ok(())
    }

    // Metadata

    /// Registry name
    pub fn name(&self) -> &'static str {
        REGISTRY_NAME
    }

    /// Registry symbol
    pub fn symbol(&self) -> &'static str {
        REGISTRY_SYMBOL
    }

    /// Administrative owner
    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Clause signing key, if configured
    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.signer.as_ref().map(KeyPair::public_key)
    }

    /// Current registry time
    pub fn now(&self) -> UnixSeconds {
        self.clock.now()
    }

    // Certificate store

    /// Mint a certificate owned by `caller`
    pub fn mint(&mut self, caller: &Address, uri: impl Into<String>) -> CertificateId {
        let uri = uri.into();
        let id = self.store.mint(caller.clone(), uri.clone(), self.now());
        self.touched_certificates.insert(id);

        tracing::info!(id = %id, owner = %caller, "Certificate minted");

        self.emit(RightsEvent::Minted {
            owner: caller.clone(),
            id,
        });
        self.emit(RightsEvent::TokenUriSet { uri, id });
        id
    }

    /// Number of certificates ever minted
    pub fn emitted_count(&self) -> u64 {
        self.store.emitted_count()
    }

    /// Certificate record
    pub fn certificate(&self, id: CertificateId) -> Result<&Certificate> {
        self.store.get(id)
    }

    /// All certificates in id order
    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.store.iter()
    }

    /// Content pointer
    pub fn token_uri(&self, id: CertificateId) -> Result<&str> {
        Ok(&self.store.get(id)?.uri)
    }

    /// Current owner
    pub fn owner_of(&self, id: CertificateId) -> Result<&Address> {
        self.store.owner_of(id)
    }

    /// Hand a certificate to `new_owner`; licenses already granted stay in place
    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        id: CertificateId,
        new_owner: &Address,
    ) -> Result<()> {
        let certificate = self.store.get(id)?;
        if &certificate.owner != caller {
            return Err(Error::NotTokenOwner {
                id,
                caller: caller.clone(),
            });
        }
        if new_owner == caller {
            return Err(Error::InvalidAddress(format!(
                "{} already owns token {}",
                new_owner, id
            )));
        }

        self.store.get_mut(id)?.owner = new_owner.clone();
        self.touched_certificates.insert(id);

        tracing::info!(id = %id, from = %caller, to = %new_owner, "Ownership transferred");

        self.emit(RightsEvent::OwnershipTransferred {
            id,
            from: caller.clone(),
            to: new_owner.clone(),
        });
        Ok(())
    }

    // Licensing engine

    fn licensing(&mut self) -> LicensingEngine<'_> {
        let now = self.clock.now();
        LicensingEngine::new(&mut self.store, &mut self.escrow, self.signer.as_ref(), now)
    }

    /// Open lending for `min_period_days` days at `price`
    pub fn allow_lending(
        &mut self,
        caller: &Address,
        id: CertificateId,
        min_period_days: u64,
        price: u128,
    ) -> Result<()> {
        let events = self
            .licensing()
            .allow_lending(caller, id, min_period_days, price)?;
        self.touched_certificates.insert(id);
        self.emit_all(events);
        Ok(())
    }

    /// Close lending
    pub fn block_lending(&mut self, caller: &Address, id: CertificateId) -> Result<()> {
        let events = self.licensing().block_lending(caller, id)?;
        self.touched_certificates.insert(id);
        self.emit_all(events);
        Ok(())
    }

    /// Buy a license for `borrower`, paying `paid`
    pub fn buy_license(
        &mut self,
        id: CertificateId,
        borrower: &Address,
        paid: u128,
    ) -> Result<License> {
        let (license, events) = self.licensing().buy_license(id, borrower, paid)?;
        let owner = self.store.owner_of(id)?.clone();
        self.touched_certificates.insert(id);
        self.touched_escrow.insert(owner);
        self.emit_all(events);
        Ok(license)
    }

    /// Permanently invalidate a certificate (administrator only)
    pub fn revoke_certificate(&mut self, caller: &Address, id: CertificateId) -> Result<()> {
        if caller != &self.admin {
            return Err(Error::NotRegistryAdmin(caller.clone()));
        }
        self.store.get_mut(id)?.valid = false;
        self.touched_certificates.insert(id);

        tracing::warn!(id = %id, "Certificate revoked");

        self.emit(RightsEvent::Revoked { id });
        Ok(())
    }

    /// Whether `address` holds an unexpired license on `id`
    pub fn license_validity(&self, id: CertificateId, address: &Address) -> Result<bool> {
        Ok(self.store.get(id)?.license_valid(address, self.now()))
    }

    /// Whether `id` is open for lending
    pub fn lending_status(&self, id: CertificateId) -> Result<bool> {
        Ok(self.store.get(id)?.lendable)
    }

    /// Current license holders in grant order
    pub fn borrowers(&self, id: CertificateId) -> Result<Vec<Address>> {
        Ok(self.store.get(id)?.borrowers())
    }

    /// License record for the pair
    pub fn license(&self, id: CertificateId, borrower: &Address) -> Result<&License> {
        self.store
            .get(id)?
            .license(borrower)
            .ok_or_else(|| Error::LicenseNotFound {
                id,
                borrower: borrower.clone(),
            })
    }

    /// Expiry time of the pair's license
    pub fn expiration_time(&self, id: CertificateId, borrower: &Address) -> Result<UnixSeconds> {
        Ok(self.license(id, borrower)?.expires_at)
    }

    /// Clause text of the pair's license
    pub fn clause(&self, id: CertificateId, borrower: &Address) -> Result<&str> {
        Ok(&self.license(id, borrower)?.clause)
    }

    // Expiration sweeper

    /// Read-only: is any license expired?
    pub fn check_upkeep(&self) -> bool {
        sweeper::check_upkeep(&self.store, self.now())
    }

    /// Remove every expired license
    pub fn perform_upkeep(&mut self) -> Result<UpkeepReport> {
        let now = self.now();
        let (report, event) = sweeper::perform_upkeep(&mut self.store, now)?;
        self.touched_certificates
            .extend(report.certificates_touched.iter().copied());
        self.emit(event);
        Ok(report)
    }

    // Escrow ledger

    /// Withdrawable balance
    pub fn proceeds(&self, address: &Address) -> u128 {
        self.escrow.balance(address)
    }

    /// Sum of all withdrawable balances
    pub fn total_escrow(&self) -> u128 {
        self.escrow.total()
    }

    /// Pay out the caller's whole balance
    ///
    /// The entry is zeroed before `payout` is called. When the transfer
    /// fails the amount is restored and `TransferFailed` is returned.
    pub fn withdraw_proceeds(&mut self, caller: &Address, payout: &dyn Payout) -> Result<u128> {
        let amount = self.begin_withdrawal(caller)?;
        match payout.transfer(caller, amount) {
            Ok(()) => {
                self.complete_withdrawal(caller, amount);
                Ok(amount)
            }
            Err(e) => Err(self.abort_withdrawal(caller, amount, e)),
        }
    }

    /// Zero the caller's entry ahead of a payout and return what it held
    ///
    /// The zeroed entry is part of the next commit, so it can be made
    /// durable before any funds leave.
    pub fn begin_withdrawal(&mut self, caller: &Address) -> Result<u128> {
        let amount = self.escrow.take(caller)?;
        self.touched_escrow.insert(caller.clone());
        Ok(amount)
    }

    /// Record a payout that went through
    pub fn complete_withdrawal(&mut self, caller: &Address, amount: u128) {
        tracing::info!(recipient = %caller, amount = %amount, "Proceeds withdrawn");
        self.emit(RightsEvent::ProceedsWithdrawn {
            amount,
            recipient: caller.clone(),
            success: true,
        });
    }

    /// Put back the amount of a payout that failed with `cause`
    ///
    /// Returns the error to report to the caller.
    pub fn abort_withdrawal(&mut self, caller: &Address, amount: u128, cause: Error) -> Error {
        if let Err(e) = self.escrow.restore(caller, amount) {
            return e;
        }
        self.touched_escrow.insert(caller.clone());
        tracing::error!(
            recipient = %caller,
            amount = %amount,
            error = %cause,
            "Payout failed, balance restored"
        );
        Error::TransferFailed {
            recipient: caller.clone(),
            amount,
            reason: cause.to_string(),
        }
    }

    // Effects

    fn emit(&mut self, event: RightsEvent) {
        let record = EventRecord {
            sequence: self.next_sequence,
            event_id: Uuid::now_v7(),
            timestamp: self.now(),
            event,
        };
        self.next_sequence += 1;
        self.pending_events.push(record);
    }

    fn emit_all(&mut self, events: Vec<RightsEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Events emitted since the last commit
    pub fn pending_events(&self) -> &[EventRecord] {
        &self.pending_events
    }

    /// Drain the effects accumulated since the last commit
    pub fn take_commit(&mut self) -> Commit {
        let certificates = std::mem::take(&mut self.touched_certificates)
            .into_iter()
            .filter_map(|id| self.store.get(id).ok().cloned())
            .collect();
        let escrow = std::mem::take(&mut self.touched_escrow)
            .into_iter()
            .map(|address| {
                let balance = self.escrow.balance(&address);
                (address, balance)
            })
            .collect();

        Commit {
            certificates,
            escrow,
            events: std::mem::take(&mut self.pending_events),
            next_sequence: self.next_sequence,
        }
    }

    /// Full state, for persistence or inspection
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            certificates: self.store.iter().cloned().collect(),
            escrow: self
                .escrow
                .entries()
                .map(|(a, v)| (a.clone(), v))
                .collect(),
            next_sequence: self.next_sequence,
        }
    }
}
