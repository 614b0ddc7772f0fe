//! Core types for the rights registry
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact integer arithmetic (u128 for amounts, u64 unix seconds for time)
//! - Memory safety (no unsafe code)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Seconds in one lending day. `allow_lending` takes day counts.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Registry name exposed to clients
pub const REGISTRY_NAME: &str = "Digital Rights Maykr";

/// Registry symbol exposed to clients
pub const REGISTRY_SYMBOL: &str = "DRM";

/// Unix timestamp in seconds
pub type UnixSeconds = u64;

/// Unique event identifier (UUIDv7, time-ordered)
pub type EventId = Uuid;

/// Account address (owner, borrower, admin)
///
/// Stored lowercase so comparisons and clause text are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create a normalized address, rejecting empty input
    pub fn new(address: impl AsRef<str>) -> Result<Self> {
        let normalized = address.as_ref().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::InvalidAddress("address is empty".to_string()));
        }
        if normalized.chars().any(char::is_whitespace) {
            return Err(Error::InvalidAddress(normalized));
        }
        Ok(Self(normalized))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::new(s)
    }
}

/// Sequential certificate identifier, starting at 0
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CertificateId(pub u64);

impl CertificateId {
    /// Big-endian key bytes (keeps RocksDB iteration in id order)
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Index into the certificate arena
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CertificateId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Digital signature (Ed25519)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    bytes: Vec<u8>,
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verify signature
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        crate::crypto::verify_signature(message, self, public_key)
    }
}

/// Active usage grant from a certificate owner to a borrower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Borrower holding the rights
    pub borrower: Address,

    /// Human-readable terms captured at grant time
    pub clause: String,

    /// SHA-256 of the clause text
    pub clause_digest: [u8; 32],

    /// Operator signature over the clause digest (when signing is enabled)
    pub clause_signature: Option<Signature>,

    /// Grant time
    pub granted_at: UnixSeconds,

    /// Expiry time (granted_at + period)
    pub expires_at: UnixSeconds,

    /// Amount paid by the borrower
    pub price_paid: u128,
}

impl License {
    /// Whether the license still grants usage at `now`
    pub fn is_active(&self, now: UnixSeconds) -> bool {
        now < self.expires_at
    }

    /// Whether the license is due for removal at `now`
    pub fn is_expired(&self, now: UnixSeconds) -> bool {
        !self.is_active(now)
    }
}

/// Rights certificate (non-fungible record)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Sequential identifier
    pub id: CertificateId,

    /// Current owner
    pub owner: Address,

    /// Content pointer set at mint time
    pub uri: String,

    /// False once revoked, never true again
    pub valid: bool,

    /// Open for license purchases
    pub lendable: bool,

    /// Minimum payment per license
    pub price: u128,

    /// Lending window in seconds
    pub period: u64,

    /// Active licenses in grant order
    pub licenses: Vec<License>,

    /// Mint time
    pub minted_at: UnixSeconds,
}

impl Certificate {
    /// Fresh certificate as produced by mint
    pub fn new(id: CertificateId, owner: Address, uri: String, minted_at: UnixSeconds) -> Self {
        Self {
            id,
            owner,
            uri,
            valid: true,
            lendable: false,
            price: 0,
            period: 0,
            licenses: Vec::new(),
            minted_at,
        }
    }

    /// License held by `borrower`, if any
    pub fn license(&self, borrower: &Address) -> Option<&License> {
        self.licenses.iter().find(|l| &l.borrower == borrower)
    }

    /// Whether `address` holds a license still active at `now`
    pub fn license_valid(&self, address: &Address, now: UnixSeconds) -> bool {
        self.license(address)
            .map(|l| l.is_active(now))
            .unwrap_or(false)
    }

    /// Owner or holder of a license still active at `now`
    ///
    /// A borrower whose license has expired but not yet been swept holds no
    /// rights and may buy again.
    pub fn has_rights(&self, address: &Address, now: UnixSeconds) -> bool {
        &self.owner == address || self.license_valid(address, now)
    }

    /// Borrowers in grant order
    pub fn borrowers(&self) -> Vec<Address> {
        self.licenses.iter().map(|l| l.borrower.clone()).collect()
    }

    /// Whether any license has outlived its period at `now`
    pub fn has_expired_licenses(&self, now: UnixSeconds) -> bool {
        self.licenses.iter().any(|l| l.is_expired(now))
    }
}

/// Registry event (observability and external indexing)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RightsEvent {
    /// Certificate minted
    Minted {
        /// Minter and initial owner
        owner: Address,
        /// New certificate id
        id: CertificateId,
    },

    /// Content pointer recorded
    TokenUriSet {
        /// Content pointer
        uri: String,
        /// Certificate id
        id: CertificateId,
    },

    /// Ownership moved to a new address
    OwnershipTransferred {
        /// Certificate id
        id: CertificateId,
        /// Previous owner
        from: Address,
        /// New owner
        to: Address,
    },

    /// Lending opened
    LendingAllowed {
        /// Certificate id
        id: CertificateId,
        /// License price
        price: u128,
        /// Lending period in seconds
        period: u64,
    },

    /// Lending closed
    LendingBlocked {
        /// Certificate id
        id: CertificateId,
    },

    /// Clause generated for a purchase
    ClauseCreated {
        /// Certificate id
        id: CertificateId,
        /// Borrower
        borrower: Address,
        /// Clause text
        clause: String,
    },

    /// License granted
    LicenseCreated {
        /// Certificate id
        id: CertificateId,
        /// Lender (certificate owner)
        owner: Address,
        /// Borrower
        borrower: Address,
        /// Expiry time
        expires_at: UnixSeconds,
        /// Amount paid
        paid: u128,
    },

    /// Certificate revoked by the administrator
    Revoked {
        /// Certificate id
        id: CertificateId,
    },

    /// Expired licenses swept
    ExpiredLicensesRemoved {
        /// Number of licenses removed
        removed: usize,
    },

    /// Proceeds paid out
    ProceedsWithdrawn {
        /// Amount paid out
        amount: u128,
        /// Recipient
        recipient: Address,
        /// Transfer outcome
        success: bool,
    },
}

impl RightsEvent {
    /// Event name as used by indexers
    pub fn name(&self) -> &'static str {
        match self {
            RightsEvent::Minted { .. } => "Minted",
            RightsEvent::TokenUriSet { .. } => "TokenUriSet",
            RightsEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
            RightsEvent::LendingAllowed { .. } => "LendingAllowed",
            RightsEvent::LendingBlocked { .. } => "LendingBlocked",
            RightsEvent::ClauseCreated { .. } => "ClauseCreated",
            RightsEvent::LicenseCreated { .. } => "LendingLicenseCreated",
            RightsEvent::Revoked { .. } => "Revoked",
            RightsEvent::ExpiredLicensesRemoved { .. } => "ExpiredLicensesRemoved",
            RightsEvent::ProceedsWithdrawn { .. } => "ProceedsWithdrawn",
        }
    }
}

/// Journaled event with ordering metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the journal (0-based, gapless)
    pub sequence: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: EventId,

    /// Registry time when the event was emitted
    pub timestamp: UnixSeconds,

    /// Payload
    pub event: RightsEvent,
}

/// Outcome of a sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpkeepReport {
    /// Certificates that lost at least one license
    pub certificates_touched: Vec<CertificateId>,

    /// Removed (certificate, borrower) pairs in scan order
    pub removed: Vec<(CertificateId, Address)>,
}

impl UpkeepReport {
    /// Number of licenses removed
    pub fn licenses_removed(&self) -> usize {
        self.removed.len()
    }
}
