//! Digital Rights Maykr registry core
//!
//! Registry of digital-rights certificates with time-limited usage licenses.
//!
//! # Architecture
//!
//! - **Certificate store**: sequential ids, never deleted, owner and content pointer
//! - **Licensing engine**: lending configuration, purchase checks, clause snapshots
//! - **Expiration sweeper**: two-phase `check_upkeep` / `perform_upkeep`
//! - **Escrow ledger**: pull-based proceeds with a pluggable payout
//! - **Single writer**: one actor task owns the registry and commits to RocksDB
//!
//! # Invariants
//!
//! - Ids are assigned 0, 1, 2, ... and never reused
//! - Revocation is permanent
//! - At most one license per (certificate, borrower) pair
//! - A rejected call changes nothing
//! - Escrow balances equal what was paid in minus what was withdrawn

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod escrow;
pub mod licensing;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod storage;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-exports
pub use actor::RegistryHandle;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use escrow::{Payout, PayoutJournal};
pub use registry::Registry;
pub use service::RightsService;
pub use storage::{Persistence, Storage};
pub use types::{
    Address, Certificate, CertificateId, EventRecord, License, RightsEvent, Signature,
    UnixSeconds, UpkeepReport,
};
