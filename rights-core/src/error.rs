//! Error types for the rights registry

use crate::types::{Address, CertificateId};
use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Registry errors
///
/// Every rejected precondition maps to one variant. A call that returns an
/// error leaves certificates, licenses and escrow exactly as they were.
#[derive(Error, Debug)]
pub enum Error {
    /// Certificate id was never minted
    #[error("Token does not exist: {0}")]
    TokenNotExist(CertificateId),

    /// Caller does not own the certificate
    #[error("Caller {caller} is not the owner of token {id}")]
    NotTokenOwner {
        /// Certificate id
        id: CertificateId,
        /// Rejected caller
        caller: Address,
    },

    /// Caller is not the registry administrator
    #[error("Caller {0} is not the registry administrator")]
    NotRegistryAdmin(Address),

    /// Certificate has been revoked
    #[error("Token {0} is not valid (revoked)")]
    TokenNotValid(CertificateId),

    /// Lending already allowed for the certificate
    #[error("Lending already allowed for token {0}")]
    TokenAlreadyAllowed(CertificateId),

    /// Lending already blocked for the certificate
    #[error("Lending already blocked for token {0}")]
    TokenAlreadyBlocked(CertificateId),

    /// Certificate is not open for lending
    #[error("Token {0} is not borrowable")]
    TokenNotBorrowable(CertificateId),

    /// Borrower owns the certificate or already holds a license on it
    #[error("Address {address} has rights to token {id} already")]
    AddressHasRightsAlready {
        /// Certificate id
        id: CertificateId,
        /// Borrower address
        address: Address,
    },

    /// Paid amount is below the license price
    #[error("Not enough funds: paid {paid}, price {price}")]
    NotEnoughFunds {
        /// Amount supplied by the buyer
        paid: u128,
        /// Price configured by the owner
        price: u128,
    },

    /// Lending period must be at least one day
    #[error("Invalid lending period: {0} days")]
    InvalidPeriod(u64),

    /// Address is empty or otherwise unusable
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No license exists for the (certificate, borrower) pair
    #[error("No license on token {id} for {borrower}")]
    LicenseNotFound {
        /// Certificate id
        id: CertificateId,
        /// Borrower address
        borrower: Address,
    },

    /// Sweep executed while no license is expired
    #[error("Upkeep not needed")]
    UpkeepNotNeeded,

    /// Caller has a zero escrow balance
    #[error("Nothing to withdraw for {0}")]
    NothingToWithdraw(Address),

    /// External payout did not complete; the balance was restored
    #[error("Transfer of {amount} to {recipient} failed: {reason}")]
    TransferFailed {
        /// Recipient of the payout
        recipient: Address,
        /// Amount that was attempted
        amount: u128,
        /// Reason reported by the payout collaborator
        reason: String,
    },

    /// Arithmetic overflow on amounts or durations
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Signature creation or verification failed
    #[error("Signature error: {0}")]
    SignatureError(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error taxonomy exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced certificate or license does not exist
    NotFound,
    /// Caller lacks ownership or the admin role
    PermissionDenied,
    /// Certificate or license is in the wrong state for the call
    InvalidState,
    /// Paid amount below price
    InsufficientPayment,
    /// Sweep has nothing to do
    NoWorkDue,
    /// Zero escrow balance
    NothingToWithdraw,
    /// Payout transfer failed
    TransferFailure,
    /// Malformed argument
    InvalidInput,
    /// Storage, serialization, channel or configuration fault
    Infrastructure,
}

impl Error {
    /// Map to the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TokenNotExist(_) | Error::LicenseNotFound { .. } => ErrorKind::NotFound,
            Error::NotTokenOwner { .. } | Error::NotRegistryAdmin(_) => {
                ErrorKind::PermissionDenied
            }
            Error::TokenNotValid(_)
            | Error::TokenAlreadyAllowed(_)
            | Error::TokenAlreadyBlocked(_)
            | Error::TokenNotBorrowable(_)
            | Error::AddressHasRightsAlready { .. } => ErrorKind::InvalidState,
            Error::NotEnoughFunds { .. } => ErrorKind::InsufficientPayment,
            Error::UpkeepNotNeeded => ErrorKind::NoWorkDue,
            Error::NothingToWithdraw(_) => ErrorKind::NothingToWithdraw,
            Error::TransferFailed { .. } => ErrorKind::TransferFailure,
            Error::InvalidPeriod(_) | Error::InvalidAddress(_) | Error::Overflow(_) => {
                ErrorKind::InvalidInput
            }
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::SignatureError(_)
            | Error::Concurrency(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
