//! Licensing engine
//!
//! Lending configuration, license purchase and clause generation. Every
//! operation checks all of its preconditions before the first write, so a
//! rejected call leaves the store and the escrow ledger untouched.
//!
//! # Purchase checks (in order)
//!
//! 1. certificate exists
//! 2. certificate is valid (not revoked)
//! 3. borrower is neither the owner nor the holder of an unexpired license
//! 4. certificate is lendable
//! 5. paid amount covers the price

use crate::{
    crypto::{clause_digest, KeyPair},
    escrow::EscrowLedger,
    store::CertificateStore,
    types::{
        Address, Certificate, CertificateId, License, RightsEvent, UnixSeconds, SECONDS_PER_DAY,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};

/// Borrowed view over the state a licensing call may touch
#[derive(Debug)]
pub struct LicensingEngine<'a> {
    store: &'a mut CertificateStore,
    escrow: &'a mut EscrowLedger,
    signer: Option<&'a KeyPair>,
    now: UnixSeconds,
}

impl<'a> LicensingEngine<'a> {
    /// Bind the engine to registry state at time `now`
    pub fn new(
        store: &'a mut CertificateStore,
        escrow: &'a mut EscrowLedger,
        signer: Option<&'a KeyPair>,
        now: UnixSeconds,
    ) -> Self {
        Self {
            store,
            escrow,
            signer,
            now,
        }
    }

    /// Open a certificate for lending
    ///
    /// `min_period_days` is a day count; the stored period is in seconds.
    pub fn allow_lending(
        &mut self,
        caller: &Address,
        id: CertificateId,
        min_period_days: u64,
        price: u128,
    ) -> Result<Vec<RightsEvent>> {
        let certificate = self.store.get(id)?;
        require_owner(certificate, caller)?;
        if !certificate.valid {
            return Err(Error::TokenNotValid(id));
        }
        if certificate.lendable {
            return Err(Error::TokenAlreadyAllowed(id));
        }
        if min_period_days == 0 {
            return Err(Error::InvalidPeriod(min_period_days));
        }
        let period = min_period_days
            .checked_mul(SECONDS_PER_DAY)
            .ok_or_else(|| Error::Overflow(format!("lending period of {} days", min_period_days)))?;

        let certificate = self.store.get_mut(id)?;
        certificate.lendable = true;
        certificate.price = price;
        certificate.period = period;

        tracing::info!(id = %id, price = %price, period, "Lending allowed");

        Ok(vec![RightsEvent::LendingAllowed { id, price, period }])
    }

    /// Close a certificate for lending; granted licenses stay in place
    pub fn block_lending(&mut self, caller: &Address, id: CertificateId) -> Result<Vec<RightsEvent>> {
        let certificate = self.store.get(id)?;
        require_owner(certificate, caller)?;
        if !certificate.lendable {
            return Err(Error::TokenAlreadyBlocked(id));
        }

        self.store.get_mut(id)?.lendable = false;

        tracing::info!(id = %id, "Lending blocked");

        Ok(vec![RightsEvent::LendingBlocked { id }])
    }

    /// Sell a license to `borrower`
    ///
    /// The full `paid` amount is credited to the current owner; paying more
    /// than the price is accepted and the surplus goes to the lender.
    pub fn buy_license(
        &mut self,
        id: CertificateId,
        borrower: &Address,
        paid: u128,
    ) -> Result<(License, Vec<RightsEvent>)> {
        let certificate = self.store.get(id)?;
        if !certificate.valid {
            return Err(Error::TokenNotValid(id));
        }
        if certificate.has_rights(borrower, self.now) {
            return Err(Error::AddressHasRightsAlready {
                id,
                address: borrower.clone(),
            });
        }
        if !certificate.lendable {
            return Err(Error::TokenNotBorrowable(id));
        }
        if paid < certificate.price {
            return Err(Error::NotEnoughFunds {
                paid,
                price: certificate.price,
            });
        }
        let expires_at = self
            .now
            .checked_add(certificate.period)
            .ok_or_else(|| Error::Overflow(format!("license expiry on token {}", id)))?;
        let owner = certificate.owner.clone();
        if !self.escrow.can_credit(&owner, paid) {
            return Err(Error::Overflow(format!("escrow balance of {}", owner)));
        }

        let clause = create_clause(certificate, borrower, paid, self.now, expires_at);
        let digest = clause_digest(&clause);
        let license = License {
            borrower: borrower.clone(),
            clause: clause.clone(),
            clause_digest: digest,
            clause_signature: self.signer.map(|k| k.sign(&digest)),
            granted_at: self.now,
            expires_at,
            price_paid: paid,
        };

        // Effects
        self.escrow.credit(&owner, paid)?;
        let licenses = &mut self.store.get_mut(id)?.licenses;
        // An expired entry the sweep has not reached yet is replaced
        licenses.retain(|l| &l.borrower != borrower);
        licenses.push(license.clone());

        tracing::info!(
            id = %id,
            owner = %owner,
            borrower = %borrower,
            paid = %paid,
            expires_at,
            "License created"
        );

        let events = vec![
            RightsEvent::ClauseCreated {
                id,
                borrower: borrower.clone(),
                clause,
            },
            RightsEvent::LicenseCreated {
                id,
                owner,
                borrower: borrower.clone(),
                expires_at,
                paid,
            },
        ];

        Ok((license, events))
    }
}

fn require_owner(certificate: &Certificate, caller: &Address) -> Result<()> {
    if &certificate.owner != caller {
        return Err(Error::NotTokenOwner {
            id: certificate.id,
            caller: caller.clone(),
        });
    }
    Ok(())
}

fn format_time(ts: UnixSeconds) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// Human-readable license terms captured at grant time
pub fn create_clause(
    certificate: &Certificate,
    borrower: &Address,
    paid: u128,
    granted_at: UnixSeconds,
    expires_at: UnixSeconds,
) -> String {
    let days = certificate.period / SECONDS_PER_DAY;
    format!(
        "DIGITAL RIGHTS LICENSE\n\
         Certificate: #{id} ({uri})\n\
         The Artist: {owner}\n\
         The Borrower: {borrower}\n\
         The Artist grants The Borrower a non-exclusive right to use the work \
         identified by certificate #{id} for {days} day(s) ({period} seconds), \
         from {from} until {until}.\n\
         Price: {price}. Paid: {paid}.\n\
         The right ends automatically at expiry and may not be transferred.",
        id = certificate.id,
        uri = certificate.uri,
        owner = certificate.owner,
        borrower = borrower,
        days = days,
        period = certificate.period,
        from = format_time(granted_at),
        until = format_time(expires_at),
        price = certificate.price,
        paid = paid,
    )
}
