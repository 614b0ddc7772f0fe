//! Expiration sweeper
//!
//! Two-phase upkeep protocol driven by an external scheduler:
//!
//! - [`check_upkeep`] is read-only and reports whether any license has
//!   outlived its period.
//! - [`perform_upkeep`] removes every expired license across every
//!   certificate in a single pass, or fails with `UpkeepNotNeeded`.
//!
//! A license is expired once `now >= expires_at`, the same boundary at which
//! validity queries start returning false.

use crate::{
    store::CertificateStore,
    types::{RightsEvent, UnixSeconds, UpkeepReport},
    Error, Result,
};

/// Whether a sweep would remove anything at `now`
pub fn check_upkeep(store: &CertificateStore, now: UnixSeconds) -> bool {
    store.iter().any(|c| c.has_expired_licenses(now))
}

/// Remove all expired licenses
///
/// Survivors keep their relative grant order.
pub fn perform_upkeep(
    store: &mut CertificateStore,
    now: UnixSeconds,
) -> Result<(UpkeepReport, RightsEvent)> {
    if !check_upkeep(store, now) {
        return Err(Error::UpkeepNotNeeded);
    }

    let mut report = UpkeepReport::default();
    for certificate in store.iter_mut() {
        if !certificate.has_expired_licenses(now) {
            continue;
        }

        let id = certificate.id;
        let before = report.removed.len();
        certificate.licenses.retain(|license| {
            if license.is_expired(now) {
                report.removed.push((id, license.borrower.clone()));
                false
            } else {
                true
            }
        });

        tracing::debug!(
            id = %id,
            removed = report.removed.len() - before,
            remaining = certificate.licenses.len(),
            "Expired licenses removed from certificate"
        );
        report.certificates_touched.push(id);
    }

    tracing::info!(
        certificates = report.certificates_touched.len(),
        removed = report.licenses_removed(),
        "Upkeep performed"
    );

    let event = RightsEvent::ExpiredLicensesRemoved {
        removed: report.licenses_removed(),
    };
    Ok((report, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, CertificateId, License};

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn license(borrower: &str, expires_at: UnixSeconds) -> License {
        License {
            borrower: addr(borrower),
            clause: format!("clause for {}", borrower),
            clause_digest: [0u8; 32],
            clause_signature: None,
            granted_at: 0,
            expires_at,
            price_paid: 1,
        }
    }

    fn store_with(licenses: Vec<Vec<License>>) -> CertificateStore {
        let mut store = CertificateStore::new();
        for set in licenses {
            let id = store.mint(addr("0xa11ce"), String::new(), 0);
            store.get_mut(id).unwrap().licenses = set;
        }
        store
    }

    #[test]
    fn test_check_upkeep_is_read_only() {
        let store = store_with(vec![vec![license("0xb0b", 100)]]);

        assert!(!check_upkeep(&store, 99));
        assert!(check_upkeep(&store, 100));
        assert_eq!(store.get(CertificateId(0)).unwrap().licenses.len(), 1);
    }

    #[test]
    fn test_perform_upkeep_nothing_due() {
        let mut store = store_with(vec![vec![license("0xb0b", 100)], vec![]]);
        assert!(matches!(perform_upkeep(&mut store, 50), Err(Error::UpkeepNotNeeded)));
    }

    #[test]
    fn test_perform_upkeep_removes_only_expired() {
        let mut store = store_with(vec![
            vec![
                license("0x01", 100),
                license("0x02", 300),
                license("0x03", 150),
                license("0x04", 400),
            ],
            vec![license("0x05", 500)],
            vec![license("0x06", 120)],
        ]);

        let (report, event) = perform_upkeep(&mut store, 200).unwrap();
        assert_eq!(event, RightsEvent::ExpiredLicensesRemoved { removed: 3 });
        assert_eq!(
            report.certificates_touched,
            vec![CertificateId(0), CertificateId(2)]
        );
        assert_eq!(
            report.removed,
            vec![
                (CertificateId(0), addr("0x01")),
                (CertificateId(0), addr("0x03")),
                (CertificateId(2), addr("0x06")),
            ]
        );

        assert_eq!(
            store.get(CertificateId(0)).unwrap().borrowers(),
            vec![addr("0x02"), addr("0x04")]
        );
        assert_eq!(store.get(CertificateId(1)).unwrap().borrowers(), vec![addr("0x05")]);
        assert!(store.get(CertificateId(2)).unwrap().licenses.is_empty());
    }

    #[test]
    fn test_perform_upkeep_twice_fails_second_time() {
        let mut store = store_with(vec![vec![license("0xb0b", 10)]]);

        perform_upkeep(&mut store, 10).unwrap();
        assert!(matches!(perform_upkeep(&mut store, 10), Err(Error::UpkeepNotNeeded)));
    }
}
