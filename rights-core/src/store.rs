//! Certificate store
//!
//! Arena of certificates indexed by their sequential id. Certificates are
//! never deleted, so the arena length doubles as the mint counter and an id
//! can never be handed out twice.

use crate::{
    types::{Address, Certificate, CertificateId, UnixSeconds},
    Error, Result,
};

/// Owner of all mutable certificate state
#[derive(Debug, Clone, Default)]
pub struct CertificateStore {
    certificates: Vec<Certificate>,
}

impl CertificateStore {
    /// Empty store; the first mint returns id 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted certificates
    ///
    /// Ids must be exactly `0..n` so the counter stays consistent.
    pub fn from_certificates(mut certificates: Vec<Certificate>) -> Result<Self> {
        certificates.sort_by_key(|c| c.id);
        for (index, certificate) in certificates.iter().enumerate() {
            if certificate.id.index() != index {
                return Err(Error::Storage(format!(
                    "certificate ids are not contiguous: expected {}, found {}",
                    index, certificate.id
                )));
            }
        }
        Ok(Self { certificates })
    }

    /// Allocate the next id and record a fresh certificate
    pub fn mint(&mut self, owner: Address, uri: String, now: UnixSeconds) -> CertificateId {
        let id = CertificateId(self.certificates.len() as u64);
        self.certificates
            .push(Certificate::new(id, owner, uri, now));
        id
    }

    /// Number of certificates ever minted
    pub fn emitted_count(&self) -> u64 {
        self.certificates.len() as u64
    }

    /// Existence check
    pub fn exists(&self, id: CertificateId) -> bool {
        id.0 < self.emitted_count()
    }

    /// Get certificate
    pub fn get(&self, id: CertificateId) -> Result<&Certificate> {
        self.certificates
            .get(id.index())
            .filter(|_| self.exists(id))
            .ok_or(Error::TokenNotExist(id))
    }

    /// Get certificate for mutation
    pub fn get_mut(&mut self, id: CertificateId) -> Result<&mut Certificate> {
        if !self.exists(id) {
            return Err(Error::TokenNotExist(id));
        }
        self.certificates
            .get_mut(id.index())
            .ok_or(Error::TokenNotExist(id))
    }

    /// Current owner
    pub fn owner_of(&self, id: CertificateId) -> Result<&Address> {
        Ok(&self.get(id)?.owner)
    }

    /// Certificates in id order
    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    /// Certificates in id order, mutable
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Certificate> {
        self.certificates.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn test_mint_assigns_sequential_ids() {
        let mut store = CertificateStore::new();
        assert_eq!(store.emitted_count(), 0);

        let first = store.mint(addr("0xa11ce"), "ipfs://one".to_string(), 1);
        let second = store.mint(addr("0xb0b"), "ipfs://two".to_string(), 2);

        assert_eq!(first, CertificateId(0));
        assert_eq!(second, CertificateId(1));
        assert_eq!(store.emitted_count(), 2);
        assert_eq!(store.owner_of(second).unwrap(), &addr("0xb0b"));
        assert_eq!(store.get(first).unwrap().uri, "ipfs://one");
    }

    #[test]
    fn test_get_unknown_id() {
        let mut store = CertificateStore::new();
        store.mint(addr("0xa11ce"), String::new(), 0);

        assert!(matches!(
            store.get(CertificateId(1)),
            Err(Error::TokenNotExist(CertificateId(1)))
        ));
        assert!(store.get_mut(CertificateId(9)).is_err());
        assert!(!store.exists(CertificateId(1)));
    }

    #[test]
    fn test_from_certificates_requires_contiguous_ids() {
        let owner = addr("0xa11ce");
        let restored = CertificateStore::from_certificates(vec![
            Certificate::new(CertificateId(1), owner.clone(), String::new(), 0),
            Certificate::new(CertificateId(0), owner.clone(), String::new(), 0),
        ])
        .unwrap();
        assert_eq!(restored.emitted_count(), 2);
        assert_eq!(restored.iter().next().unwrap().id, CertificateId(0));

        let gap = CertificateStore::from_certificates(vec![Certificate::new(
            CertificateId(2),
            owner,
            String::new(),
            0,
        )]);
        assert!(gap.is_err());
    }
}
