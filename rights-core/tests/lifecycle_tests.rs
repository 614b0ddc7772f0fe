//! End-to-end lifecycle tests through the persisted, actor-backed service

use rights_core::{
    Address, CertificateId, Config, Error, ErrorKind, ManualClock, Payout, PayoutJournal,
    Result, RightsEvent, RightsService,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const START: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    config.registry.admin = "0xAD".to_string();
    config.rocksdb.sync_writes = false;
    config
}

fn open(dir: &TempDir, clock: &ManualClock, payout: Arc<dyn Payout>) -> RightsService {
    RightsService::open(test_config(dir), Arc::new(clock.clone()), payout).unwrap()
}

/// Payout whose availability can be switched off
#[derive(Default)]
struct FlakyPayout {
    offline: AtomicBool,
    journal: PayoutJournal,
}

impl Payout for FlakyPayout {
    fn transfer(&self, recipient: &Address, amount: u128) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "payment rail offline",
            )));
        }
        self.journal.transfer(recipient, amount)
    }
}

#[tokio::test]
async fn test_mint_lend_buy_overpaid() {
    let temp_dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(START);
    let service = open(&temp_dir, &clock, Arc::new(PayoutJournal::new()));
    let handle = service.handle().clone();
    let mut events = handle.subscribe();

    let artist = addr("0xA11CE");
    let borrower = addr("0xB0B");

    let id = handle.mint(artist.clone(), "tokenURIx").await.unwrap();
    assert_eq!(id, CertificateId(0));

    let cert = handle.certificate(id).await.unwrap();
    assert!(cert.valid);
    assert!(!cert.lendable);
    assert!(cert.licenses.is_empty());

    handle
        .allow_lending(artist.clone(), id, 1, 777)
        .await
        .unwrap();
    let cert = handle.certificate(id).await.unwrap();
    assert_eq!(cert.period, 86_400);
    assert_eq!(cert.price, 777);
    assert!(handle.lending_status(id).await.unwrap());

    let license = handle
        .buy_license(id, borrower.clone(), 778)
        .await
        .unwrap();
    assert_eq!(license.expires_at, START + DAY);
    assert_eq!(handle.proceeds(artist.clone()).await.unwrap(), 778);
    assert_eq!(
        handle.expiration_time(id, borrower.clone()).await.unwrap(),
        START + DAY
    );

    let clause = handle.clause(id, borrower.clone()).await.unwrap();
    assert!(clause.contains("The Artist: 0xa11ce"));
    assert!(clause.contains("0xb0b"));

    let mut tail = Vec::new();
    while let Ok(record) = events.try_recv() {
        tail.push(record.event);
    }
    let names: Vec<_> = tail.iter().map(RightsEvent::name).collect();
    assert_eq!(
        &names[names.len() - 2..],
        &["ClauseCreated", "LendingLicenseCreated"]
    );

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_license_validity_window() {
    let temp_dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(START);
    let service = open(&temp_dir, &clock, Arc::new(PayoutJournal::new()));
    let handle = service.handle().clone();
    let artist = addr("0xa11ce");
    let borrower = addr("0xb0b");

    let id = handle.mint(artist.clone(), "uri").await.unwrap();
    handle.allow_lending(artist.clone(), id, 1, 5).await.unwrap();
    handle.buy_license(id, borrower.clone(), 5).await.unwrap();

    // Same borrower cannot buy twice, nor can the owner
    let again = handle.buy_license(id, borrower.clone(), 5).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidState);
    let own = handle.buy_license(id, artist.clone(), 5).await.unwrap_err();
    assert!(matches!(own, Error::AddressHasRightsAlready { .. }));

    clock.advance(DAY - 1);
    assert!(handle.license_validity(id, borrower.clone()).await.unwrap());
    clock.advance(1);
    assert!(!handle.license_validity(id, borrower.clone()).await.unwrap());

    // Renewal does not wait for the sweep
    let renewed = handle.buy_license(id, borrower.clone(), 5).await.unwrap();
    assert_eq!(renewed.expires_at, START + 2 * DAY);
    assert_eq!(handle.borrowers(id).await.unwrap(), vec![borrower.clone()]);
    assert!(handle.license_validity(id, borrower.clone()).await.unwrap());
    assert!(!handle.check_upkeep().await.unwrap());
    assert_eq!(handle.proceeds(artist).await.unwrap(), 10);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sweep_leaves_other_certificates() {
    let temp_dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(START);
    let service = open(&temp_dir, &clock, Arc::new(PayoutJournal::new()));
    let handle = service.handle().clone();
    let artist = addr("0xa11ce");
    let borrower = addr("0xb0b");

    let first = handle.mint(artist.clone(), "one").await.unwrap();
    let second = handle.mint(artist.clone(), "two").await.unwrap();
    handle
        .allow_lending(artist.clone(), first, 1, 777)
        .await
        .unwrap();
    handle
        .buy_license(first, borrower.clone(), 777)
        .await
        .unwrap();

    let err = handle.perform_upkeep().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoWorkDue);

    clock.advance(DAY + 1);
    assert!(handle.check_upkeep().await.unwrap());
    handle.perform_upkeep().await.unwrap();

    assert!(handle.borrowers(first).await.unwrap().is_empty());
    assert!(handle.borrowers(second).await.unwrap().is_empty());
    assert!(handle.certificate(second).await.unwrap().valid);
    assert!(!handle.check_upkeep().await.unwrap());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_withdraw_and_failed_payout() {
    let temp_dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(START);
    let payout = Arc::new(FlakyPayout::default());
    let service = open(&temp_dir, &clock, payout.clone());
    let handle = service.handle().clone();
    let artist = addr("0xa11ce");

    let id = handle.mint(artist.clone(), "uri").await.unwrap();
    handle
        .allow_lending(artist.clone(), id, 2, 100)
        .await
        .unwrap();
    handle.buy_license(id, addr("0xb0b"), 150).await.unwrap();

    payout.offline.store(true, Ordering::SeqCst);
    let err = handle.withdraw_proceeds(artist.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailure);
    assert_eq!(handle.proceeds(artist.clone()).await.unwrap(), 150);
    assert_eq!(service.metrics().withdrawals_failed.get(), 1);

    payout.offline.store(false, Ordering::SeqCst);
    assert_eq!(
        handle.withdraw_proceeds(artist.clone()).await.unwrap(),
        150
    );
    assert_eq!(payout.journal.paid_to(&artist), 150);
    assert_eq!(handle.proceeds(artist.clone()).await.unwrap(), 0);

    let err = handle.withdraw_proceeds(artist).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingToWithdraw);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_revocation_blocks_new_business() {
    let temp_dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(START);
    let service = open(&temp_dir, &clock, Arc::new(PayoutJournal::new()));
    let handle = service.handle().clone();
    let artist = addr("0xa11ce");

    let id = handle.mint(artist.clone(), "uri").await.unwrap();

    let err = handle
        .revoke_certificate(artist.clone(), id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    handle.revoke_certificate(addr("0xad"), id).await.unwrap();
    let err = handle
        .allow_lending(artist, id, 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TokenNotValid(_)));

    let err = handle
        .revoke_certificate(addr("0xad"), CertificateId(42))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ownership_transfer_redirects_proceeds() {
    let temp_dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(START);
    let service = open(&temp_dir, &clock, Arc::new(PayoutJournal::new()));
    let handle = service.handle().clone();
    let artist = addr("0xa11ce");
    let gallery = addr("0x9a11e7y");

    let id = handle.mint(artist.clone(), "uri").await.unwrap();
    handle.allow_lending(artist.clone(), id, 1, 10).await.unwrap();
    handle.buy_license(id, addr("0xb1"), 10).await.unwrap();

    handle
        .transfer_ownership(artist.clone(), id, gallery.clone())
        .await
        .unwrap();
    assert_eq!(handle.owner_of(id).await.unwrap(), gallery);

    handle.buy_license(id, addr("0xb2"), 10).await.unwrap();
    assert_eq!(handle.proceeds(artist.clone()).await.unwrap(), 10);
    assert_eq!(handle.proceeds(gallery.clone()).await.unwrap(), 10);

    // Earlier licenses survive the transfer
    assert_eq!(
        handle.borrowers(id).await.unwrap(),
        vec![addr("0xb1"), addr("0xb2")]
    );

    let err = handle.block_lending(artist, id).await.unwrap_err();
    assert!(matches!(err, Error::NotTokenOwner { .. }));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(START);
    let artist = addr("0xa11ce");
    let borrower = addr("0xb0b");

    {
        let service = open(&temp_dir, &clock, Arc::new(PayoutJournal::new()));
        let handle = service.handle().clone();
        let id = handle.mint(artist.clone(), "uri").await.unwrap();
        handle.mint(artist.clone(), "second").await.unwrap();
        handle.allow_lending(artist.clone(), id, 3, 42).await.unwrap();
        handle.buy_license(id, borrower.clone(), 42).await.unwrap();
        service.shutdown().await.unwrap();
    }

    let service = open(&temp_dir, &clock, Arc::new(PayoutJournal::new()));
    let handle = service.handle().clone();

    assert_eq!(handle.emitted_count().await.unwrap(), 2);
    assert_eq!(handle.proceeds(artist.clone()).await.unwrap(), 42);
    assert!(handle
        .license_validity(CertificateId(0), borrower.clone())
        .await
        .unwrap());
    assert_eq!(handle.token_uri(CertificateId(1)).await.unwrap(), "second");

    // Ids continue from the persisted counter, events from the persisted sequence
    let before = service.events_since(0, 1_000).unwrap().len() as u64;
    let id = handle.mint(artist, "third").await.unwrap();
    assert_eq!(id, CertificateId(2));
    let journal = service.events_since(before, 10).unwrap();
    assert_eq!(journal.len(), 2);
    assert_eq!(journal[0].sequence, before);

    service.shutdown().await.unwrap();
}
