//! Actor-based concurrency for the registry
//!
//! Single-writer pattern using a Tokio actor:
//! - One task owns the [`Registry`], so every operation is linearizable
//! - Each successful call is persisted in one RocksDB batch before the reply
//! - Withdrawals persist the zeroed balance before any funds leave
//! - Bounded mailbox gives callers backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │   Callers (keeper, API layer, tests)         │
//! └─────────────────────┬────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │          RegistryHandle (Clone)              │
//! └─────────────────────┬────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │          RegistryActor (single task)         │
//! │   Registry ──► Commit ──► Storage::commit()  │
//! │                   └────► broadcast events    │
//! └──────────────────────────────────────────────┘
//! ```

use crate::{
    config::ActorConfig,
    escrow::Payout,
    metrics::Metrics,
    registry::Registry,
    storage::Persistence,
    types::{Address, Certificate, CertificateId, EventRecord, License, UnixSeconds, UpkeepReport},
    Error, Result,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot};

type Query = Box<dyn FnOnce(&Registry) + Send>;

/// Message sent to the registry actor
pub enum RegistryMessage {
    /// Mint a certificate
    Mint {
        caller: Address,
        uri: String,
        response: oneshot::Sender<Result<CertificateId>>,
    },

    /// Hand a certificate to a new owner
    TransferOwnership {
        caller: Address,
        id: CertificateId,
        new_owner: Address,
        response: oneshot::Sender<Result<()>>,
    },

    /// Open lending
    AllowLending {
        caller: Address,
        id: CertificateId,
        min_period_days: u64,
        price: u128,
        response: oneshot::Sender<Result<()>>,
    },

    /// Close lending
    BlockLending {
        caller: Address,
        id: CertificateId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Buy a license
    BuyLicense {
        id: CertificateId,
        borrower: Address,
        paid: u128,
        response: oneshot::Sender<Result<License>>,
    },

    /// Revoke a certificate
    Revoke {
        caller: Address,
        id: CertificateId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Sweep expired licenses
    PerformUpkeep {
        response: oneshot::Sender<Result<UpkeepReport>>,
    },

    /// Pay out escrow
    Withdraw {
        caller: Address,
        response: oneshot::Sender<Result<u128>>,
    },

    /// Read-only access to the registry
    Query(Query),

    /// Shutdown actor; answered once the actor has released its state
    Shutdown { response: oneshot::Sender<()> },
}

/// Actor that owns the registry
pub struct RegistryActor {
    registry: Registry,
    storage: Option<Arc<dyn Persistence>>,
    payout: Arc<dyn Payout>,
    metrics: Metrics,
    events: broadcast::Sender<EventRecord>,
    mailbox: mpsc::Receiver<RegistryMessage>,
}

impl RegistryActor {
    /// Create new actor
    pub fn new(
        registry: Registry,
        storage: Option<Arc<dyn Persistence>>,
        payout: Arc<dyn Payout>,
        metrics: Metrics,
        events: broadcast::Sender<EventRecord>,
        mailbox: mpsc::Receiver<RegistryMessage>,
    ) -> Self {
        metrics.update_escrow_outstanding(registry.total_escrow());
        Self {
            registry,
            storage,
            payout,
            metrics,
            events,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut shutdown_ack = None;

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                RegistryMessage::Shutdown { response } => {
                    shutdown_ack = Some(response);
                    break;
                }
                msg => self.handle_message(msg),
            }
        }

        // Release storage before acknowledging so the database can be reopened
        drop(self);
        tracing::info!("Registry actor stopped");
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn handle_message(&mut self, msg: RegistryMessage) {
        match msg {
            RegistryMessage::Mint {
                caller,
                uri,
                response,
            } => {
                let result = self.apply(|r| Ok(r.mint(&caller, uri)));
                if result.is_ok() {
                    self.metrics.record_mint();
                }
                let _ = response.send(result);
            }

            RegistryMessage::TransferOwnership {
                caller,
                id,
                new_owner,
                response,
            } => {
                let result = self.apply(|r| r.transfer_ownership(&caller, id, &new_owner));
                let _ = response.send(result);
            }

            RegistryMessage::AllowLending {
                caller,
                id,
                min_period_days,
                price,
                response,
            } => {
                let result = self.apply(|r| r.allow_lending(&caller, id, min_period_days, price));
                let _ = response.send(result);
            }

            RegistryMessage::BlockLending {
                caller,
                id,
                response,
            } => {
                let result = self.apply(|r| r.block_lending(&caller, id));
                let _ = response.send(result);
            }

            RegistryMessage::BuyLicense {
                id,
                borrower,
                paid,
                response,
            } => {
                let result = self.apply(|r| r.buy_license(id, &borrower, paid));
                if let Ok(license) = &result {
                    self.metrics.record_license_sold(license.price_paid);
                }
                let _ = response.send(result);
            }

            RegistryMessage::Revoke {
                caller,
                id,
                response,
            } => {
                let result = self.apply(|r| r.revoke_certificate(&caller, id));
                let _ = response.send(result);
            }

            RegistryMessage::PerformUpkeep { response } => {
                let result = self.apply(|r| r.perform_upkeep());
                if let Ok(report) = &result {
                    self.metrics.record_upkeep(report.licenses_removed());
                }
                let _ = response.send(result);
            }

            RegistryMessage::Withdraw { caller, response } => {
                let result = self.withdraw(&caller);
                match &result {
                    Ok(amount) => self.metrics.record_withdrawal(*amount),
                    Err(Error::TransferFailed { .. }) => self.metrics.record_withdrawal_failed(),
                    Err(_) => {}
                }
                let _ = response.send(result);
            }

            RegistryMessage::Query(query) => query(&self.registry),

            RegistryMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Run one mutating operation, persist its effects and publish its events
    fn apply<T>(&mut self, op: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let result = op(&mut self.registry);
        self.metrics
            .record_command_duration(started.elapsed().as_secs_f64());

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_rejected();
                tracing::debug!(error = %e, "Call rejected");
                return Err(e);
            }
        };

        self.persist()?;
        Ok(value)
    }

    /// Withdrawal in three steps: persist the zeroed entry, pay out, then
    /// persist either the withdrawal event or the restored balance
    fn withdraw(&mut self, caller: &Address) -> Result<u128> {
        let amount = self.apply(|r| r.begin_withdrawal(caller))?;

        match self.payout.transfer(caller, amount) {
            Ok(()) => {
                self.registry.complete_withdrawal(caller, amount);
                if let Err(e) = self.persist() {
                    // Funds are gone and the zero is already on disk
                    tracing::error!(
                        recipient = %caller,
                        amount = %amount,
                        error = %e,
                        "Withdrawal paid out but its event was not journaled"
                    );
                }
                Ok(amount)
            }
            Err(e) => {
                let failure = self.registry.abort_withdrawal(caller, amount, e);
                if let Err(e) = self.persist() {
                    tracing::error!(
                        recipient = %caller,
                        amount = %amount,
                        error = %e,
                        "Restored balance not persisted, entry stays zero until reconciled"
                    );
                }
                Err(failure)
            }
        }
    }

    /// Commit pending effects; on failure fall back to the stored state
    fn persist(&mut self) -> Result<()> {
        let commit = self.registry.take_commit();
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.commit(&commit) {
                tracing::error!(error = %e, "Commit failed, reloading registry from storage");
                match storage.load() {
                    Ok(snapshot) => {
                        if let Err(reload) = self.registry.reset(snapshot) {
                            tracing::error!(error = %reload, "Registry reload failed");
                        }
                    }
                    Err(load) => tracing::error!(error = %load, "Registry reload failed"),
                }
                return Err(e);
            }
        }

        self.metrics
            .update_escrow_outstanding(self.registry.total_escrow());
        for record in commit.events {
            // No subscribers is fine
            let _ = self.events.send(record);
        }

        Ok(())
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    events: broadcast::Sender<EventRecord>,
}

impl std::fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl RegistryHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> RegistryMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Run `f` against the current registry state
    pub async fn query<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Registry) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let query: Query = Box::new(move |registry| {
            let _ = tx.send(f(registry));
        });
        self.sender
            .send(RegistryMessage::Query(query))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Subscribe to committed events
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    // Commands

    /// Mint a certificate owned by `caller`
    pub async fn mint(&self, caller: Address, uri: impl Into<String>) -> Result<CertificateId> {
        let uri = uri.into();
        self.request(|response| RegistryMessage::Mint {
            caller,
            uri,
            response,
        })
        .await
    }

    /// Hand a certificate to `new_owner`
    pub async fn transfer_ownership(
        &self,
        caller: Address,
        id: CertificateId,
        new_owner: Address,
    ) -> Result<()> {
        self.request(|response| RegistryMessage::TransferOwnership {
            caller,
            id,
            new_owner,
            response,
        })
        .await
    }

    /// Open lending
    pub async fn allow_lending(
        &self,
        caller: Address,
        id: CertificateId,
        min_period_days: u64,
        price: u128,
    ) -> Result<()> {
        self.request(|response| RegistryMessage::AllowLending {
            caller,
            id,
            min_period_days,
            price,
            response,
        })
        .await
    }

    /// Close lending
    pub async fn block_lending(&self, caller: Address, id: CertificateId) -> Result<()> {
        self.request(|response| RegistryMessage::BlockLending {
            caller,
            id,
            response,
        })
        .await
    }

    /// Buy a license
    pub async fn buy_license(
        &self,
        id: CertificateId,
        borrower: Address,
        paid: u128,
    ) -> Result<License> {
        self.request(|response| RegistryMessage::BuyLicense {
            id,
            borrower,
            paid,
            response,
        })
        .await
    }

    /// Revoke a certificate (administrator only)
    pub async fn revoke_certificate(&self, caller: Address, id: CertificateId) -> Result<()> {
        self.request(|response| RegistryMessage::Revoke {
            caller,
            id,
            response,
        })
        .await
    }

    /// Sweep expired licenses
    pub async fn perform_upkeep(&self) -> Result<UpkeepReport> {
        self.request(|response| RegistryMessage::PerformUpkeep { response })
            .await
    }

    /// Pay out the caller's escrow balance
    pub async fn withdraw_proceeds(&self, caller: Address) -> Result<u128> {
        self.request(|response| RegistryMessage::Withdraw { caller, response })
            .await
    }

    // Queries

    /// Whether a sweep would remove anything
    pub async fn check_upkeep(&self) -> Result<bool> {
        self.query(|r| r.check_upkeep()).await
    }

    /// Number of certificates ever minted
    pub async fn emitted_count(&self) -> Result<u64> {
        self.query(|r| r.emitted_count()).await
    }

    /// Certificate record
    pub async fn certificate(&self, id: CertificateId) -> Result<Certificate> {
        self.query(move |r| r.certificate(id).cloned()).await?
    }

    /// Content pointer
    pub async fn token_uri(&self, id: CertificateId) -> Result<String> {
        self.query(move |r| r.token_uri(id).map(str::to_string))
            .await?
    }

    /// Current owner
    pub async fn owner_of(&self, id: CertificateId) -> Result<Address> {
        self.query(move |r| r.owner_of(id).cloned()).await?
    }

    /// Whether `address` holds an unexpired license
    pub async fn license_validity(&self, id: CertificateId, address: Address) -> Result<bool> {
        self.query(move |r| r.license_validity(id, &address))
            .await?
    }

    /// Whether lending is open
    pub async fn lending_status(&self, id: CertificateId) -> Result<bool> {
        self.query(move |r| r.lending_status(id)).await?
    }

    /// Current license holders
    pub async fn borrowers(&self, id: CertificateId) -> Result<Vec<Address>> {
        self.query(move |r| r.borrowers(id)).await?
    }

    /// Expiry time of a license
    pub async fn expiration_time(
        &self,
        id: CertificateId,
        borrower: Address,
    ) -> Result<UnixSeconds> {
        self.query(move |r| r.expiration_time(id, &borrower))
            .await?
    }

    /// Clause text of a license
    pub async fn clause(&self, id: CertificateId, borrower: Address) -> Result<String> {
        self.query(move |r| r.clause(id, &borrower).map(str::to_string))
            .await?
    }

    /// Withdrawable balance
    pub async fn proceeds(&self, address: Address) -> Result<u128> {
        self.query(move |r| r.proceeds(&address)).await
    }

    /// Shutdown actor and wait until it has released its state
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the registry actor
///
/// Without `storage` the registry lives in memory only.
pub fn spawn_registry_actor(
    registry: Registry,
    storage: Option<Arc<dyn Persistence>>,
    payout: Arc<dyn Payout>,
    metrics: Metrics,
    config: &ActorConfig,
) -> RegistryHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity);
    let (events, _) = broadcast::channel(config.event_channel_capacity);
    let actor = RegistryActor::new(registry, storage, payout, metrics, events.clone(), rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    RegistryHandle { sender: tx, events }
}
