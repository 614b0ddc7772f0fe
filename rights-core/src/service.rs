//! Service orchestration layer
//!
//! Ties together configuration, storage, signing and the registry actor into
//! one handle that an outer surface (daemon, API server, keeper) can hold.
//!
//! # Example
//!
//! ```no_run
//! use rights_core::{clock::SystemClock, escrow::PayoutJournal, Config, RightsService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> rights_core::Result<()> {
//!     let service = RightsService::open(
//!         Config::from_env()?,
//!         Arc::new(SystemClock),
//!         Arc::new(PayoutJournal::new()),
//!     )?;
//!
//!     let needed = service.handle().check_upkeep().await?;
//!     tracing::info!(needed, "Upkeep status");
//!
//!     service.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_registry_actor, RegistryHandle},
    clock::Clock,
    crypto::KeyPair,
    escrow::Payout,
    metrics::Metrics,
    registry::Registry,
    storage::{Persistence, Storage, StorageStats},
    types::{Address, EventRecord},
    Config, Error, Result,
};
use std::sync::Arc;

/// Running registry service
pub struct RightsService {
    handle: RegistryHandle,
    storage: Arc<Storage>,
    metrics: Metrics,
    public_key: Option<[u8; 32]>,
    config: Config,
}

impl std::fmt::Debug for RightsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RightsService")
            .field("data_dir", &self.config.data_dir)
            .field("signing", &self.public_key.is_some())
            .finish()
    }
}

impl RightsService {
    /// Open storage, restore the registry and spawn its actor
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: Config, clock: Arc<dyn Clock>, payout: Arc<dyn Payout>) -> Result<Self> {
        let admin = Address::new(&config.registry.admin)
            .map_err(|e| Error::Config(format!("Invalid registry admin: {}", e)))?;

        let storage = Arc::new(Storage::open(&config)?);
        let snapshot = storage.load()?;

        let mut registry = Registry::from_snapshot(admin, clock, snapshot)?;
        if let Some(seed) = &config.registry.signing_seed {
            registry = registry.with_keypair(KeyPair::from_hex_seed(seed)?);
        }
        let public_key = registry.public_key();

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            admin = %registry.admin(),
            certificates = registry.emitted_count(),
            signing = public_key.is_some(),
            "Registry service opened"
        );

        let handle = spawn_registry_actor(
            registry,
            Some(storage.clone() as Arc<dyn Persistence>),
            payout,
            metrics.clone(),
            &config.actor,
        );

        Ok(Self {
            handle,
            storage,
            metrics,
            public_key,
            config,
        })
    }

    /// Handle to the registry actor
    pub fn handle(&self) -> &RegistryHandle {
        &self.handle
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Key that signs license clauses, if configured
    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.public_key
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Journaled events with `sequence >= from`
    pub fn events_since(&self, from: u64, limit: usize) -> Result<Vec<EventRecord>> {
        self.storage.events_since(from, limit)
    }

    /// Storage statistics
    pub fn storage_stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Stop the actor and close storage
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        match Arc::try_unwrap(self.storage) {
            Ok(storage) => storage.close(),
            Err(_) => {
                tracing::warn!("Storage still shared at shutdown, leaving it open");
                Ok(())
            }
        }
    }
}
