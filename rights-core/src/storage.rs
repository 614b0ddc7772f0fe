//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `certificates` - Certificate records with their licenses (key: id, big-endian)
//! - `escrow` - Withdrawable balances (key: address bytes)
//! - `meta` - Registry counters (key: name)
//! - `events` - Append-only event journal (key: sequence, big-endian)
//!
//! Every registry commit lands in a single `WriteBatch`, so a crash leaves
//! either all or none of a call's effects on disk.

use crate::{
    registry::{Commit, RegistrySnapshot},
    types::{Address, Certificate, EventRecord},
    Config, Error, Result,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB,
};
use std::sync::Arc;

/// Column family names
const CF_CERTIFICATES: &str = "certificates";
const CF_ESCROW: &str = "escrow";
const CF_META: &str = "meta";
const CF_EVENTS: &str = "events";

const KEY_NEXT_SEQUENCE: &[u8] = b"next_sequence";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_CERTIFICATES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_ESCROW, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB registry store");

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Read on every restart, keep it cheap to decompress
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Batch operations (atomic)

    /// Persist one registry commit atomically
    pub fn commit(&self, commit: &Commit) -> Result<()> {
        if commit.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();

        let cf_certificates = self.cf_handle(CF_CERTIFICATES)?;
        for certificate in &commit.certificates {
            let value = bincode::serialize(certificate)?;
            batch.put_cf(cf_certificates, certificate.id.to_key(), &value);
        }

        let cf_escrow = self.cf_handle(CF_ESCROW)?;
        for (address, balance) in &commit.escrow {
            batch.put_cf(cf_escrow, address.as_str().as_bytes(), balance.to_be_bytes());
        }

        let cf_events = self.cf_handle(CF_EVENTS)?;
        for record in &commit.events {
            let value = bincode::serialize(record)?;
            batch.put_cf(cf_events, record.sequence.to_be_bytes(), &value);
        }

        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, KEY_NEXT_SEQUENCE, commit.next_sequence.to_be_bytes());

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            certificates = commit.certificates.len(),
            escrow = commit.escrow.len(),
            events = commit.events.len(),
            next_sequence = commit.next_sequence,
            "Commit persisted"
        );

        Ok(())
    }

    /// Load full registry state
    pub fn load(&self) -> Result<RegistrySnapshot> {
        let cf_certificates = self.cf_handle(CF_CERTIFICATES)?;
        let mut certificates = Vec::new();
        for item in self.db.iterator_cf(cf_certificates, IteratorMode::Start) {
            let (_, value) = item?;
            let certificate: Certificate = bincode::deserialize(&value)?;
            certificates.push(certificate);
        }

        let cf_escrow = self.cf_handle(CF_ESCROW)?;
        let mut escrow = Vec::new();
        for item in self.db.iterator_cf(cf_escrow, IteratorMode::Start) {
            let (key, value) = item?;
            let address = std::str::from_utf8(&key)
                .map_err(|e| Error::Storage(format!("Corrupt escrow key: {}", e)))?;
            escrow.push((Address::new(address)?, decode_u128(&value)?));
        }

        let cf_meta = self.cf_handle(CF_META)?;
        let next_sequence = match self.db.get_cf(cf_meta, KEY_NEXT_SEQUENCE)? {
            Some(value) => decode_u64(&value)?,
            None => 0,
        };

        tracing::info!(
            certificates = certificates.len(),
            escrow_entries = escrow.len(),
            next_sequence,
            "Registry state loaded"
        );

        Ok(RegistrySnapshot {
            certificates,
            escrow,
            next_sequence,
        })
    }

    // Event journal

    /// Get event by sequence
    pub fn get_event(&self, sequence: u64) -> Result<Option<EventRecord>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        match self.db.get_cf(cf, sequence.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Events with `sequence >= from`, at most `limit`
    pub fn events_since(&self, from: u64, limit: usize) -> Result<Vec<EventRecord>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let start = from.to_be_bytes();
        let iter = self.db.iterator_cf(
            cf,
            IteratorMode::From(&start, rocksdb::Direction::Forward),
        );

        let mut events = Vec::new();
        for item in iter.take(limit) {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_certificates = self.cf_handle(CF_CERTIFICATES)?;
        let cf_escrow = self.cf_handle(CF_ESCROW)?;
        let cf_events = self.cf_handle(CF_EVENTS)?;

        Ok(StorageStats {
            total_certificates: self.approximate_count(cf_certificates)?,
            total_escrow_entries: self.approximate_count(cf_escrow)?,
            total_events: self.approximate_count(cf_events)?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

/// Durable home of registry state, as seen by the actor
pub trait Persistence: Send + Sync {
    /// Persist one registry commit atomically
    fn commit(&self, commit: &Commit) -> Result<()>;

    /// Load full registry state
    fn load(&self) -> Result<RegistrySnapshot>;
}

impl Persistence for Storage {
    fn commit(&self, commit: &Commit) -> Result<()> {
        Storage::commit(self, commit)
    }

    fn load(&self) -> Result<RegistrySnapshot> {
        Storage::load(self)
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Expected 8 bytes, found {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_u128(bytes: &[u8]) -> Result<u128> {
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Expected 16 bytes, found {}", bytes.len())))?;
    Ok(u128::from_be_bytes(raw))
}

/// Storage statistics (approximate)
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Certificate records
    pub total_certificates: u64,
    /// Escrow entries, including zero balances
    pub total_escrow_entries: u64,
    /// Journaled events
    pub total_events: u64,
}
