//! Rights Keeper
//!
//! Scheduling host for the registry's expiration sweep. The keeper owns no
//! registry state: it periodically asks the registry whether any license has
//! expired and, when one has, tells it to sweep.
//!
//! # Example
//!
//! ```no_run
//! use rights_core::{clock::SystemClock, escrow::PayoutJournal, RightsService};
//! use rights_keeper::{Config, UpkeepScheduler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> rights_keeper::Result<()> {
//!     let config = Config::from_env()?;
//!     let service = RightsService::open(
//!         config.registry.clone(),
//!         Arc::new(SystemClock),
//!         Arc::new(PayoutJournal::new()),
//!     )?;
//!
//!     let scheduler = UpkeepScheduler::from_config(service.handle().clone(), &config);
//!     let event = scheduler.run_once().await?;
//!     println!("Upkeep: {:?}", event);
//!
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod event_log;
pub mod scheduler;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use scheduler::{SchedulerStats, UpkeepEvent, UpkeepScheduler};
