//! draftcache - offline-first sync and caching core for fantasy-sports
//! stats.
//!
//! The crate sits between a presentation layer and a remote stats API and
//! owns everything about data movement: conditional HTTP fetches, a
//! durable bounded offline store, per-key freshness tracking, and
//! background maintenance. Reads are cache-first; the network is an
//! optimization, not a requirement.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use draftcache::auth::KeyringTokens;
//! use draftcache::api::HttpTransport;
//! use draftcache::config::SyncConfig;
//! use draftcache::models::Player;
//! use draftcache::store::OfflineStore;
//! use draftcache::sync::SyncCoordinator;
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = SyncConfig::load()?;
//! let transport = HttpTransport::new(config.api_base_url.clone(), Arc::new(KeyringTokens))?;
//! let store = Arc::new(OfflineStore::open(&config)?);
//! let coordinator = Arc::new(SyncCoordinator::new(Arc::new(transport), store, config));
//! coordinator.start_background_tasks();
//!
//! let players = coordinator.read::<Player>().await?;
//! println!("{} players, {}", players.records.len(), players.age_display());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use models::{Entity, EntityKind};
pub use sync::{Freshness, ReadResult, SyncCoordinator, SyncError, SyncOutcome};
