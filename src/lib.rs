#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batcher Core Rust
//!
//! High-performance Rust core for batch completion tracking and
//! exactly-once callback dispatch.
//!
//! ## Overview
//!
//! Batcher Core tracks completion of a dynamically-sized, possibly nested
//! group of asynchronously executed work items and fires user-registered
//! callbacks exactly once when defined completion conditions hold. There is
//! no central coordinator process: reporters on any thread, process, or
//! machine coordinate purely through atomic operations against a shared
//! key-value store plus short-lived distributed locks.
//!
//! ## Architecture
//!
//! - [`store`] - Narrow async interface over the shared store (Redis in
//!   production, in-memory for tests), including atomic multi-operation
//!   transactions
//! - [`lock`] - Token-based short-TTL mutual exclusion
//! - [`batch`] - The batch entity, counter protocol, and status views
//! - [`callback`] - Registry, dispatcher, finalize step, and the
//!   invocation channel boundary
//! - [`engine`] - The composition root every reporter holds a clone of
//! - [`config`] / [`error`] / [`logging`] - Ambient concerns
//!
//! ## Guarantees
//!
//! - `pending` is never double-decremented, however many failure/success
//!   cycles a retried work item goes through
//! - Callbacks fire at most once per (batch, event), even under concurrent
//!   dispatch attempts and after batch data expiry
//! - A child batch's failures and completion propagate into its ancestors'
//!   counters
//!
//! This crate provides exactly-once *notification*, not exactly-once
//! *execution*: running work items (and callback deliveries, beyond the
//! bundled in-process channel) belongs to the embedding job system.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batcher_core::config::BatcherConfig;
//! use batcher_core::engine::BatchEngine;
//! use batcher_core::store::StoreProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = BatchEngine::new(StoreProvider::memory(), BatcherConfig::default());
//! engine.install_in_process_channel()?;
//!
//! let mut batch = engine.create_batch();
//! batch
//!     .on(
//!         batcher_core::callback::CallbackEvent::Success,
//!         "reports.weekly#finished",
//!         serde_json::json!({"tenant": 42}),
//!     )
//!     .await?;
//!
//! batch.start().await?;
//! let first = batch.add_work_item().await?;
//! let second = batch.add_work_item().await?;
//! batch.commit().await?;
//!
//! // The execution system reports as items finish:
//! engine.report_success(batch.bid(), &first).await?;
//! engine.report_success(batch.bid(), &second).await?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod callback;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod lock;
pub mod logging;
pub mod store;
pub mod validity;

pub use batch::{Batch, BatchStatus, FinalStatusSnapshot};
pub use callback::{
    BatchCallback, CallbackChannel, CallbackDelivery, CallbackEvent, CallbackRegistry, DeliveryTag,
};
pub use config::BatcherConfig;
pub use engine::BatchEngine;
pub use error::{BatcherError, Result};
pub use store::{InMemoryStoreService, RedisStoreService, StoreProvider};
