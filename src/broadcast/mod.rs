//! Broadcast manager.
//!
//! # Data Flow
//! ```text
//! new_broadcast / broadcast_* definitions
//!     → identity + inline data resolution, seal, stage
//!     → batch scheduler ("pinned_broadcast" dispatcher)
//!     → dispatch_batch(batch, pins)
//!         1. sharedstorage_batch_broadcast operation (add or reuse)
//!         2. publish_blobs: transport download → shared storage → blob.public
//!            then copy blob.public into the batch payload (hash unchanged)
//!         3. run the upload operation (skipped once Succeeded)
//!         4. submit_pinned_batch(batch, pins, payload_ref)
//! ```
//!
//! # Design Decisions
//! - Content is always published before the anchoring transaction is submitted
//! - The operation upsert is the only coordination point between duplicate
//!   dispatches of one batch
//! - No step retries internally; the batch scheduler owns retry policy
//! - Construction checks every collaborator before registering anything

pub mod definition;
pub mod dispatch;
pub mod manager;
pub mod message;
pub mod operations;

pub use dispatch::BatchDispatcher;
pub use manager::{BroadcastManager, BroadcastManagerBuilder, ManagerStatus, BROADCAST_MESSAGE_TYPES};
pub use message::BroadcastSender;
pub use operations::{BatchBroadcastData, BatchBroadcastHandler};

/// Name the broadcast dispatcher is registered under with the batch scheduler.
pub const BROADCAST_DISPATCHER_NAME: &str = "pinned_broadcast";
