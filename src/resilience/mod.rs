//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Batch dispatch attempt fails:
//!     → backoff.rs (delay before the next attempt, from [retries])
//!     → batch scheduler sleeps, then redispatches the same sealed batch
//! ```
//!
//! # Design Decisions
//! - Every dispatch attempt runs under its own deadline
//! - Only the batch scheduler retries; the broadcast pipeline never does

pub mod backoff;

pub use backoff::retry_delay;
