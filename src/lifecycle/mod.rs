//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → wait_for_signal resolves
//!
//! Shutdown (shutdown.rs):
//!     trigger → HTTP API stops accepting → batch assemblers cancelled → exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop the API first, then cancel in-flight batching
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
