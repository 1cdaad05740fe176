//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → handlers.rs (decode path/query/body)
//!     → BroadcastManager (stage message, or stage and wait when confirm=true)
//!     → error.rs (BroadcastError → status code + JSON body)
//! ```

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{ApiServer, AppState};
