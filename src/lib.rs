//! Broadcast batch anchoring library.

pub mod batch;
pub mod batchpin;
pub mod blockchain;
pub mod broadcast;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod operations;
pub mod plugins;
pub mod resilience;
pub mod syncasync;

pub use broadcast::{BroadcastManager, BroadcastManagerBuilder};
pub use config::schema::AnchorConfig;
pub use context::Context;
pub use error::BroadcastError;
pub use http::ApiServer;
pub use lifecycle::Shutdown;
