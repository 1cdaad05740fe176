//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AnchorConfig (validated, immutable)
//!     → sections handed to the plugins and the broadcast manager at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets (the ledger private key) come from the environment, never the file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AnchorConfig, ApiConfig, BlockchainConfig, BroadcastConfig, DataExchangeConfig,
    DatabaseConfig, NodeConfig, ObservabilityConfig, RetryConfig, SharedStorageConfig,
};
pub use validation::{validate_config, ValidationError};
