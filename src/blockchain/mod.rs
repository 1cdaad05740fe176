//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (private key)
//!     → wallet.rs (key loading, signer identity)
//!     → client.rs (read-only RPC with failover and timeouts)
//!     → pin.rs (ABI-encode pinBatch, sign, send, await receipt)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod pin;
pub mod types;
pub mod wallet;

pub use client::BlockchainClient;
pub use pin::EthereumBatchPin;
pub use types::{BlockchainConfig, BlockchainError, BlockchainResult};
pub use wallet::Wallet;
