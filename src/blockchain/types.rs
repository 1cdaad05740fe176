//! Ledger plugin errors.

use thiserror::Error;

pub use crate::config::schema::BlockchainConfig;

/// Failures of the Ethereum batch pin plugin.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// Every configured endpoint failed or timed out.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The pin transaction was mined but reverted.
    #[error("pinBatch reverted in transaction {0}")]
    Reverted(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    /// A batch was signed by a key this node does not hold.
    #[error("No local key for signer {0}")]
    UnknownSigner(String),

    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// The endpoint serves a different chain than configured.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("Invalid batch pin contract address '{0}'")]
    InvalidContract(String),
}

pub type BlockchainResult<T> = Result<T, BlockchainError>;
