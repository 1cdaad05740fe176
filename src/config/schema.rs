//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the broadcast node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AnchorConfig {
    /// Identity this node broadcasts as.
    pub node: NodeConfig,

    /// HTTP API listener settings.
    pub api: ApiConfig,

    /// Batch thresholds for the broadcast dispatcher.
    pub broadcast: BroadcastConfig,

    /// Dispatch retry policy of the batch scheduler.
    pub retries: RetryConfig,

    /// Local persistence settings.
    pub database: DatabaseConfig,

    /// Shared storage (IPFS) settings.
    pub shared_storage: SharedStorageConfig,

    /// Private data exchange settings.
    pub data_exchange: DataExchangeConfig,

    /// Ledger integration settings.
    pub blockchain: BlockchainConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name, reported by the status endpoint.
    pub name: String,

    /// Organization identity messages are authored by.
    pub org: String,

    /// Signing key used when a message does not name one.
    pub signing_key: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "node1".to_string(),
            org: "org1".to_string(),
            signing_key: String::new(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Overall request timeout in seconds.
    pub request_timeout_secs: u64,

    /// How long a confirmed send waits for its batch, in seconds.
    pub sync_wait_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 120,
            sync_wait_timeout_secs: 60,
        }
    }
}

/// Broadcast batch thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Maximum messages per batch.
    pub batch_size: usize,

    /// Maximum estimated payload bytes per batch.
    pub batch_payload_limit: u64,

    /// Time a partially filled batch waits before flushing, in milliseconds.
    pub batch_timeout_ms: u64,

    /// Idle time before a batch assembler is disposed, in seconds.
    pub batch_agent_timeout_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            batch_payload_limit: 800_000,
            batch_timeout_ms: 1000,
            batch_agent_timeout_secs: 120,
        }
    }
}

/// Retry configuration for batch dispatch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of dispatch attempts per batch.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Deadline for a single dispatch attempt in seconds.
    pub dispatch_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 30_000,
            dispatch_timeout_secs: 60,
        }
    }
}

/// Local persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Snapshot file. Records are kept in memory only when unset.
    pub path: Option<String>,
}

/// IPFS shared storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SharedStorageConfig {
    /// IPFS HTTP API endpoint.
    pub api_url: String,

    /// Public gateway used to build links to published content.
    pub gateway_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SharedStorageConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            gateway_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Data exchange configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataExchangeConfig {
    /// Data exchange REST endpoint.
    pub url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DataExchangeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5100".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_format: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_format: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Ledger integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// Address of the batch pin contract.
    pub contract_address: String,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Number of block confirmations required for finality.
    pub confirmation_blocks: u64,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            contract_address: String::new(),
            rpc_timeout_secs: 10,
            confirmation_blocks: 1,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
        }
    }
}
