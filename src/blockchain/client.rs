//! Read-only ledger RPC with endpoint failover.
//!
//! # Responsibilities
//! - Hold the primary endpoint and any failovers, tried in order
//! - Verify the endpoint serves the configured chain
//! - Price pin submissions against the configured gas ceiling

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use std::future::Future;
use std::time::Duration;

use crate::blockchain::types::{BlockchainConfig, BlockchainError, BlockchainResult};

/// Ledger RPC client shared by the batch pin plugin.
#[derive(Clone)]
pub struct BlockchainClient {
    /// Primary first, then failovers.
    providers: Vec<DynProvider>,
    config: BlockchainConfig,
    rpc_timeout: Duration,
}

impl BlockchainClient {
    /// Connect to the configured endpoints. An unreachable ledger is logged,
    /// not fatal: pins fail individually until it comes back.
    pub async fn new(config: BlockchainConfig) -> BlockchainResult<Self> {
        let primary: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let mut providers = vec![ProviderBuilder::new().connect_http(primary).erased()];
        for failover in &config.failover_urls {
            match failover.parse::<url::Url>() {
                Ok(url) => providers.push(ProviderBuilder::new().connect_http(url).erased()),
                Err(_) => tracing::warn!(url = %failover, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            providers,
            rpc_timeout: Duration::from_secs(config.rpc_timeout_secs),
            config,
        };
        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                rpc_url = %client.config.rpc_url,
                chain_id = client.config.chain_id,
                endpoints = client.providers.len(),
                "Ledger client connected"
            ),
            Err(e) => tracing::warn!(error = %e, "Ledger client created without chain verification"),
        }
        Ok(client)
    }

    /// Run `call` against each endpoint in turn until one answers in time.
    async fn with_failover<T, F, Fut, E>(&self, what: &str, call: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        for (idx, provider) in self.providers.iter().enumerate() {
            match tokio::time::timeout(self.rpc_timeout, call(provider.clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => tracing::warn!(endpoint = idx, call = what, error = %e, "RPC call failed"),
                Err(_) => tracing::warn!(endpoint = idx, call = what, "RPC call timed out"),
            }
        }
        Err(BlockchainError::Rpc(format!("all endpoints failed: {}", what)))
    }

    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let actual = self.get_chain_id().await?;
        if actual != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }

    pub async fn get_chain_id(&self) -> BlockchainResult<u64> {
        self.with_failover("eth_chainId", |p| async move { p.get_chain_id().await })
            .await
    }

    pub async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    /// Gas price in wei.
    pub async fn get_gas_price(&self) -> BlockchainResult<u128> {
        self.with_failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    /// Network gas price scaled by the configured multiplier; rejected when
    /// the network price is above the configured ceiling.
    pub async fn submission_gas_price(&self) -> BlockchainResult<u128> {
        let gas_price = self.get_gas_price().await?;
        let gwei = gas_price / 1_000_000_000;
        if gwei > self.config.max_gas_price_gwei as u128 {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: gwei as u64,
                max_gwei: self.config.max_gas_price_gwei,
            });
        }
        Ok((gas_price as f64 * self.config.gas_price_multiplier) as u128)
    }

    pub async fn is_healthy(&self) -> bool {
        self.get_block_number().await.is_ok()
    }

    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    pub fn confirmation_blocks(&self) -> u64 {
        self.config.confirmation_blocks
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("endpoints", &self.providers.len())
            .field("chain_id", &self.config.chain_id)
            .finish()
    }
}
