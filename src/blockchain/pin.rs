//! Batch pin submission to the ledger contract.
//!
//! # Responsibilities
//! - ABI-encode `pinBatch` calls from a [`BatchPin`]
//! - Sign with the local wallet and send through the primary RPC
//! - Wait for the configured number of confirmations

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use uuid::Uuid;

use crate::blockchain::client::BlockchainClient;
use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::blockchain::wallet::Wallet;
use crate::context::Context;
use crate::plugins::{BatchPin, Blockchain, PluginError, PluginResult};

const PLUGIN_NAME: &str = "ethereum";

sol! {
    function pinBatch(bytes32 uuids, bytes32 batchHash, string payloadRef, bytes32[] contexts);
}

/// Pack the transaction and batch IDs into the contract's `uuids` word.
pub fn pack_uuids(transaction_id: &Uuid, batch_id: &Uuid) -> B256 {
    let mut packed = [0u8; 32];
    packed[..16].copy_from_slice(transaction_id.as_bytes());
    packed[16..].copy_from_slice(batch_id.as_bytes());
    B256::from(packed)
}

/// Calldata for a `pinBatch` call.
pub fn encode_pin(pin: &BatchPin) -> Vec<u8> {
    pinBatchCall {
        uuids: pack_uuids(&pin.transaction_id, &pin.batch_id),
        batchHash: B256::from(pin.batch_hash.0),
        payloadRef: pin.payload_ref.clone(),
        contexts: pin.contexts.iter().map(|c| B256::from(c.0)).collect(),
    }
    .abi_encode()
}

/// Ledger plugin anchoring batches through the batch pin contract.
pub struct EthereumBatchPin {
    client: BlockchainClient,
    wallet: Wallet,
    contract: Address,
    signing_provider: DynProvider,
}

impl EthereumBatchPin {
    pub fn new(client: BlockchainClient, wallet: Wallet) -> BlockchainResult<Self> {
        let config = client.config();
        let contract: Address = config
            .contract_address
            .parse()
            .map_err(|_| BlockchainError::InvalidContract(config.contract_address.clone()))?;
        let rpc_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let signing_provider = ProviderBuilder::new()
            .wallet(wallet.network_wallet())
            .connect_http(rpc_url)
            .erased();

        tracing::info!(
            contract = %contract,
            signer = %wallet.address(),
            "Batch pin contract configured"
        );
        Ok(Self {
            client,
            wallet,
            contract,
            signing_provider,
        })
    }

    pub fn client(&self) -> &BlockchainClient {
        &self.client
    }

    async fn submit(&self, pin: &BatchPin) -> BlockchainResult<B256> {
        let gas_price = self.client.submission_gas_price().await?;
        let tx = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(encode_pin(pin))
            .with_chain_id(self.wallet.chain_id())
            .with_gas_price(gas_price);

        let pending = self
            .signing_provider
            .send_transaction(tx)
            .await
            .map_err(|e| BlockchainError::Rpc(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        tracing::debug!(tx_hash = %tx_hash, batch_id = %pin.batch_id, "Pin transaction sent");

        let receipt = pending
            .with_required_confirmations(self.client.confirmation_blocks())
            .get_receipt()
            .await
            .map_err(|e| BlockchainError::Rpc(e.to_string()))?;
        if !receipt.status() {
            return Err(BlockchainError::Reverted(tx_hash.to_string()));
        }
        Ok(tx_hash)
    }
}

#[async_trait]
impl Blockchain for EthereumBatchPin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn submit_batch_pin(
        &self,
        ctx: &Context,
        signing_key: &str,
        pin: &BatchPin,
    ) -> PluginResult<()> {
        self.wallet
            .ensure_signer(signing_key)
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;
        let tx_hash = ctx
            .run(async {
                self.submit(pin)
                    .await
                    .map_err(|e| PluginError::request(PLUGIN_NAME, e))
            })
            .await?;
        tracing::info!(
            tx_hash = %tx_hash,
            batch_id = %pin.batch_id,
            tx = %pin.transaction_id,
            contexts = pin.contexts.len(),
            "Batch pinned"
        );
        Ok(())
    }
}
