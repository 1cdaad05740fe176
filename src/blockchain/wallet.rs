//! Wallet management.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "ANCHOR_BLOCKCHAIN_PRIVATE_KEY";

/// Local signing key for pin transactions.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    /// Chain ID for EIP-155 replay protection.
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string, with or
    /// without a 0x prefix.
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> BlockchainResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Wallet initialized"
        );

        Ok(Self { signer, chain_id })
    }

    /// Load wallet from `ANCHOR_BLOCKCHAIN_PRIVATE_KEY`.
    pub fn from_env(chain_id: u64) -> BlockchainResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            BlockchainError::Wallet(format!(
                "Environment variable {} not set",
                PRIVATE_KEY_ENV_VAR
            ))
        })?;

        Self::from_private_key(&private_key, chain_id)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Check that `signing_key` names this wallet's address.
    pub fn ensure_signer(&self, signing_key: &str) -> BlockchainResult<()> {
        let requested: Address = signing_key
            .parse()
            .map_err(|_| BlockchainError::UnknownSigner(signing_key.to_string()))?;
        if requested != self.address() {
            return Err(BlockchainError::UnknownSigner(signing_key.to_string()));
        }
        Ok(())
    }

    /// Network wallet for a signing provider.
    pub fn network_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        assert_eq!(wallet.address().to_string().to_lowercase(), TEST_ADDRESS);
    }

    #[test]
    fn test_wallet_with_0x_prefix() {
        let wallet = Wallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY), 1).unwrap();
        assert_eq!(wallet.address().to_string().to_lowercase(), TEST_ADDRESS);
    }

    #[test]
    fn test_invalid_private_key() {
        let result = Wallet::from_private_key("invalid_key", 1);
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_ensure_signer() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 31337).unwrap();
        assert!(wallet.ensure_signer(TEST_ADDRESS).is_ok());
        assert!(matches!(
            wallet.ensure_signer("0x70997970c51812dc3a010c7d01b50e0d17dc79c8"),
            Err(BlockchainError::UnknownSigner(_))
        ));
        assert!(wallet.ensure_signer("not-an-address").is_err());
    }
}
