//! Signing identity resolution.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::NodeConfig;
use crate::context::Context;
use crate::error::BroadcastError;
use crate::model::SignerRef;

/// Resolves who signs a message.
#[async_trait]
pub trait IdentityManager: Send + Sync {
    /// Fill in a missing author or key, and reject authors this node cannot
    /// sign for.
    async fn resolve_input_signing_identity(
        &self,
        ctx: &Context,
        namespace: &str,
        signer: &mut SignerRef,
    ) -> Result<(), BroadcastError>;

    /// The identity the node itself signs with.
    async fn node_signer(&self, ctx: &Context, namespace: &str) -> Result<SignerRef, BroadcastError>;
}

/// Identities held by this node, with their default signing keys.
#[derive(Debug)]
pub struct LocalIdentity {
    org: String,
    defaults: DashMap<String, String>,
}

impl LocalIdentity {
    pub fn new(config: &NodeConfig) -> Self {
        let defaults = DashMap::new();
        defaults.insert(config.org.clone(), config.signing_key.clone());
        Self {
            org: config.org.clone(),
            defaults,
        }
    }

    /// Allow `author` to sign, defaulting to `key`.
    pub fn register(&self, author: &str, key: &str) {
        self.defaults.insert(author.to_string(), key.to_string());
    }
}

#[async_trait]
impl IdentityManager for LocalIdentity {
    async fn resolve_input_signing_identity(
        &self,
        ctx: &Context,
        namespace: &str,
        signer: &mut SignerRef,
    ) -> Result<(), BroadcastError> {
        if ctx.is_cancelled() {
            return Err(BroadcastError::Cancelled);
        }
        if signer.author.is_empty() {
            signer.author = self.org.clone();
        }
        let default_key = self
            .defaults
            .get(&signer.author)
            .map(|k| k.value().clone())
            .ok_or_else(|| {
                BroadcastError::Identity(format!(
                    "author '{}' is not a local identity in namespace '{}'",
                    signer.author, namespace
                ))
            })?;
        if signer.key.is_empty() {
            signer.key = default_key;
        }
        if signer.key.is_empty() {
            return Err(BroadcastError::Identity(format!(
                "no signing key for author '{}'",
                signer.author
            )));
        }
        Ok(())
    }

    async fn node_signer(&self, ctx: &Context, namespace: &str) -> Result<SignerRef, BroadcastError> {
        let mut signer = SignerRef::default();
        self.resolve_input_signing_identity(ctx, namespace, &mut signer)
            .await?;
        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> LocalIdentity {
        LocalIdentity::new(&NodeConfig {
            name: "node1".into(),
            org: "org1".into(),
            signing_key: "0xnode".into(),
        })
    }

    #[tokio::test]
    async fn test_defaults_filled() {
        let mut signer = SignerRef::default();
        identity()
            .resolve_input_signing_identity(&Context::background(), "ns1", &mut signer)
            .await
            .unwrap();
        assert_eq!(signer.author, "org1");
        assert_eq!(signer.key, "0xnode");
    }

    #[tokio::test]
    async fn test_explicit_key_kept() {
        let mut signer = SignerRef {
            author: "org1".into(),
            key: "0xother".into(),
        };
        identity()
            .resolve_input_signing_identity(&Context::background(), "ns1", &mut signer)
            .await
            .unwrap();
        assert_eq!(signer.key, "0xother");
    }

    #[tokio::test]
    async fn test_unknown_author_rejected() {
        let ids = identity();
        let mut signer = SignerRef {
            author: "mallory".into(),
            key: String::new(),
        };
        let err = ids
            .resolve_input_signing_identity(&Context::background(), "ns1", &mut signer)
            .await
            .unwrap_err();
        assert!(matches!(err, BroadcastError::Identity(_)));

        ids.register("mallory", "0xm");
        ids.resolve_input_signing_identity(&Context::background(), "ns1", &mut signer)
            .await
            .unwrap();
        assert_eq!(signer.key, "0xm");
    }

    #[tokio::test]
    async fn test_node_signer() {
        let signer = identity().node_signer(&Context::background(), "ns1").await.unwrap();
        assert_eq!(signer.author, "org1");
    }
}
