//! IPFS shared storage over the HTTP API.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use crate::config::SharedStorageConfig;
use crate::context::Context;
use crate::plugins::{BlobReader, PluginError, PluginResult, SharedStorage};

const PLUGIN_NAME: &str = "ipfs";

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Shared storage client for an IPFS node.
#[derive(Debug, Clone)]
pub struct IpfsStorage {
    client: reqwest::Client,
    api_url: url::Url,
    gateway_url: url::Url,
}

impl IpfsStorage {
    pub fn new(config: &SharedStorageConfig) -> PluginResult<Self> {
        let api_url: url::Url = config.api_url.parse().map_err(|e| {
            PluginError::request(PLUGIN_NAME, format!("invalid API URL '{}': {}", config.api_url, e))
        })?;
        let gateway_url: url::Url = config.gateway_url.parse().map_err(|e| {
            PluginError::request(
                PLUGIN_NAME,
                format!("invalid gateway URL '{}': {}", config.gateway_url, e),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;

        tracing::info!(api_url = %api_url, gateway_url = %gateway_url, "IPFS shared storage initialized");
        Ok(Self {
            client,
            api_url,
            gateway_url,
        })
    }

    /// Public gateway URL for a published reference.
    pub fn gateway_link(&self, public_ref: &str) -> String {
        format!("{}/ipfs/{}", self.gateway_url.as_str().trim_end_matches('/'), public_ref)
    }

    async fn add(&self, content: Vec<u8>) -> PluginResult<String> {
        let endpoint = self
            .api_url
            .join("api/v0/add")
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;
        let form = Form::new().part("file", Part::bytes(content).file_name("data"));
        let resp = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PluginError::request(
                PLUGIN_NAME,
                format!("add returned {}: {}", status, body),
            ));
        }
        let added: AddResponse = resp
            .json()
            .await
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;
        Ok(added.hash)
    }
}

#[async_trait]
impl SharedStorage for IpfsStorage {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn publish_data(&self, ctx: &Context, mut data: BlobReader) -> PluginResult<String> {
        let mut content = Vec::new();
        ctx.run(async {
            data.read_to_end(&mut content).await?;
            Ok::<_, PluginError>(())
        })
        .await?;
        let size = content.len();
        let public_ref = ctx.run(self.add(content)).await?;
        tracing::debug!(
            public_ref = %public_ref,
            gateway = %self.gateway_link(&public_ref),
            size = size,
            "Published to IPFS"
        );
        Ok(public_ref)
    }
}
