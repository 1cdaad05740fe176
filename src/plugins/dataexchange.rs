//! HTTP client for the private data exchange.

use async_trait::async_trait;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use uuid::Uuid;

use crate::config::DataExchangeConfig;
use crate::context::Context;
use crate::model::Bytes32;
use crate::plugins::{BlobReader, DataExchange, PluginError, PluginResult, UploadedBlob};

const PLUGIN_NAME: &str = "dataexchange";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    hash: String,
    #[serde(default)]
    size: u64,
}

/// Data exchange reached over its REST API.
#[derive(Debug, Clone)]
pub struct HttpDataExchange {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpDataExchange {
    pub fn new(config: &DataExchangeConfig) -> PluginResult<Self> {
        let base_url: url::Url = config.url.parse().map_err(|e| {
            PluginError::request(PLUGIN_NAME, format!("invalid URL '{}': {}", config.url, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;
        tracing::info!(url = %base_url, "Data exchange client initialized");
        Ok(Self { client, base_url })
    }

    fn blob_url(&self, path: &str) -> PluginResult<url::Url> {
        self.base_url
            .join(&format!("api/v1/blobs/{}", path))
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))
    }

    async fn fetch(&self, payload_ref: &str) -> PluginResult<Vec<u8>> {
        let resp = self
            .client
            .get(self.blob_url(payload_ref)?)
            .send()
            .await
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PluginError::NotFound(format!("blob {}", payload_ref)));
        }
        if !status.is_success() {
            return Err(PluginError::request(
                PLUGIN_NAME,
                format!("download of '{}' returned {}", payload_ref, status),
            ));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;
        Ok(bytes.to_vec())
    }

    async fn put(&self, path: &str, content: Vec<u8>) -> PluginResult<UploadResponse> {
        let resp = self
            .client
            .put(self.blob_url(path)?)
            .body(content)
            .send()
            .await
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PluginError::request(
                PLUGIN_NAME,
                format!("upload to '{}' returned {}", path, status),
            ));
        }
        resp.json()
            .await
            .map_err(|e| PluginError::request(PLUGIN_NAME, e))
    }
}

#[async_trait]
impl DataExchange for HttpDataExchange {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn download_blob(&self, ctx: &Context, payload_ref: &str) -> PluginResult<BlobReader> {
        let content = ctx.run(self.fetch(payload_ref)).await?;
        Ok(Box::new(Cursor::new(content)))
    }

    async fn upload_blob(
        &self,
        ctx: &Context,
        namespace: &str,
        id: &Uuid,
        content: Vec<u8>,
    ) -> PluginResult<UploadedBlob> {
        let payload_ref = format!("{}/{}", namespace, id);
        let uploaded = ctx.run(self.put(&payload_ref, content)).await?;
        let hash: Bytes32 = uploaded
            .hash
            .parse()
            .map_err(|e: String| PluginError::request(PLUGIN_NAME, e))?;
        Ok(UploadedBlob {
            payload_ref,
            hash,
            size: uploaded.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_url() {
        let dx = HttpDataExchange::new(&DataExchangeConfig {
            url: "http://localhost:5000/".into(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            dx.blob_url("ns1/abc").unwrap().as_str(),
            "http://localhost:5000/api/v1/blobs/ns1/abc"
        );
    }
}
