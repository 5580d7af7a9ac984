//! Client for a running `/extract` front.
//!
//! Any failure (connection, status, body) is logged and answered with an empty
//! mapping, so callers can treat a remote front like a local attributor.

use crate::attributor::ObjectAttributor;
use crate::error::Result;
use crate::server::ExtractResponse;
use crate::types::ObjectAttribution;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

/// Posts texts to `<base_url>/extract`.
#[derive(Debug, Clone)]
pub struct ExtractClient {
    client: Client,
    endpoint: String,
}

impl ExtractClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/extract", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Attribution computed by the remote front, or an empty mapping.
    pub async fn extract(&self, text: &str) -> ObjectAttribution {
        match self.request(text).await {
            Ok(response) => {
                if response.input_text_truncated {
                    debug!(url = %self.endpoint, "Remote front truncated the input text");
                }
                response.result
            }
            Err(e) => {
                warn!(url = %self.endpoint, error = %e, "Remote extraction failed");
                ObjectAttribution::new()
            }
        }
    }

    async fn request(&self, text: &str) -> reqwest::Result<ExtractResponse> {
        self.client
            .post(&self.endpoint)
            .json(text)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl ObjectAttributor for ExtractClient {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn attribute(&self, text: &str) -> Result<ObjectAttribution> {
        Ok(self.extract(text).await)
    }
}
