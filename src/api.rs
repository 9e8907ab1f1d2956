use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::PracticumConfig;
use crate::error::Fault;

/// Source of homework status payloads.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    /// Fetch the raw payload for the window starting at `from_date`.
    async fn fetch(&self, from_date: i64) -> Result<Value, Fault>;
}

/// Homework statuses endpoint over HTTP.
pub struct PracticumClient {
    client: reqwest::Client,
    endpoint: String,
    authorization: String,
}

impl PracticumClient {
    pub fn new(config: &PracticumConfig, token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            authorization: format!("{} {}", config.auth_scheme, token),
        })
    }
}

#[async_trait]
impl ReviewApi for PracticumClient {
    async fn fetch(&self, from_date: i64) -> Result<Value, Fault> {
        info!("Requesting {} (from_date={})", self.endpoint, from_date);

        let response = self
            .client
            .get(&self.endpoint)
            .header("Authorization", &self.authorization)
            .query(&[("from_date", from_date)])
            .send()
            .await
            .map_err(Fault::transport)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Fault::Transport(format!(
                "{} returned HTTP {}",
                self.endpoint, status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Fault::Transport(format!("response body is not valid JSON: {}", e)))?;

        debug!("Request to {} succeeded", self.endpoint);
        Ok(body)
    }
}
