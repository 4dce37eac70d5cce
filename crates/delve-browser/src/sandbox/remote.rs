use super::{SandboxInstance, SandboxProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Provisions browsers through a remote sandbox HTTP API.
///
/// `POST {endpoint}/sandboxes` returns `{ "id": ..., "webdriver_url": ... }`;
/// `DELETE {endpoint}/sandboxes/{id}` tears the sandbox down.
pub struct RemoteSandbox {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreateSandboxResponse {
    id: String,
    webdriver_url: String,
}

impl RemoteSandbox {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .context("missing sandbox credential (sandbox.api_key or DELVE_SANDBOX_API_KEY)")
    }
}

#[async_trait]
impl SandboxProvider for RemoteSandbox {
    fn name(&self) -> &str {
        "remote"
    }

    async fn provision(&self) -> Result<SandboxInstance> {
        let api_key = self.api_key()?;
        let resp = self
            .client
            .post(format!("{}/sandboxes", self.endpoint))
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "template": "browser" }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("sandbox request failed: {}", e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("sandbox provisioning HTTP {}", status);
        }

        let created: CreateSandboxResponse = resp
            .json()
            .await
            .context("sandbox API returned an unexpected body")?;
        debug!("Provisioned remote sandbox {}", created.id);

        Ok(SandboxInstance {
            id: created.id,
            webdriver_url: created.webdriver_url,
        })
    }

    async fn terminate(&self, instance: &SandboxInstance) -> Result<()> {
        let api_key = self.api_key()?;
        let resp = self
            .client
            .delete(format!("{}/sandboxes/{}", self.endpoint, instance.id))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("sandbox request failed: {}", e.without_url()))?;

        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            debug!("Terminated remote sandbox {}", instance.id);
            Ok(())
        } else {
            anyhow::bail!("sandbox teardown HTTP {}", status)
        }
    }
}
