//! Sandbox provisioning for script-capable browsers.
//!
//! A sandbox is an isolated environment that exposes a WebDriver endpoint.
//! Providers hand out [`SandboxInstance`]s and are responsible for tearing
//! them down again.

pub mod local;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use local::LocalDriverSandbox;
pub use remote::RemoteSandbox;

/// A provisioned sandbox exposing a WebDriver endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxInstance {
    pub id: String,
    pub webdriver_url: String,
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Provision a fresh sandbox
    async fn provision(&self) -> Result<SandboxInstance>;

    /// Tear a sandbox down. Terminating an unknown or already-dead
    /// instance is not an error.
    async fn terminate(&self, instance: &SandboxInstance) -> Result<()>;
}

/// Check if a WebDriver endpoint reports ready on its status route.
pub async fn webdriver_ready(client: &reqwest::Client, webdriver_url: &str) -> bool {
    let url = format!("{}/status", webdriver_url.trim_end_matches('/'));
    match client
        .get(&url)
        .timeout(std::time::Duration::from_millis(500))
        .send()
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
