use super::{webdriver_ready, SandboxInstance, SandboxProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Runs one chromedriver process per sandbox on the local machine.
///
/// Each instance gets its own free port so sessions from different threads
/// never share a driver.
pub struct LocalDriverSandbox {
    chromedriver_binary: String,
    startup_timeout: Duration,
    client: reqwest::Client,
    processes: Arc<Mutex<HashMap<String, Child>>>,
}

impl LocalDriverSandbox {
    pub fn new(chromedriver_binary: Option<String>) -> Self {
        Self {
            chromedriver_binary: chromedriver_binary.unwrap_or_else(|| "chromedriver".to_string()),
            startup_timeout: Duration::from_secs(10),
            client: reqwest::Client::new(),
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Number of driver processes currently owned by this provider
    pub async fn running(&self) -> usize {
        self.processes.lock().await.len()
    }
}

fn free_port() -> Result<u16> {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").context("Failed to allocate a local port")?;
    Ok(listener.local_addr()?.port())
}

#[async_trait]
impl SandboxProvider for LocalDriverSandbox {
    fn name(&self) -> &str {
        "local"
    }

    async fn provision(&self) -> Result<SandboxInstance> {
        let port = free_port()?;
        let mut child = Command::new(&self.chromedriver_binary)
            .arg(format!("--port={}", port))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to start {}. Make sure chromedriver is installed and in your PATH",
                    self.chromedriver_binary
                )
            })?;

        let webdriver_url = format!("http://127.0.0.1:{}", port);
        let start = std::time::Instant::now();
        loop {
            if webdriver_ready(&self.client, &webdriver_url).await {
                break;
            }
            if let Ok(Some(status)) = child.try_wait() {
                anyhow::bail!("chromedriver exited during startup with {}", status);
            }
            if start.elapsed() >= self.startup_timeout {
                let _ = child.kill().await;
                anyhow::bail!(
                    "chromedriver did not become ready within {} seconds",
                    self.startup_timeout.as_secs()
                );
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let id = format!("local-{}", uuid::Uuid::new_v4());
        debug!("Provisioned local sandbox {} on port {}", id, port);
        self.processes.lock().await.insert(id.clone(), child);

        Ok(SandboxInstance { id, webdriver_url })
    }

    async fn terminate(&self, instance: &SandboxInstance) -> Result<()> {
        let child = self.processes.lock().await.remove(&instance.id);
        match child {
            Some(mut child) => {
                if let Err(e) = child.kill().await {
                    // Already exited
                    warn!("Failed to kill chromedriver for {}: {}", instance.id, e);
                }
                debug!("Terminated local sandbox {}", instance.id);
            }
            None => debug!("Local sandbox {} already terminated", instance.id),
        }
        Ok(())
    }
}
