use super::{webdriver_key, BrowserHandle, BrowserLauncher, PageHandle, PageLink, ScrollDirection};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const BODY_TEXT_SCRIPT: &str = "return document.body ? document.body.innerText : '';";

const LINKS_SCRIPT: &str = r#"
    return Array.from(document.querySelectorAll('a[href]'))
        .map(a => ({ url: a.href, text: (a.innerText || '').trim() }))
        .filter(l => l.url.startsWith('http'));
"#;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, arguments[0]);";

/// Launches headless Chrome through a chromedriver endpoint
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    chrome_binary: Option<String>,
    window_width: u32,
    window_height: u32,
    connect_timeout: Duration,
}

impl Default for ChromeLauncher {
    fn default() -> Self {
        Self {
            chrome_binary: None,
            window_width: 1280,
            window_height: 800,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ChromeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Chrome binary (e.g., Chrome for Testing)
    pub fn with_binary(mut self, chrome_binary: Option<String>) -> Self {
        self.chrome_binary = chrome_binary;
        self
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn capabilities(&self) -> serde_json::Map<String, Value> {
        let mut caps = serde_json::Map::new();
        caps.insert(
            "browserName".to_string(),
            Value::String("chrome".to_string()),
        );

        let mut chrome_options = serde_json::Map::new();
        chrome_options.insert(
            "args".to_string(),
            Value::Array(vec![
                Value::String("--headless=new".to_string()),
                Value::String("--disable-gpu".to_string()),
                Value::String("--no-sandbox".to_string()),
                Value::String("--disable-dev-shm-usage".to_string()),
                Value::String("--disable-extensions".to_string()),
                Value::String(format!(
                    "--window-size={},{}",
                    self.window_width, self.window_height
                )),
            ]),
        );

        if let Some(binary) = &self.chrome_binary {
            chrome_options.insert("binary".to_string(), Value::String(binary.clone()));
        }

        caps.insert(
            "goog:chromeOptions".to_string(),
            Value::Object(chrome_options),
        );
        caps
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, webdriver_url: &str) -> Result<Box<dyn BrowserHandle>> {
        let mut builder = ClientBuilder::native();
        let connect_future = builder.capabilities(self.capabilities()).connect(webdriver_url);

        let client = tokio::time::timeout(self.connect_timeout, connect_future)
            .await
            .with_context(|| {
                format!(
                    "Connection to ChromeDriver timed out after {} seconds",
                    self.connect_timeout.as_secs()
                )
            })?
            .context("Failed to connect to ChromeDriver")?;

        debug!("Chrome session started at {}", webdriver_url);
        Ok(Box::new(ChromeBrowser { client }))
    }
}

/// A headless Chrome session
pub struct ChromeBrowser {
    client: Client,
}

#[async_trait]
impl BrowserHandle for ChromeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        let response = self.client.new_window(true).await?;
        let handle = response.handle;
        self.client.switch_to_window(handle.clone()).await?;
        let id: String = handle.into();
        Ok(Box::new(ChromePage {
            client: self.client.clone(),
            id,
        }))
    }

    async fn quit(&self) -> Result<()> {
        self.client.clone().close().await?;
        Ok(())
    }
}

/// A Chrome window driven over WebDriver
pub struct ChromePage {
    client: Client,
    id: String,
}

impl ChromePage {
    async fn eval(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.client.execute(script, args).await?)
    }
}

/// Quote `text` as an XPath 1.0 string expression. Literals cannot escape
/// quotes, so text holding both kinds is spliced together with `concat()`.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

#[async_trait]
impl PageHandle for ChromePage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.client.title().await?)
    }

    async fn click_selector(&self, selector: &str) -> Result<()> {
        let elem = self
            .client
            .find(Locator::Css(selector))
            .await
            .with_context(|| format!("Failed to find element with selector: {}", selector))?;
        elem.click().await?;
        Ok(())
    }

    async fn click_text(&self, text: &str) -> Result<()> {
        let literal = xpath_literal(text);
        let xpath = format!(
            "//*[self::a or self::button or @role='button' or self::input][contains(normalize-space(.), {lit}) or contains(@value, {lit})]",
            lit = literal
        );
        let elem = self
            .client
            .find(Locator::XPath(&xpath))
            .await
            .with_context(|| format!("No clickable element with text: {}", text))?;
        elem.click().await?;
        Ok(())
    }

    async fn type_text(&self, selector: Option<&str>, text: &str, submit: bool) -> Result<()> {
        let elem = match selector {
            Some(selector) => self
                .client
                .find(Locator::Css(selector))
                .await
                .with_context(|| format!("Failed to find element with selector: {}", selector))?,
            None => self.client.active_element().await?,
        };
        elem.send_keys(text).await?;
        if submit {
            if let Some(enter) = webdriver_key("enter") {
                elem.send_keys(&enter).await?;
            }
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let code = webdriver_key(key).with_context(|| format!("Unknown key: {}", key))?;
        let elem = self.client.active_element().await?;
        elem.send_keys(&code).await?;
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, pixels: u32) -> Result<()> {
        let delta = match direction {
            ScrollDirection::Down => pixels as i64,
            ScrollDirection::Up => -(pixels as i64),
        };
        self.eval(SCROLL_SCRIPT, vec![Value::from(delta)]).await?;
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        let value = self.eval(BODY_TEXT_SCRIPT, vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn links(&self) -> Result<Vec<PageLink>> {
        let value = self.eval(LINKS_SCRIPT, vec![]).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    async fn close(&self) -> Result<()> {
        self.client.close_window().await?;
        Ok(())
    }
}
