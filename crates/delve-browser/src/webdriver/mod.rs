pub mod chrome;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A link discovered on a rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
}

/// Scroll direction for [`PageHandle::scroll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Launches a browser engine against a WebDriver endpoint
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a headless browser session at `webdriver_url`
    async fn launch(&self, webdriver_url: &str) -> Result<Box<dyn BrowserHandle>>;
}

/// A running browser engine
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Open a new page (tab) and make it current
    async fn new_page(&self) -> Result<Box<dyn PageHandle>>;

    /// Shut the browser down
    async fn quit(&self) -> Result<()>;
}

/// A single live page inside a browser
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Stable identifier of this page for the lifetime of the browser
    fn id(&self) -> &str;

    /// Navigate to a URL
    async fn goto(&self, url: &str) -> Result<()>;

    /// Get the current URL
    async fn current_url(&self) -> Result<String>;

    /// Get the page title
    async fn title(&self) -> Result<String>;

    /// Click the first element matching a CSS selector
    async fn click_selector(&self, selector: &str) -> Result<()>;

    /// Click the first visible element whose text contains `text`
    async fn click_text(&self, text: &str) -> Result<()>;

    /// Type into the element matching `selector`, or the focused element
    async fn type_text(&self, selector: Option<&str>, text: &str, submit: bool) -> Result<()>;

    /// Press a named key (Enter, Tab, Escape, ArrowDown, ...)
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Scroll the viewport by `pixels`
    async fn scroll(&self, direction: ScrollDirection, pixels: u32) -> Result<()>;

    /// Visible text of the document body
    async fn text(&self) -> Result<String>;

    /// Anchors on the page with absolute URLs
    async fn links(&self) -> Result<Vec<PageLink>>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Close this page
    async fn close(&self) -> Result<()>;
}

/// Map a key name to its WebDriver code point.
///
/// Single characters are sent as-is.
pub fn webdriver_key(name: &str) -> Option<String> {
    let code = match name.to_ascii_lowercase().as_str() {
        "enter" | "return" => '\u{E007}',
        "tab" => '\u{E004}',
        "escape" | "esc" => '\u{E00C}',
        "backspace" => '\u{E003}',
        "delete" => '\u{E017}',
        "space" => '\u{E00D}',
        "pageup" => '\u{E00E}',
        "pagedown" => '\u{E00F}',
        "end" => '\u{E010}',
        "home" => '\u{E011}',
        "arrowleft" | "left" => '\u{E012}',
        "arrowup" | "up" => '\u{E013}',
        "arrowright" | "right" => '\u{E014}',
        "arrowdown" | "down" => '\u{E015}',
        _ => {
            let mut chars = name.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c.to_string()),
                _ => None,
            };
        }
    };
    Some(code.to_string())
}
