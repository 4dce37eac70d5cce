//! Browser automation for delve: WebDriver-driven pages and the sandboxes
//! that host them.

pub mod sandbox;
pub mod webdriver;

pub use sandbox::{LocalDriverSandbox, RemoteSandbox, SandboxInstance, SandboxProvider};
pub use webdriver::{
    chrome::ChromeLauncher, webdriver_key, BrowserHandle, BrowserLauncher, PageHandle, PageLink,
    ScrollDirection,
};
