//! Built-in tool implementations, one module per tool group:
//! - `search` - web search with engine fallback
//! - `crawl` - one-shot page fetches that leave no session behind
//! - `browser` - the lightweight per-thread text browser
//! - `sandbox` - the sandboxed, script-capable browser
//! - `code` - Python execution

pub mod browser;
pub mod code;
pub mod crawl;
pub mod executor;
pub mod sandbox;
pub mod search;

pub use executor::ToolContext;
