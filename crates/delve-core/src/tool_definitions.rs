//! Tool definitions for the built-in tools.
//!
//! This module contains the JSON schema definitions handed to the language
//! model for every built-in tool, grouped by the capability that enables them.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::capability::ToolGroup;

/// Name, description and input schema of a callable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// The closed set of tools implemented in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    WebSearch,
    CrawlPage,
    CrawlLinks,
    BrowserNavigate,
    BrowserClick,
    BrowserBack,
    BrowserExtractText,
    BrowserListLinks,
    BrowserReset,
    SandboxNavigate,
    SandboxClick,
    SandboxType,
    SandboxPress,
    SandboxScroll,
    SandboxExtractText,
    SandboxScreenshot,
    SandboxReset,
    RunPython,
}

impl BuiltinTool {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinTool::WebSearch => "web_search",
            BuiltinTool::CrawlPage => "crawl_page",
            BuiltinTool::CrawlLinks => "crawl_links",
            BuiltinTool::BrowserNavigate => "browser_navigate",
            BuiltinTool::BrowserClick => "browser_click",
            BuiltinTool::BrowserBack => "browser_back",
            BuiltinTool::BrowserExtractText => "browser_extract_text",
            BuiltinTool::BrowserListLinks => "browser_list_links",
            BuiltinTool::BrowserReset => "browser_reset",
            BuiltinTool::SandboxNavigate => "sandbox_navigate",
            BuiltinTool::SandboxClick => "sandbox_click",
            BuiltinTool::SandboxType => "sandbox_type",
            BuiltinTool::SandboxPress => "sandbox_press",
            BuiltinTool::SandboxScroll => "sandbox_scroll",
            BuiltinTool::SandboxExtractText => "sandbox_extract_text",
            BuiltinTool::SandboxScreenshot => "sandbox_screenshot",
            BuiltinTool::SandboxReset => "sandbox_reset",
            BuiltinTool::RunPython => "run_python",
        }
    }

    pub fn group(self) -> ToolGroup {
        match self {
            BuiltinTool::WebSearch => ToolGroup::WebSearch,
            BuiltinTool::CrawlPage | BuiltinTool::CrawlLinks => ToolGroup::Crawl,
            BuiltinTool::BrowserNavigate
            | BuiltinTool::BrowserClick
            | BuiltinTool::BrowserBack
            | BuiltinTool::BrowserExtractText
            | BuiltinTool::BrowserListLinks
            | BuiltinTool::BrowserReset => ToolGroup::Browser,
            BuiltinTool::SandboxNavigate
            | BuiltinTool::SandboxClick
            | BuiltinTool::SandboxType
            | BuiltinTool::SandboxPress
            | BuiltinTool::SandboxScroll
            | BuiltinTool::SandboxExtractText
            | BuiltinTool::SandboxScreenshot
            | BuiltinTool::SandboxReset => ToolGroup::SandboxBrowser,
            BuiltinTool::RunPython => ToolGroup::CodeExecution,
        }
    }
}

/// Built-in tools contributed by `group`, in registration order.
/// External tools are not built in, so that group yields nothing here.
pub fn create_group_tools(group: ToolGroup) -> Vec<(BuiltinTool, ToolDefinition)> {
    match group {
        ToolGroup::WebSearch => create_search_tools(),
        ToolGroup::Crawl => create_crawl_tools(),
        ToolGroup::Browser => create_browser_tools(),
        ToolGroup::SandboxBrowser => create_sandbox_tools(),
        ToolGroup::CodeExecution => create_code_execution_tools(),
        ToolGroup::ExternalTools => Vec::new(),
    }
}

fn tool(kind: BuiltinTool, description: &str, input_schema: serde_json::Value) -> (BuiltinTool, ToolDefinition) {
    (
        kind,
        ToolDefinition {
            name: kind.name().to_string(),
            description: description.to_string(),
            input_schema,
        },
    )
}

fn no_arguments() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

fn create_search_tools() -> Vec<(BuiltinTool, ToolDefinition)> {
    vec![tool(
        BuiltinTool::WebSearch,
        "Search the web. Engines are tried in preference order until one returns results. Returns the engine used and a list of {title, url, snippet} results.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (optional)"
                },
                "engines": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Engine preference, most preferred first (optional, defaults to the configured order)"
                }
            },
            "required": ["query"]
        }),
    )]
}

fn create_crawl_tools() -> Vec<(BuiltinTool, ToolDefinition)> {
    vec![
        tool(
            BuiltinTool::CrawlPage,
            "Fetch a single URL and return its title and readable text. Does not affect any browsing session.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL to fetch"
                    },
                    "max_chars": {
                        "type": "integer",
                        "description": "Maximum characters of text to return (optional)"
                    }
                },
                "required": ["url"]
            }),
        ),
        tool(
            BuiltinTool::CrawlLinks,
            "Fetch a single URL and return the links found on it.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL to fetch"
                    }
                },
                "required": ["url"]
            }),
        ),
    ]
}

fn create_browser_tools() -> Vec<(BuiltinTool, ToolDefinition)> {
    vec![
        tool(
            BuiltinTool::BrowserNavigate,
            "Navigate the text browser to a URL. Returns the page title, a text excerpt and numbered links.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The http(s) URL to open"
                    }
                },
                "required": ["url"]
            }),
        ),
        tool(
            BuiltinTool::BrowserClick,
            "Follow a link on the current page by its index from the links list.",
            json!({
                "type": "object",
                "properties": {
                    "index": {
                        "type": "integer",
                        "description": "Index of the link to follow"
                    }
                },
                "required": ["index"]
            }),
        ),
        tool(
            BuiltinTool::BrowserBack,
            "Go back to the previous page in the browsing history.",
            no_arguments(),
        ),
        tool(
            BuiltinTool::BrowserExtractText,
            "Return the readable text of the current page.",
            json!({
                "type": "object",
                "properties": {
                    "max_chars": {
                        "type": "integer",
                        "description": "Maximum characters to return (optional)"
                    }
                },
                "required": []
            }),
        ),
        tool(
            BuiltinTool::BrowserListLinks,
            "List the links on the current page with their indices.",
            no_arguments(),
        ),
        tool(
            BuiltinTool::BrowserReset,
            "Clear the current page and browsing history.",
            no_arguments(),
        ),
    ]
}

fn create_sandbox_tools() -> Vec<(BuiltinTool, ToolDefinition)> {
    vec![
        tool(
            BuiltinTool::SandboxNavigate,
            "Navigate the sandboxed browser to a URL. JavaScript runs. Returns the page title, a text excerpt, links and a screenshot. The browser is started on first use.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to open"
                    }
                },
                "required": ["url"]
            }),
        ),
        tool(
            BuiltinTool::SandboxClick,
            "Click an element on the current page, found either by CSS selector or by its visible text.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector of the element to click"
                    },
                    "text": {
                        "type": "string",
                        "description": "Visible text of the element to click (used when no selector is given)"
                    }
                },
                "required": []
            }),
        ),
        tool(
            BuiltinTool::SandboxType,
            "Type text into an input. Targets the element matching the selector, or the focused element if none is given.",
            json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to type"
                    },
                    "selector": {
                        "type": "string",
                        "description": "CSS selector of the input (optional)"
                    },
                    "press_enter": {
                        "type": "boolean",
                        "description": "Press Enter after typing (default: false)"
                    }
                },
                "required": ["text"]
            }),
        ),
        tool(
            BuiltinTool::SandboxPress,
            "Press a key on the focused element (e.g. Enter, Tab, Escape, ArrowDown).",
            json!({
                "type": "object",
                "properties": {
                    "key": {
                        "type": "string",
                        "description": "Key name or single character"
                    }
                },
                "required": ["key"]
            }),
        ),
        tool(
            BuiltinTool::SandboxScroll,
            "Scroll the current page.",
            json!({
                "type": "object",
                "properties": {
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down"],
                        "description": "Scroll direction (default: down)"
                    },
                    "pixels": {
                        "type": "integer",
                        "description": "Distance in pixels (default: 600)"
                    }
                },
                "required": []
            }),
        ),
        tool(
            BuiltinTool::SandboxExtractText,
            "Return the rendered text of the current page.",
            json!({
                "type": "object",
                "properties": {
                    "max_chars": {
                        "type": "integer",
                        "description": "Maximum characters to return (optional)"
                    }
                },
                "required": []
            }),
        ),
        tool(
            BuiltinTool::SandboxScreenshot,
            "Take a screenshot of the current page. Returns base64-encoded PNG bytes.",
            no_arguments(),
        ),
        tool(
            BuiltinTool::SandboxReset,
            "Shut down the sandboxed browser. The next sandbox tool call starts a fresh one.",
            no_arguments(),
        ),
    ]
}

fn create_code_execution_tools() -> Vec<(BuiltinTool, ToolDefinition)> {
    vec![tool(
        BuiltinTool::RunPython,
        "Run a Python script and return its stdout, stderr and exit code.",
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python source to run"
                }
            },
            "required": ["code"]
        }),
    )]
}
