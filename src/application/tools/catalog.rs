use serde::Deserialize;
use serde_json::json;

use crate::domain::types::ToolSpec;

/// Dispatch tag for one registry row. Adding a capability means adding a
/// variant here, a row in `entries`, and an arm in the registry's `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ToolKind {
    Navigate,
    Click,
    TypeText,
    PressKey,
    ReadPage,
    ListLinks,
    Scroll,
    GoBack,
    CurrentUrl,
    WaitFor,
}

pub(super) struct ToolEntry {
    pub spec: ToolSpec,
    pub kind: ToolKind,
}

fn entry(kind: ToolKind, name: &str, description: &str, parameters: serde_json::Value) -> ToolEntry {
    ToolEntry {
        spec: ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
        kind,
    }
}

/// The fixed capability catalog exposed to the planner.
pub(super) fn entries() -> Vec<ToolEntry> {
    vec![
        entry(
            ToolKind::Navigate,
            "navigate",
            "Open an absolute URL in the browser and wait for the page to load.",
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "Absolute URL, including the scheme." }
                },
                "required": ["url"]
            }),
        ),
        entry(
            ToolKind::Click,
            "click",
            "Click the first element matching a CSS selector.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of the element to click." }
                },
                "required": ["selector"]
            }),
        ),
        entry(
            ToolKind::TypeText,
            "type_text",
            "Type text into the first element matching a CSS selector, optionally pressing Enter afterwards.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of the input element." },
                    "text": { "type": "string", "description": "Text to type." },
                    "press_enter": { "type": "boolean", "description": "Press Enter after typing. Defaults to false." }
                },
                "required": ["selector", "text"]
            }),
        ),
        entry(
            ToolKind::PressKey,
            "press_key",
            "Press a keyboard key (for example Enter or Escape) on the element matching a CSS selector.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of the target element." },
                    "key": { "type": "string", "description": "Key name, e.g. Enter, Tab, Escape." }
                },
                "required": ["selector", "key"]
            }),
        ),
        entry(
            ToolKind::ReadPage,
            "read_page",
            "Read the visible text of the current page, or of the first element matching a CSS selector.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "Optional CSS selector to narrow the read." }
                }
            }),
        ),
        entry(
            ToolKind::ListLinks,
            "list_links",
            "List the links on the current page as numbered text and URLs.",
            json!({ "type": "object", "properties": {} }),
        ),
        entry(
            ToolKind::Scroll,
            "scroll",
            "Scroll the page vertically by a number of pixels (negative scrolls up).",
            json!({
                "type": "object",
                "properties": {
                    "pixels": { "type": "integer", "description": "Vertical distance in pixels. Defaults to 600." }
                }
            }),
        ),
        entry(
            ToolKind::GoBack,
            "go_back",
            "Go back one step in the browser history.",
            json!({ "type": "object", "properties": {} }),
        ),
        entry(
            ToolKind::CurrentUrl,
            "current_url",
            "Report the URL of the current page.",
            json!({ "type": "object", "properties": {} }),
        ),
        entry(
            ToolKind::WaitFor,
            "wait_for",
            "Wait until an element matching a CSS selector appears on the page.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector to wait for." },
                    "seconds": { "type": "integer", "description": "How long to wait. Defaults to 10, capped at 20." }
                },
                "required": ["selector"]
            }),
        ),
    ]
}

#[derive(Debug, Deserialize)]
pub(super) struct NavigateParams {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ClickParams {
    pub selector: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TypeTextParams {
    pub selector: String,
    pub text: String,
    #[serde(default)]
    pub press_enter: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct PressKeyParams {
    pub selector: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ReadPageParams {
    pub selector: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ScrollParams {
    #[serde(default = "default_scroll_pixels")]
    pub pixels: i64,
}

fn default_scroll_pixels() -> i64 {
    600
}

#[derive(Debug, Deserialize)]
pub(super) struct WaitForParams {
    pub selector: String,
    #[serde(default = "default_wait_seconds")]
    pub seconds: u64,
}

fn default_wait_seconds() -> u64 {
    10
}
