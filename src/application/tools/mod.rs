mod catalog;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::types::ToolSpec;
use crate::infrastructure::browser::BrowserDriver;

use catalog::{
    ClickParams, NavigateParams, PressKeyParams, ReadPageParams, ScrollParams, ToolEntry,
    ToolKind, TypeTextParams, WaitForParams,
};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_WAIT_SECONDS: u64 = 20;
const MAX_OBSERVATION_CHARS: usize = 6000;

/// Lookup table of `{spec, kind}` rows over the shared browser resource.
///
/// `dispatch` is the tool boundary of the step loop: it validates arguments
/// against the declared schema, bounds the invocation with a timeout, and
/// resolves every failure mode into a descriptive observation string. It
/// never panics and never returns an error to the caller.
pub struct ToolRegistry {
    driver: Arc<dyn BrowserDriver>,
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self::with_timeout(driver, DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(driver: Arc<dyn BrowserDriver>, tool_timeout: Duration) -> Self {
        let entries = catalog::entries();
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.spec.name.to_lowercase(), position))
            .collect();
        Self {
            driver,
            entries,
            index,
            timeout: tool_timeout,
        }
    }

    /// Catalog handed to the planner.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.entries.iter().map(|entry| entry.spec.clone()).collect()
    }

    pub async fn dispatch(&self, name: &str, arguments: Value) -> String {
        let Some(&position) = self.index.get(&name.to_lowercase()) else {
            warn!(requested_tool = %name, "Unknown tool requested");
            return format!(
                "Error: unknown tool '{name}'. Available tools: {}.",
                self.entries
                    .iter()
                    .map(|entry| entry.spec.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        };
        let entry = &self.entries[position];

        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        if let Err(reason) = validate_arguments(&entry.spec.parameters, &arguments) {
            warn!(tool = %entry.spec.name, %reason, "Rejected tool arguments");
            return format!("Error: {reason}");
        }

        debug!(tool = %entry.spec.name, "Dispatching tool");
        match timeout(self.timeout, self.execute(entry.kind, arguments)).await {
            Ok(Ok(observation)) => {
                info!(tool = %entry.spec.name, success = true, "Tool executed");
                truncate_observation(observation)
            }
            Ok(Err(message)) => {
                warn!(tool = %entry.spec.name, %message, "Tool execution failed");
                format!("Error: {message}")
            }
            Err(_) => {
                warn!(tool = %entry.spec.name, "Tool execution timed out");
                format!(
                    "Error: tool '{}' timed out after {}s",
                    entry.spec.name,
                    self.timeout.as_secs()
                )
            }
        }
    }

    async fn execute(&self, kind: ToolKind, arguments: Value) -> Result<String, String> {
        match kind {
            ToolKind::Navigate => {
                let params: NavigateParams = parse_params(arguments)?;
                self.driver
                    .navigate(&params.url)
                    .await
                    .map_err(|err| err.to_string())
            }
            ToolKind::Click => {
                let params: ClickParams = parse_params(arguments)?;
                self.driver
                    .click(&params.selector)
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(format!("Clicked '{}'.", params.selector))
            }
            ToolKind::TypeText => {
                let params: TypeTextParams = parse_params(arguments)?;
                self.driver
                    .type_text(&params.selector, &params.text)
                    .await
                    .map_err(|err| err.to_string())?;
                if params.press_enter {
                    self.driver
                        .press_key(&params.selector, "Enter")
                        .await
                        .map_err(|err| err.to_string())?;
                    Ok(format!("Typed into '{}' and pressed Enter.", params.selector))
                } else {
                    Ok(format!("Typed into '{}'.", params.selector))
                }
            }
            ToolKind::PressKey => {
                let params: PressKeyParams = parse_params(arguments)?;
                self.driver
                    .press_key(&params.selector, &params.key)
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(format!("Pressed {} on '{}'.", params.key, params.selector))
            }
            ToolKind::ReadPage => {
                let params: ReadPageParams = parse_params(arguments)?;
                let text = self
                    .driver
                    .read_text(params.selector.as_deref())
                    .await
                    .map_err(|err| err.to_string())?;
                if text.trim().is_empty() {
                    Ok("The page has no visible text.".to_string())
                } else {
                    Ok(text)
                }
            }
            ToolKind::ListLinks => {
                let links = self
                    .driver
                    .list_links()
                    .await
                    .map_err(|err| err.to_string())?;
                if links.is_empty() {
                    return Ok("No links found on the current page.".to_string());
                }
                let listing = links
                    .iter()
                    .enumerate()
                    .map(|(position, link)| {
                        format!("{}. {} ({})", position + 1, link.text, link.href)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(listing)
            }
            ToolKind::Scroll => {
                let params: ScrollParams = parse_params(arguments)?;
                self.driver
                    .scroll_by(params.pixels)
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(format!("Scrolled by {} pixels.", params.pixels))
            }
            ToolKind::GoBack => {
                let url = self
                    .driver
                    .go_back()
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(format!("Went back; now at {url}"))
            }
            ToolKind::CurrentUrl => {
                let url = self
                    .driver
                    .current_url()
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(format!("Current URL: {url}"))
            }
            ToolKind::WaitFor => {
                let params: WaitForParams = parse_params(arguments)?;
                let seconds = params.seconds.min(MAX_WAIT_SECONDS);
                self.driver
                    .wait_for(&params.selector, Duration::from_secs(seconds))
                    .await
                    .map_err(|err| err.to_string())?;
                Ok(format!("Element '{}' appeared.", params.selector))
            }
        }
    }
}

fn parse_params<T: DeserializeOwned>(arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments).map_err(|err| format!("invalid arguments: {err}"))
}

/// Generic pre-dispatch check of arguments against the declared schema:
/// required keys must be present and provided values must match the
/// declared primitive types. Unknown extra keys are ignored.
fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let Some(object) = arguments.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                return Err(format!("missing required argument '{name}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in object {
            let Some(expected) = properties
                .get(key)
                .and_then(|property| property.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!("argument '{key}' should be of type {expected}"));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn truncate_observation(text: String) -> String {
    if text.chars().count() <= MAX_OBSERVATION_CHARS {
        return text;
    }
    let mut truncated: String = text.chars().take(MAX_OBSERVATION_CHARS).collect();
    truncated.push_str("\n[truncated]");
    truncated
}
