use std::env;

use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PLANNER_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_PLANNER_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_STEP_LIMIT: usize = 60;
pub const DEFAULT_MEMORY_CAPACITY: usize = 50;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"
You are a web navigation assistant. You accomplish the user's task by
driving a real browser through the tools available to you: navigate to
pages, click elements, type into fields, read page text, and follow links.

Work in small steps. After each tool result, decide whether you have enough
information to answer; if so, answer directly in plain text. Selectors are
CSS. When an action fails, read the error, adjust the selector or approach,
and try again rather than repeating the same call. Never invent page
content you have not read through a tool.
"#;

/// Process configuration resolved from the environment.
///
/// The presence of a chat-platform token switches the process from the
/// console surface to the chat integration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub planner_api_key: String,
    pub planner_base_url: String,
    pub planner_model: String,
    pub telegram_token: Option<String>,
    pub headless: bool,
    pub step_limit: usize,
    pub memory_capacity: usize,
    pub system_prompt: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} is not set; export your planner API key as {name} (or put it in a .env file) and restart")]
    MissingKey { name: &'static str },
    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&|name| env::var(name).ok())
    }

    fn from_source(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let planner_api_key = lookup("PLANNER_API_KEY")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingKey {
                name: "PLANNER_API_KEY",
            })?;

        let planner_base_url = lookup("PLANNER_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PLANNER_BASE_URL.to_string());
        let planner_model = lookup("PLANNER_MODEL")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PLANNER_MODEL.to_string());

        let telegram_token = lookup("TELEGRAM_BOT_TOKEN").filter(|value| !value.trim().is_empty());

        let headless = match lookup("BROWSER_HEADLESS") {
            Some(raw) => parse_bool("BROWSER_HEADLESS", &raw)?,
            None => true,
        };

        let step_limit = match lookup("AGENT_STEP_LIMIT") {
            Some(raw) => parse_count("AGENT_STEP_LIMIT", &raw)?,
            None => DEFAULT_STEP_LIMIT,
        };
        let memory_capacity = match lookup("MEMORY_CAPACITY") {
            Some(raw) => parse_count("MEMORY_CAPACITY", &raw)?,
            None => DEFAULT_MEMORY_CAPACITY,
        };

        let system_prompt = lookup("SYSTEM_PROMPT")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.trim().to_string());

        debug!(
            chat_mode = telegram_token.is_some(),
            headless, step_limit, memory_capacity, "Resolved configuration from environment"
        );

        Ok(Self {
            planner_api_key,
            planner_base_url,
            planner_model,
            telegram_token,
            headless,
            step_limit,
            memory_capacity,
            system_prompt,
        })
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "expected a boolean (true/false, 1/0, yes/no, on/off)".into(),
        }),
    }
}

fn parse_count(name: &'static str, raw: &str) -> Result<usize, ConfigError> {
    let parsed: usize = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: "expected a non-negative integer".into(),
    })?;
    if parsed == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(parsed)
}
