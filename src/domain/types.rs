use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => "tool",
        }
    }
}

/// One named capability advertised to the planner. `parameters` is a JSON
/// schema object (`type`/`properties`/`required`) passed to the planner
/// verbatim and used for generic argument validation before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One tool invocation requested by the planner within a single turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One message in a conversation. Immutable once constructed; a session's
/// history is an ordered sequence of these.
///
/// `requests` is non-empty only on assistant turns that asked for tool
/// invocations; `call_id` is set only on tool-result turns and pairs the
/// observation with the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<ToolRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            requests: Vec::new(),
            call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            requests: Vec::new(),
            call_id: None,
        }
    }

    /// Assistant turn that requested tool invocations.
    pub fn acting(content: impl Into<String>, requests: Vec<ToolRequest>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            requests,
            call_id: None,
        }
    }

    /// Tool-result turn observed after executing the request with `call_id`.
    pub fn observation(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Tool,
            content: content.into(),
            requests: Vec::new(),
            call_id: Some(call_id.into()),
        }
    }
}
