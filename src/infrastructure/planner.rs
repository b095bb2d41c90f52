use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::types::{ToolRequest, ToolSpec, Turn, TurnRole};

/// Outcome of one Think round: either the job's final answer or a batch of
/// tool invocations to execute before thinking again.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerReply {
    Final { content: String },
    Act {
        content: String,
        requests: Vec<ToolRequest>,
    },
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("planner returned invalid response: {0}")]
    InvalidResponse(String),
}

impl PlannerError {
    pub fn user_message(&self) -> String {
        match self {
            PlannerError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the planner service. Check your network and the PLANNER_BASE_URL setting.".to_string()
                } else if err.is_timeout() {
                    "The planner request timed out. Try again in a moment.".to_string()
                } else if let Some(status) = err.status() {
                    match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            "The planner rejected the credential. Check PLANNER_API_KEY.".to_string()
                        }
                        StatusCode::TOO_MANY_REQUESTS => {
                            "The planner is rate limiting requests. Try again shortly.".to_string()
                        }
                        _ => format!(
                            "The planner request failed with status {}. Try again later.",
                            status.as_u16()
                        ),
                    }
                } else {
                    "A network error occurred while contacting the planner. Try again later."
                        .to_string()
                }
            }
            PlannerError::InvalidResponse(_) => {
                "The planner returned a response that could not be processed. Try again."
                    .to_string()
            }
        }
    }
}

/// The opaque planning collaborator: given the system prompt, the full turn
/// sequence, and the tool catalog, decide whether to act or answer.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<PlannerReply, PlannerError>;
}

/// OpenAI-compatible chat-completions client with native tool calling.
#[derive(Clone)]
pub struct OpenAiPlanner {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiPlanner {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::with_client(base_url, api_key, model, Client::new())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        format!("{trimmed}/v1/chat/completions")
    }
}

#[async_trait]
impl Planner for OpenAiPlanner {
    async fn plan(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<PlannerReply, PlannerError> {
        let url = self.endpoint();
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(system_prompt, turns),
            tools: tools.iter().map(WireTool::from).collect(),
        };
        info!(
            model = self.model.as_str(),
            messages = payload.messages.len(),
            tools = payload.tools.len(),
            "Sending plan request"
        );

        let response: ChatCompletionResponse = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Received plan response");

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| PlannerError::InvalidResponse("no choices in response".into()))?;

        decode_reply(message)
    }
}

fn build_messages(system_prompt: &str, turns: &[Turn]) -> Vec<WireMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system_prompt.trim().is_empty() {
        messages.push(WireMessage {
            role: "system".to_string(),
            content: Some(system_prompt.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
    }

    // Memory eviction can leave a tool-result turn whose requesting
    // assistant turn is gone; the wire protocol rejects such orphans.
    let mut seen_call_ids: HashSet<&str> = HashSet::new();
    for turn in turns {
        if turn.role == TurnRole::Tool {
            let orphaned = turn
                .call_id
                .as_deref()
                .is_none_or(|id| !seen_call_ids.contains(id));
            if orphaned {
                continue;
            }
        }
        for request in &turn.requests {
            seen_call_ids.insert(request.id.as_str());
        }
        messages.push(WireMessage::from(turn));
    }
    messages
}

fn decode_reply(message: ChoiceMessage) -> Result<PlannerReply, PlannerError> {
    let content = message.content.unwrap_or_default();
    let calls = message.tool_calls.unwrap_or_default();
    if calls.is_empty() {
        return Ok(PlannerReply::Final { content });
    }

    let mut requests = Vec::with_capacity(calls.len());
    for call in calls {
        let arguments = decode_arguments(&call.function.arguments)?;
        requests.push(ToolRequest {
            id: call.id,
            name: call.function.name,
            arguments,
        });
    }
    Ok(PlannerReply::Act { content, requests })
}

fn decode_arguments(raw: &str) -> Result<Value, PlannerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(trimmed).map_err(|err| {
        PlannerError::InvalidResponse(format!("tool call arguments are not valid JSON: {err}"))
    })
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Turn> for WireMessage {
    fn from(turn: &Turn) -> Self {
        let content = match turn.role {
            // Assistant turns that only carried tool calls have no content.
            TurnRole::Assistant if turn.content.is_empty() && !turn.requests.is_empty() => None,
            _ => Some(turn.content.clone()),
        };
        Self {
            role: turn.role.as_str().to_string(),
            content,
            tool_calls: turn.requests.iter().map(WireToolCall::from).collect(),
            tool_call_id: turn.call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

impl From<&ToolRequest> for WireToolCall {
    fn from(request: &ToolRequest) -> Self {
        Self {
            id: request.id.clone(),
            kind: "function".to_string(),
            function: WireFunctionCall {
                name: request.name.clone(),
                arguments: request.arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            kind: "function".to_string(),
            function: WireFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_joins_paths_correctly() {
        let planner = OpenAiPlanner::new("https://api.openai.com/", "sk-test", "gpt-4o-mini");
        assert_eq!(planner.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn builds_messages_with_tool_linkage() {
        let turns = vec![
            Turn::user("open example.com"),
            Turn::acting(
                "",
                vec![ToolRequest {
                    id: "call-1".into(),
                    name: "navigate".into(),
                    arguments: json!({"url": "https://example.com"}),
                }],
            ),
            Turn::observation("call-1", "Loaded https://example.com"),
        ];

        let messages = build_messages("be careful", &turns);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");

        let acting = &messages[2];
        assert_eq!(acting.role, "assistant");
        assert!(acting.content.is_none());
        assert_eq!(acting.tool_calls.len(), 1);
        assert_eq!(acting.tool_calls[0].function.name, "navigate");

        let observation = &messages[3];
        assert_eq!(observation.role, "tool");
        assert_eq!(observation.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let messages = build_messages("  ", &[Turn::user("hi")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn orphaned_tool_turns_are_dropped() {
        // Eviction removed the assistant turn that issued call-0; its
        // observation must not reach the wire.
        let turns = vec![
            Turn::observation("call-0", "stale result"),
            Turn::user("continue"),
            Turn::acting(
                "",
                vec![ToolRequest {
                    id: "call-1".into(),
                    name: "read_page".into(),
                    arguments: json!({}),
                }],
            ),
            Turn::observation("call-1", "fresh result"),
        ];

        let messages = build_messages("", &turns);
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool"]);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn decodes_final_reply() {
        let reply = decode_reply(ChoiceMessage {
            content: Some("all done".into()),
            tool_calls: None,
        })
        .expect("decode");
        assert_eq!(
            reply,
            PlannerReply::Final {
                content: "all done".into()
            }
        );
    }

    #[test]
    fn decodes_tool_calls_with_string_arguments() {
        let reply = decode_reply(ChoiceMessage {
            content: None,
            tool_calls: Some(vec![WireToolCall {
                id: "call-9".into(),
                kind: "function".into(),
                function: WireFunctionCall {
                    name: "click".into(),
                    arguments: r##"{"selector": "#go"}"##.into(),
                },
            }]),
        })
        .expect("decode");

        match reply {
            PlannerReply::Act { requests, .. } => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].name, "click");
                assert_eq!(requests[0].arguments, json!({"selector": "#go"}));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        assert_eq!(
            decode_arguments("").expect("decode"),
            json!({})
        );
    }

    #[test]
    fn garbage_arguments_are_an_invalid_response() {
        let error = decode_reply(ChoiceMessage {
            content: None,
            tool_calls: Some(vec![WireToolCall {
                id: "call-1".into(),
                kind: "function".into(),
                function: WireFunctionCall {
                    name: "click".into(),
                    arguments: "{not json".into(),
                },
            }]),
        })
        .expect_err("must fail");
        assert!(matches!(error, PlannerError::InvalidResponse(_)));
    }
}
