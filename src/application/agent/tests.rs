use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::Agent;
use crate::application::tools::ToolRegistry;
use crate::domain::types::{ToolRequest, ToolSpec, Turn, TurnRole};
use crate::infrastructure::browser::{BrowserDriver, BrowserError, PageLink};
use crate::infrastructure::planner::{Planner, PlannerError, PlannerReply};

/// Planner stub that pops scripted replies; once the script is exhausted it
/// keeps requesting the same tool call, which models a planner that never
/// reaches a final answer.
struct ScriptedPlanner {
    replies: Mutex<VecDeque<Result<PlannerReply, PlannerError>>>,
    seen_turn_counts: Mutex<Vec<usize>>,
}

impl ScriptedPlanner {
    fn new(replies: Vec<Result<PlannerReply, PlannerError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen_turn_counts: Mutex::new(Vec::new()),
        }
    }

    fn endless() -> Self {
        Self::new(Vec::new())
    }

    fn calls(&self) -> usize {
        self.seen_turn_counts.lock().expect("seen lock").len()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        _system_prompt: &str,
        turns: &[Turn],
        _tools: &[ToolSpec],
    ) -> Result<PlannerReply, PlannerError> {
        self.seen_turn_counts
            .lock()
            .expect("seen lock")
            .push(turns.len());
        let scripted = self.replies.lock().expect("replies lock").pop_front();
        match scripted {
            Some(reply) => reply,
            None => Ok(PlannerReply::Act {
                content: String::new(),
                requests: vec![request("call-loop", "current_url", json!({}))],
            }),
        }
    }
}

struct NullDriver;

#[async_trait]
impl BrowserDriver for NullDriver {
    async fn navigate(&self, url: &str) -> Result<String, BrowserError> {
        Ok(format!("Loaded {url}"))
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        Err(BrowserError::NotFound {
            selector: selector.to_string(),
        })
    }

    async fn type_text(&self, _selector: &str, _text: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn press_key(&self, _selector: &str, _key: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn read_text(&self, _selector: Option<&str>) -> Result<String, BrowserError> {
        Ok("page text".to_string())
    }

    async fn list_links(&self) -> Result<Vec<PageLink>, BrowserError> {
        Ok(Vec::new())
    }

    async fn scroll_by(&self, _pixels: i64) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn go_back(&self) -> Result<String, BrowserError> {
        Ok("about:blank".to_string())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok("https://example.com/".to_string())
    }

    async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

fn request(id: &str, name: &str, arguments: serde_json::Value) -> ToolRequest {
    ToolRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

fn agent(planner: Arc<ScriptedPlanner>, step_limit: usize) -> Agent {
    let tools = Arc::new(ToolRegistry::new(Arc::new(NullDriver)));
    Agent::new(planner, tools, "test prompt", step_limit)
}

#[tokio::test]
async fn final_answer_ends_the_job_in_one_step() {
    let planner = Arc::new(ScriptedPlanner::new(vec![Ok(PlannerReply::Final {
        content: "example.com is reachable".into(),
    })]));
    let agent = agent(planner.clone(), 60);

    let result = agent.run(vec![Turn::user("is example.com up?")]).await.expect("run");
    assert_eq!(planner.calls(), 1);
    assert_eq!(result.len(), 2);
    assert_eq!(result[1].role, TurnRole::Assistant);
    assert_eq!(result[1].content, "example.com is reachable");
}

#[tokio::test]
async fn step_limit_bounds_a_planner_that_never_finishes() {
    let planner = Arc::new(ScriptedPlanner::endless());
    let step_limit = 5;
    let agent = agent(planner.clone(), step_limit);

    let result = agent.run(vec![Turn::user("loop forever")]).await.expect("run");

    // Exactly step_limit Think rounds, then a closing assistant turn.
    assert_eq!(planner.calls(), step_limit);
    assert_eq!(result.len(), 1 + step_limit * 2 + 1);
    let last = result.last().expect("last turn");
    assert_eq!(last.role, TurnRole::Assistant);
    assert!(last.content.contains("ran out of steps"));
}

#[tokio::test]
async fn batched_tool_calls_count_as_one_step() {
    let planner = Arc::new(ScriptedPlanner::new(vec![
        Ok(PlannerReply::Act {
            content: String::new(),
            requests: vec![
                request("call-1", "current_url", json!({})),
                request("call-2", "read_page", json!({})),
                request("call-3", "list_links", json!({})),
            ],
        }),
        Ok(PlannerReply::Final {
            content: "done".into(),
        }),
    ]));
    let agent = agent(planner.clone(), 2);

    let result = agent.run(vec![Turn::user("inspect")]).await.expect("run");
    // user + acting + 3 observations + final; two Think rounds in total.
    assert_eq!(planner.calls(), 2);
    assert_eq!(result.len(), 6);
    assert_eq!(result[5].content, "done");

    let observations: Vec<_> = result
        .iter()
        .filter(|turn| turn.role == TurnRole::Tool)
        .collect();
    assert_eq!(observations.len(), 3);
    assert_eq!(observations[0].call_id.as_deref(), Some("call-1"));
    assert_eq!(observations[2].call_id.as_deref(), Some("call-3"));
}

#[tokio::test]
async fn unknown_tool_yields_error_observation_and_the_loop_continues() {
    let planner = Arc::new(ScriptedPlanner::new(vec![
        Ok(PlannerReply::Act {
            content: String::new(),
            requests: vec![request("call-1", "teleport", json!({}))],
        }),
        Ok(PlannerReply::Final {
            content: "recovered".into(),
        }),
    ]));
    let agent = agent(planner.clone(), 10);

    let result = agent.run(vec![Turn::user("go")]).await.expect("run");
    let observation = result
        .iter()
        .find(|turn| turn.role == TurnRole::Tool)
        .expect("observation");
    assert!(observation.content.starts_with("Error: unknown tool 'teleport'"));
    assert_eq!(result.last().expect("last").content, "recovered");
}

#[tokio::test]
async fn failing_tool_is_contained_and_the_job_completes() {
    let planner = Arc::new(ScriptedPlanner::new(vec![
        Ok(PlannerReply::Act {
            content: String::new(),
            requests: vec![request("call-1", "click", json!({"selector": "#gone"}))],
        }),
        Ok(PlannerReply::Final {
            content: "the button is missing".into(),
        }),
    ]));
    let agent = agent(planner.clone(), 10);

    let result = agent.run(vec![Turn::user("press the button")]).await.expect("run");
    let observation = result
        .iter()
        .find(|turn| turn.role == TurnRole::Tool)
        .expect("observation");
    assert_eq!(
        observation.content,
        "Error: no element matches selector '#gone'"
    );
    assert_eq!(result.last().expect("last").content, "the button is missing");
}

#[tokio::test]
async fn planner_failure_propagates_as_job_error() {
    let planner = Arc::new(ScriptedPlanner::new(vec![Err(
        PlannerError::InvalidResponse("no choices in response".into()),
    )]));
    let agent = agent(planner.clone(), 10);

    let error = agent
        .run(vec![Turn::user("go")])
        .await
        .expect_err("must fail");
    assert!(!error.user_message().is_empty());
}

#[tokio::test]
async fn exhaustion_reuses_the_last_assistant_commentary() {
    let planner = Arc::new(ScriptedPlanner::new(vec![Ok(PlannerReply::Act {
        content: "Still reading the results page.".into(),
        requests: vec![request("call-1", "current_url", json!({}))],
    })]));
    let agent = agent(planner.clone(), 2);

    let result = agent.run(vec![Turn::user("search")]).await.expect("run");
    assert_eq!(
        result.last().expect("last").content,
        "Still reading the results page."
    );
}

#[tokio::test]
async fn planner_sees_the_growing_sequence() {
    let planner = Arc::new(ScriptedPlanner::new(vec![
        Ok(PlannerReply::Act {
            content: String::new(),
            requests: vec![request("call-1", "current_url", json!({}))],
        }),
        Ok(PlannerReply::Final {
            content: "done".into(),
        }),
    ]));
    let agent = agent(planner.clone(), 10);

    agent.run(vec![Turn::user("go")]).await.expect("run");
    let seen = planner.seen_turn_counts.lock().expect("seen lock").clone();
    // First Think saw the user turn; the second also saw the acting turn
    // and its observation.
    assert_eq!(seen, vec![1, 3]);
}
