use std::sync::Arc;

use tracing::{debug, info, warn};

use super::errors::AgentError;
use crate::application::tools::ToolRegistry;
use crate::domain::types::{ToolSpec, Turn, TurnRole};
use crate::infrastructure::planner::{Planner, PlannerReply};

const STEP_LIMIT_NOTICE: &str =
    "I ran out of steps before finishing the task. The progress so far is recorded above.";

/// The bounded plan/act/observe cycle driving one job.
///
/// Each iteration is one Think round; however many tool calls the planner
/// batches into it, the step counter advances by one. The loop terminates
/// either on a final answer or when the counter reaches the limit, never by
/// running an unbounded number of planner round trips.
pub struct Agent {
    planner: Arc<dyn Planner>,
    tools: Arc<ToolRegistry>,
    specs: Vec<ToolSpec>,
    system_prompt: String,
    step_limit: usize,
}

impl Agent {
    pub fn new(
        planner: Arc<dyn Planner>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        step_limit: usize,
    ) -> Self {
        let specs = tools.specs();
        Self {
            planner,
            tools,
            specs,
            system_prompt: system_prompt.into(),
            step_limit: step_limit.max(1),
        }
    }

    /// Runs the cycle over `turns` and returns the full resulting sequence:
    /// everything passed in plus every turn produced along the way. The
    /// caller slices out the newly produced suffix.
    pub async fn run(&self, mut turns: Vec<Turn>) -> Result<Vec<Turn>, AgentError> {
        for step in 1..=self.step_limit {
            debug!(step, limit = self.step_limit, "Requesting plan");
            let reply = self
                .planner
                .plan(&self.system_prompt, &turns, &self.specs)
                .await?;

            match reply {
                PlannerReply::Final { content } => {
                    info!(step, "Planner returned final answer");
                    turns.push(Turn::assistant(content));
                    return Ok(turns);
                }
                PlannerReply::Act { content, requests } => {
                    info!(step, calls = requests.len(), "Planner requested tools");
                    turns.push(Turn::acting(content, requests.clone()));
                    for request in requests {
                        let observation =
                            self.tools.dispatch(&request.name, request.arguments).await;
                        turns.push(Turn::observation(request.id, observation));
                    }
                }
            }
        }

        warn!(limit = self.step_limit, "Step limit reached without a final answer");
        let fallback = turns
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Assistant && !turn.content.trim().is_empty())
            .map(|turn| turn.content.clone())
            .unwrap_or_else(|| STEP_LIMIT_NOTICE.to_string());
        turns.push(Turn::assistant(fallback));
        Ok(turns)
    }
}
