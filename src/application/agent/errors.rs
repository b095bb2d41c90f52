use thiserror::Error;

use crate::infrastructure::planner::PlannerError;

/// Job-level failure: the planner call or the loop machinery itself broke.
/// Tool failures never surface here; they are absorbed into observation
/// strings at the registry boundary.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Planner(err) => err.user_message(),
        }
    }
}
