use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::agent::{Agent, AgentError};
use super::session::Session;
use crate::domain::types::Turn;

/// Orchestrates one user request end to end: load prior turns, run the step
/// loop, persist only the newly produced suffix.
pub struct JobRunner {
    agent: Arc<Agent>,
}

impl JobRunner {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self { agent }
    }

    /// Holding the session lock across the whole job is what guarantees at
    /// most one job in flight per session; a concurrent message for the same
    /// identity queues here. On failure nothing is appended: the stored
    /// history is exactly what it was before the job.
    pub async fn run(&self, session: &Session, user_text: &str) -> Result<String, AgentError> {
        let job = Uuid::new_v4();
        let mut memory = session.lock().await;

        let prior = memory.count();
        let mut turns = memory.all().to_vec();
        turns.push(Turn::user(user_text));
        debug!(%job, prior, "Job started");

        let produced = self.agent.run(turns).await?;

        let answer = produced
            .last()
            .map(|turn| turn.content.clone())
            .unwrap_or_default();
        let appended = produced.len() - prior;
        memory.append(produced.into_iter().skip(prior));
        info!(%job, appended, "Job finished");
        Ok(answer)
    }
}
