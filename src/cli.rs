use clap::Parser;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "helmsman",
    version,
    about = "LLM-steered browser agent with console and Telegram surfaces"
)]
pub struct Cli {
    /// Run the browser with a visible window instead of headless.
    #[arg(long)]
    pub visible: bool,
    /// Maximum number of plan/act cycles per job.
    #[arg(long)]
    pub step_limit: Option<usize>,
    /// Number of turns kept per conversation.
    #[arg(long)]
    pub memory_capacity: Option<usize>,
}

impl Cli {
    /// Flags win over the environment.
    pub fn apply(&self, config: &mut AppConfig) {
        if self.visible {
            config.headless = false;
        }
        if let Some(limit) = self.step_limit {
            config.step_limit = limit.max(1);
        }
        if let Some(capacity) = self.memory_capacity {
            config.memory_capacity = capacity.max(1);
        }
    }
}
