mod application;
mod cli;
mod config;
mod domain;
mod infrastructure;

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use application::agent::Agent;
use application::console;
use application::job::JobRunner;
use application::session::SessionRegistry;
use application::tools::ToolRegistry;
use cli::Cli;
use config::AppConfig;
use infrastructure::browser::{BrowserDriver, ChromiumDriver};
use infrastructure::planner::OpenAiPlanner;
use infrastructure::telegram::{self, TelegramClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    cli.apply(&mut config);
    info!(
        model = config.planner_model.as_str(),
        chat_mode = config.telegram_token.is_some(),
        headless = config.headless,
        step_limit = config.step_limit,
        memory_capacity = config.memory_capacity,
        "Starting helmsman"
    );

    let driver = Arc::new(ChromiumDriver::launch(config.headless).await?);
    let tools = Arc::new(ToolRegistry::new(driver.clone() as Arc<dyn BrowserDriver>));
    let planner = Arc::new(OpenAiPlanner::new(
        config.planner_base_url.clone(),
        config.planner_api_key.clone(),
        config.planner_model.clone(),
    ));
    let agent = Arc::new(Agent::new(
        planner,
        tools,
        config.system_prompt.clone(),
        config.step_limit,
    ));
    let runner = Arc::new(JobRunner::new(agent));
    let registry = Arc::new(SessionRegistry::new(config.memory_capacity));

    let outcome: Result<(), Box<dyn Error>> = match config.telegram_token.as_deref() {
        Some(token) => {
            let client = Arc::new(TelegramClient::new(token));
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received; shutting down");
                    Ok(())
                }
                result = telegram::run(client, registry.clone(), runner.clone()) => {
                    result.map_err(Into::into)
                }
            }
        }
        None => console::run(registry.clone(), runner.clone())
            .await
            .map_err(Into::into),
    };

    if let Err(err) = driver.close().await {
        error!(%err, "Browser teardown failed");
    }
    info!(sessions = registry.len(), "Shutdown complete");
    registry.remove_all();
    outcome
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
