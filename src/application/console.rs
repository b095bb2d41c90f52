use std::sync::Arc;

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info};

use super::job::JobRunner;
use super::session::{SessionKey, SessionRegistry};

const HELP_TEXT: &str = "Commands: /clear or /reset empties the conversation memory, /memory or /stats reports the stored turn count, /help shows this text. Anything else is a task for the browser agent.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Clear,
    Memory,
    Help,
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim() {
        "/clear" | "/reset" => Some(ConsoleCommand::Clear),
        "/memory" | "/stats" => Some(ConsoleCommand::Memory),
        "/help" => Some(ConsoleCommand::Help),
        _ => None,
    }
}

/// Line-oriented prompt for the single implicit console session. Returns
/// when stdin closes or an interrupt arrives; the caller tears down the
/// browser afterwards.
pub async fn run(
    registry: Arc<SessionRegistry>,
    runner: Arc<JobRunner>,
) -> Result<(), std::io::Error> {
    let session = registry.resolve(SessionKey::Console);
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = io::stdout();

    info!("Console ready; type a task or /help");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupt received; leaving console");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_command(input) {
            Some(ConsoleCommand::Clear) => {
                session.clear().await;
                stdout.write_all(b"Memory cleared.\n").await?;
            }
            Some(ConsoleCommand::Memory) => {
                let count = session.turn_count().await;
                stdout
                    .write_all(format!("{count} turns stored.\n").as_bytes())
                    .await?;
            }
            Some(ConsoleCommand::Help) => {
                stdout.write_all(HELP_TEXT.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            None => match runner.run(&session, input).await {
                Ok(answer) => {
                    stdout.write_all(answer.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
                Err(err) => {
                    error!(%err, "Job failed");
                    stdout
                        .write_all(format!("Error: {}\n", err.user_message()).as_bytes())
                        .await?;
                }
            },
        }
        stdout.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Turn;

    #[test]
    fn recognizes_commands_and_aliases() {
        assert_eq!(parse_command("/clear"), Some(ConsoleCommand::Clear));
        assert_eq!(parse_command("/reset"), Some(ConsoleCommand::Clear));
        assert_eq!(parse_command("/memory"), Some(ConsoleCommand::Memory));
        assert_eq!(parse_command("/stats"), Some(ConsoleCommand::Memory));
        assert_eq!(parse_command("  /help  "), Some(ConsoleCommand::Help));
        assert_eq!(parse_command("open example.com"), None);
        assert_eq!(parse_command("/unknown"), None);
    }

    #[tokio::test]
    async fn clear_then_memory_reports_zero() {
        let registry = SessionRegistry::new(10);
        let session = registry.resolve(SessionKey::Console);
        session
            .lock()
            .await
            .append([Turn::user("u1"), Turn::assistant("a1")]);

        assert_eq!(parse_command("/clear"), Some(ConsoleCommand::Clear));
        session.clear().await;
        assert_eq!(parse_command("/memory"), Some(ConsoleCommand::Memory));
        assert_eq!(session.turn_count().await, 0);
    }
}
