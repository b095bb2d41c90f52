use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::application::job::JobRunner;
use crate::application::session::{Session, SessionKey, SessionRegistry};

/// Telegram rejects messages longer than this; longer replies are split.
pub const MESSAGE_LIMIT: usize = 4096;

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

const WELCOME_TEXT: &str = "Hi! Send me a task and I will work on it in a real browser. Use /help to see the available commands.";
const HELP_TEXT: &str = "Commands:\n/clear or /reset empties our conversation memory\n/memory or /stats reports the stored turn count\n/help shows this text\nAnything else is a task for the browser agent.";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("chat platform network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("chat platform rejected the request: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_result(self) -> Result<T, TelegramError> {
        if !self.ok {
            return Err(TelegramError::Api(
                self.description
                    .unwrap_or_else(|| "no error description".to_string()),
            ));
        }
        self.result
            .ok_or_else(|| TelegramError::Api("missing result payload".to_string()))
    }
}

/// Thin Bot API client: long-polls `getUpdates` and sends replies with
/// `sendMessage`, chunking anything over the platform limit.
pub struct TelegramClient {
    http: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(format!("https://api.telegram.org/bot{token}"))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), method)
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let envelope: ApiEnvelope<Vec<Update>> = self
            .http
            .post(self.endpoint("getUpdates"))
            .json(&json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }))
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_result()
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .post(self.endpoint("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_result().map(|_| ())
    }

    /// Sends `text` as ordered chunks within the platform's size limit.
    pub async fn send_chunked(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        for chunk in split_message(text, MESSAGE_LIMIT) {
            self.send_message(chat_id, &chunk).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Help,
    Clear,
    Memory,
}

/// Commands arrive as `/name` or `/name@botname`; anything else is a task.
fn parse_command(text: &str) -> Option<Command> {
    let first = text.trim().split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let name = first.split('@').next().unwrap_or(first);
    match name {
        "/start" => Some(Command::Start),
        "/help" => Some(Command::Help),
        "/clear" | "/reset" => Some(Command::Clear),
        "/memory" | "/stats" => Some(Command::Memory),
        _ => None,
    }
}

/// Splits on char boundaries into ordered pieces of at most `limit` chars.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        if count == limit {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Long-polling dispatch loop. Jobs run on spawned tasks so one chat's job
/// cannot stall another's; two messages from the same chat serialize on the
/// session lock inside the job runner. Poll and send failures are logged
/// and retried, never fatal.
pub async fn run(
    client: Arc<TelegramClient>,
    registry: Arc<SessionRegistry>,
    runner: Arc<JobRunner>,
) -> Result<(), TelegramError> {
    info!("Chat surface ready; long-polling for updates");
    let mut offset = 0i64;
    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(err) => {
                warn!(%err, "Polling failed; retrying");
                sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            let chat_id = message.chat.id;
            let session = registry.resolve(SessionKey::Chat(chat_id));
            debug!(chat_id, "Handling incoming message");

            // Handle off the poll loop so a long job (or a command queued
            // behind one) never stalls other chats.
            let client = client.clone();
            let runner = runner.clone();
            tokio::spawn(async move {
                handle_message(client, runner, session, chat_id, text).await;
            });
        }
    }
}

async fn handle_message(
    client: Arc<TelegramClient>,
    runner: Arc<JobRunner>,
    session: Arc<Session>,
    chat_id: i64,
    text: String,
) {
    match parse_command(&text) {
        Some(Command::Start) => reply(&client, chat_id, WELCOME_TEXT).await,
        Some(Command::Help) => reply(&client, chat_id, HELP_TEXT).await,
        Some(Command::Clear) => {
            session.clear().await;
            reply(&client, chat_id, "Memory cleared.").await;
        }
        Some(Command::Memory) => {
            let count = session.turn_count().await;
            reply(&client, chat_id, &format!("{count} turns stored.")).await;
        }
        None => {
            let answer = match runner.run(&session, &text).await {
                Ok(answer) if answer.trim().is_empty() => {
                    "I finished, but have nothing to report.".to_string()
                }
                Ok(answer) => answer,
                Err(err) => {
                    error!(%err, chat_id, "Job failed");
                    err.user_message()
                }
            };
            if let Err(err) = client.send_chunked(chat_id, &answer).await {
                error!(%err, chat_id, "Failed to deliver reply");
            }
        }
    }
}

async fn reply(client: &TelegramClient, chat_id: i64, text: &str) {
    if let Err(err) = client.send_chunked(chat_id, text).await {
        error!(%err, chat_id, "Failed to send reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_commands_with_bot_mentions() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/clear@helmsman_bot"), Some(Command::Clear));
        assert_eq!(parse_command("/reset"), Some(Command::Clear));
        assert_eq!(parse_command("/stats"), Some(Command::Memory));
        assert_eq!(parse_command("/memory extra words"), Some(Command::Memory));
        assert_eq!(parse_command("open example.com"), None);
        assert_eq!(parse_command("/elsewhere"), None);
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn short_messages_stay_in_one_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
    }

    #[test]
    fn empty_messages_produce_no_chunks() {
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn long_messages_split_in_order_within_the_limit() {
        let text = "abcdefghij".repeat(3);
        let chunks = split_message(&text, 8);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 8));
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn splitting_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = split_message(&text, 3);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 3));
    }

    #[test]
    fn endpoint_joins_method_names() {
        let client = TelegramClient::with_base_url("https://api.telegram.org/bot123:abc/");
        assert_eq!(
            client.endpoint("getUpdates"),
            "https://api.telegram.org/bot123:abc/getUpdates"
        );
    }
}
