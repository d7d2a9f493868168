//! Telegram Bot API client — the production [`Transport`].
//!
//! DESIGN
//! ======
//! Every method goes through `call`, which POSTs JSON to
//! `{api_base}/bot{token}/{method}` and unwraps the `{ok, result}` envelope.
//! Request errors are stripped of their URL before they are logged so the
//! bot token never reaches log output.
//!
//! Delivery of inbound updates is either long polling ([`poller`]) or the
//! webhook route; both feed the same dispatcher.

pub mod poller;
pub mod types;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::event::ChatId;
use crate::transport::{Button, MessageId, PostedPoll, Transport, TransportError};
use types::{ApiResponse, File, InlineKeyboardMarkup, Message, Update, User};

const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Slack on top of the long-poll timeout before the HTTP request gives up.
const REQUEST_TIMEOUT_SLACK_SECS: u64 = 15;
const POLL_QUESTION_LIMIT: usize = 300;

pub struct TelegramClient {
    http: reqwest::Client,
    method_base: String,
    file_base: String,
}

impl TelegramClient {
    /// Build a client for the configured bot.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &TelegramConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + REQUEST_TIMEOUT_SLACK_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            method_base: format!("{}/bot{}", config.api_base, config.token),
            file_base: format!("{}/file/bot{}", config.api_base, config.token),
        })
    }

    async fn call<B, T>(&self, method: &'static str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(format!("{}/{method}", self.method_base))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.without_url().to_string()))?;
        let envelope: ApiResponse<T> = serde_json::from_str(&text)
            .map_err(|e| TransportError::Parse(format!("{method} (status {status}): {e}")))?;
        unwrap_envelope(method, envelope)
    }

    /// The bot's own account; its username addresses `/command@name`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the token is rejected.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Fetch pending updates, blocking up to `timeout_secs` when none are queued.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the request fails or is rejected.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query", "poll_answer"],
            }),
        )
        .await
    }

    /// Register the webhook URL and its secret token.
    ///
    /// # Errors
    ///
    /// Returns a transport error when Telegram rejects the webhook.
    pub async fn set_webhook(&self, url: &str, secret: &str) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "setWebhook",
                &serde_json::json!({
                    "url": url,
                    "secret_token": secret,
                    "allowed_updates": ["message", "callback_query", "poll_answer"],
                }),
            )
            .await?;
        Ok(())
    }

    /// Remove any webhook so `getUpdates` is allowed.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the request fails.
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let _: bool = self
            .call("deleteWebhook", &serde_json::json!({ "drop_pending_updates": false }))
            .await?;
        Ok(())
    }
}

fn unwrap_envelope<T>(method: &'static str, envelope: ApiResponse<T>) -> Result<T, TransportError> {
    if !envelope.ok {
        return Err(TransportError::Rejected {
            method,
            code: envelope.error_code.unwrap_or_default(),
            description: envelope.description.unwrap_or_default(),
        });
    }
    envelope
        .result
        .ok_or_else(|| TransportError::Parse(format!("{method}: ok response without result")))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[async_trait::async_trait]
impl Transport for TelegramClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageId, TransportError> {
        let sent: Message = self
            .call("sendMessage", &serde_json::json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(sent.message_id)
    }

    async fn send_with_buttons(
        &self,
        chat_id: ChatId,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, TransportError> {
        let sent: Message = self
            .call(
                "sendMessage",
                &serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                    "reply_markup": InlineKeyboardMarkup::row(buttons),
                }),
            )
            .await?;
        Ok(sent.message_id)
    }

    async fn edit_text(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), TransportError> {
        // Returns the edited message, or `true` for inline messages.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &serde_json::json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                    "reply_markup": InlineKeyboardMarkup::empty(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn remove_buttons(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), TransportError> {
        let _: serde_json::Value = self
            .call(
                "editMessageReplyMarkup",
                &serde_json::json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "reply_markup": InlineKeyboardMarkup::empty(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn send_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        options: &[String],
    ) -> Result<PostedPoll, TransportError> {
        let sent: Message = self
            .call(
                "sendPoll",
                &serde_json::json!({
                    "chat_id": chat_id,
                    "question": truncate_chars(question, POLL_QUESTION_LIMIT),
                    "options": options.iter().map(|o| serde_json::json!({ "text": o })).collect::<Vec<_>>(),
                    "is_anonymous": false,
                    "allows_multiple_answers": false,
                }),
            )
            .await?;
        let poll = sent
            .poll
            .ok_or_else(|| TransportError::Parse("sendPoll: response carried no poll".into()))?;
        debug!(%chat_id, poll_id = %poll.id, "poll posted");
        Ok(PostedPoll { message_id: sent.message_id, poll_id: poll.id })
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), TransportError> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::String(text.to_string());
        }
        let _: bool = self.call("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn resolve_file_url(&self, file_id: &str) -> Result<String, TransportError> {
        let file: File = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let path = file
            .file_path
            .ok_or_else(|| TransportError::Parse(format!("getFile: no file_path for {file_id}")))?;
        Ok(format!("{}/{path}", self.file_base))
    }
}
