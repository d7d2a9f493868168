//! Outbound transport — the narrow surface the workflow talks to.
//!
//! DESIGN
//! ======
//! Handlers never build wire requests. They call [`Transport`], which the
//! Telegram client implements in production and a recording fake implements
//! in tests. Buttons are plain label/tag pairs laid out in a single row.

use crate::event::ChatId;

/// Transport-assigned id of a sent message.
pub type MessageId = i64;

/// An inline button: visible label plus the opaque tag echoed back on press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    #[must_use]
    pub fn new(label: &str, data: &str) -> Self {
        Self { label: label.to_string(), data: data.to_string() }
    }
}

/// A poll the transport accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedPoll {
    pub message_id: MessageId,
    /// Transport poll id; poll answers reference this, not the chat.
    pub poll_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport request failed: {0}")]
    Request(String),
    #[error("transport rejected {method}: {description}")]
    Rejected { method: &'static str, code: i64, description: String },
    #[error("transport response parse failed: {0}")]
    Parse(String),
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::error::ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Request(_) => "E_TRANSPORT_REQUEST",
            Self::Rejected { .. } => "E_TRANSPORT_REJECTED",
            Self::Parse(_) => "E_TRANSPORT_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Rejected { code: 429 | 500..=599, .. })
    }
}

/// Outbound actions against the messaging network.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Post a plain text message.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageId, TransportError>;

    /// Post a text message with one row of inline buttons.
    async fn send_with_buttons(&self, chat_id: ChatId, text: &str, buttons: &[Button])
    -> Result<MessageId, TransportError>;

    /// Replace a message's text. Any inline buttons are removed.
    async fn edit_text(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), TransportError>;

    /// Remove the inline buttons from a message, leaving its text.
    async fn remove_buttons(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), TransportError>;

    /// Post a non-anonymous single-choice poll.
    async fn send_poll(&self, chat_id: ChatId, question: &str, options: &[String])
    -> Result<PostedPoll, TransportError>;

    /// Acknowledge a button press, optionally with a short toast.
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), TransportError>;

    /// Turn a file id into a URL the Advisor can fetch.
    async fn resolve_file_url(&self, file_id: &str) -> Result<String, TransportError>;
}
