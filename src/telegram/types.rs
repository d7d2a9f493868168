//! Telegram Bot API wire types and their translation into [`ChatEvent`]s.
//!
//! Only the fields the bot reads are modelled; serde ignores the rest.

use serde::{Deserialize, Serialize};

use crate::event::{ChatEvent, Sender};
use crate::transport::Button;

// =============================================================================
// ENVELOPE
// =============================================================================

/// Every Bot API method answers with this envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

// =============================================================================
// INBOUND
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub poll_answer: Option<PollAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Poll {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub poll: Option<Poll>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    pub user: Option<User>,
    #[serde(default)]
    pub option_ids: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_path: Option<String>,
}

// =============================================================================
// OUTBOUND
// =============================================================================

#[derive(Debug, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// A single row of buttons.
    #[must_use]
    pub fn row(buttons: &[Button]) -> Self {
        let row = buttons
            .iter()
            .map(|b| InlineKeyboardButton { text: b.label.clone(), callback_data: b.data.clone() })
            .collect();
        Self { inline_keyboard: vec![row] }
    }

    /// Markup that clears any existing keyboard.
    #[must_use]
    pub fn empty() -> Self {
        Self { inline_keyboard: Vec::new() }
    }
}

// =============================================================================
// TRANSLATION
// =============================================================================

/// Translate an update into a chat event. Updates the bot does not act on
/// (edited messages, stickers, anonymous votes, commands addressed to
/// another bot, ...) yield `None`.
///
/// `bot_username` is this bot's username. When it is known, a
/// `/command@name` naming a different bot is ignored.
#[must_use]
pub fn update_to_event(update: Update, bot_username: Option<&str>) -> Option<ChatEvent> {
    if let Some(message) = update.message {
        return message_to_event(message, bot_username);
    }
    if let Some(query) = update.callback_query {
        let data = query.data.unwrap_or_default();
        let Some(message) = query.message else {
            return Some(ChatEvent::DetachedCallback { callback_id: query.id, data });
        };
        return Some(ChatEvent::Callback {
            chat_id: message.chat.id,
            message_id: message.message_id,
            callback_id: query.id,
            from: sender(Some(query.from)),
            data,
        });
    }
    if let Some(answer) = update.poll_answer {
        let voter = answer.user?;
        return Some(ChatEvent::PollAnswer {
            poll_id: answer.poll_id,
            voter: sender(Some(voter)),
            option_ids: answer.option_ids,
        });
    }
    None
}

fn message_to_event(message: Message, bot_username: Option<&str>) -> Option<ChatEvent> {
    let chat_id = message.chat.id;
    let from = sender(message.from);
    let photo = message.photo.as_deref().and_then(largest_photo);

    // A photo's command lives in its caption.
    let body = message.text.as_deref().or(message.caption.as_deref());
    if let Some(command) = body.and_then(parse_command) {
        if !command.is_for(bot_username) {
            return None;
        }
        return Some(ChatEvent::Command { chat_id, from, name: command.name, args: command.args, photo });
    }
    if let Some(file_id) = photo {
        return Some(ChatEvent::Photo { chat_id, from, file_id });
    }
    let text = message.text?;
    if text.trim().is_empty() {
        return None;
    }
    Some(ChatEvent::Text { chat_id, from, text })
}

/// A `/name@bot args` command.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased.
    pub name: String,
    /// Trimmed.
    pub args: String,
    /// The `@bot` suffix, without the `@`.
    pub addressee: Option<String>,
}

impl ParsedCommand {
    /// Whether this bot should handle the command. Bot usernames compare
    /// case-insensitively; an unknown own username accepts everything.
    #[must_use]
    pub fn is_for(&self, bot_username: Option<&str>) -> bool {
        match (&self.addressee, bot_username) {
            (Some(addressee), Some(own)) => addressee.eq_ignore_ascii_case(own),
            _ => true,
        }
    }
}

#[must_use]
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let (name, addressee) = match head.split_once('@') {
        Some((name, bot)) => (name, Some(bot.to_string())),
        None => (head, None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(ParsedCommand { name: name.to_ascii_lowercase(), args: args.trim().to_string(), addressee })
}

/// Telegram sends several sizes of the same photo; keep the biggest.
fn largest_photo(sizes: &[PhotoSize]) -> Option<String> {
    sizes
        .iter()
        .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
        .map(|p| p.file_id.clone())
}

fn sender(user: Option<User>) -> Sender {
    match user {
        Some(user) => Sender { id: user.id, username: user.username, first_name: user.first_name },
        None => Sender { id: 0, username: None, first_name: String::new() },
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
