//! Inbound chat events — the transport-neutral unit of work.
//!
//! DESIGN
//! ======
//! The transport adapter converts whatever the messaging network delivers
//! into a `ChatEvent`. The dispatcher routes on `chat_id()` and the workflow
//! handlers route on the event shape; neither ever sees wire types.

/// Globally unique chat identifier (one per group conversation).
pub type ChatId = i64;

/// The user who produced an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    /// Username when present, otherwise first name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.first_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A `/command`, optionally with trailing arguments and an attached photo.
    Command {
        chat_id: ChatId,
        from: Sender,
        name: String,
        args: String,
        /// File id of the largest attached photo size, if any.
        photo: Option<String>,
    },
    /// Plain, non-command text.
    Text { chat_id: ChatId, from: Sender, text: String },
    /// A photo without a command caption.
    Photo { chat_id: ChatId, from: Sender, file_id: String },
    /// An inline button press.
    Callback {
        chat_id: ChatId,
        /// The message carrying the pressed button.
        message_id: i64,
        callback_id: String,
        from: Sender,
        data: String,
    },
    /// A button press whose message the bot cannot see, such as one sent
    /// in inline mode. There is no chat to act on; it is only acknowledged.
    DetachedCallback { callback_id: String, data: String },
    /// A vote in a non-anonymous poll. Carries no chat id; the dispatcher
    /// resolves it through the vote ledger.
    PollAnswer { poll_id: String, voter: Sender, option_ids: Vec<u32> },
}

impl ChatEvent {
    /// Chat this event belongs to, when the event carries one.
    #[must_use]
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::Command { chat_id, .. }
            | Self::Text { chat_id, .. }
            | Self::Photo { chat_id, .. }
            | Self::Callback { chat_id, .. } => Some(*chat_id),
            Self::DetachedCallback { .. } | Self::PollAnswer { .. } => None,
        }
    }

    /// Short label for log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Text { .. } => "text",
            Self::Photo { .. } => "photo",
            Self::Callback { .. } => "callback",
            Self::DetachedCallback { .. } => "detached_callback",
            Self::PollAnswer { .. } => "poll_answer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(username: Option<&str>) -> Sender {
        Sender { id: 7, username: username.map(str::to_owned), first_name: "Ann".into() }
    }

    #[test]
    fn display_name_prefers_username() {
        assert_eq!(sender(Some("ann_cooks")).display_name(), "ann_cooks");
    }

    #[test]
    fn display_name_falls_back_to_first_name() {
        assert_eq!(sender(None).display_name(), "Ann");
        assert_eq!(sender(Some("")).display_name(), "Ann");
    }

    #[test]
    fn poll_answer_has_no_chat_id() {
        let event = ChatEvent::PollAnswer { poll_id: "p".into(), voter: sender(None), option_ids: vec![0] };
        assert_eq!(event.chat_id(), None);
        assert_eq!(event.kind(), "poll_answer");
    }

    #[test]
    fn detached_callback_has_no_chat_id() {
        let event = ChatEvent::DetachedCallback { callback_id: "cb".into(), data: "show_fridge".into() };
        assert_eq!(event.chat_id(), None);
        assert_eq!(event.kind(), "detached_callback");
    }

    #[test]
    fn text_event_carries_chat_id() {
        let event = ChatEvent::Text { chat_id: -100, from: sender(None), text: "eggs".into() };
        assert_eq!(event.chat_id(), Some(-100));
        assert_eq!(event.kind(), "text");
    }
}
