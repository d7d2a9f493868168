//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is what every handler receives. It holds trait objects for the
//! four durable stores, the Advisor and the transport, plus the in-memory
//! rate limiter and the callback router. Clone is cheap: everything inside
//! is `Arc`-wrapped. Production wires Postgres stores and the Telegram
//! client; tests wire [`test_helpers`].

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::DinnerConfig;
use crate::event::ChatId;
use crate::handlers::callbacks::{self, CallbackRouter};
use crate::rate_limit::{RateLimitConfig, RateLimitError, RateLimiter};
use crate::services::advisor::Advisor;
use crate::services::chat_state::{ChatStateStore, PgChatStateStore};
use crate::services::fridge::{IngredientStore, PgIngredientStore};
use crate::services::poll::PollBuilder;
use crate::services::suggestions::{PgSuggestionPool, SuggestionPool};
use crate::services::votes::{PgVoteLedger, VoteLedger};
use crate::transport::Transport;

// =============================================================================
// STORES
// =============================================================================

/// The four durable per-chat stores.
#[derive(Clone)]
pub struct Stores {
    pub modes: Arc<dyn ChatStateStore>,
    pub fridge: Arc<dyn IngredientStore>,
    pub suggestions: Arc<dyn SuggestionPool>,
    pub votes: Arc<dyn VoteLedger>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            modes: Arc::new(PgChatStateStore::new(pool.clone())),
            fridge: Arc::new(PgIngredientStore::new(pool.clone())),
            suggestions: Arc::new(PgSuggestionPool::new(pool.clone())),
            votes: Arc::new(PgVoteLedger::new(pool)),
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub modes: Arc<dyn ChatStateStore>,
    pub fridge: Arc<dyn IngredientStore>,
    pub suggestions: Arc<dyn SuggestionPool>,
    pub votes: Arc<dyn VoteLedger>,
    pub advisor: Arc<dyn Advisor>,
    pub transport: Arc<dyn Transport>,
    /// In-memory rate limiter for Advisor calls.
    pub rate_limiter: RateLimiter,
    pub dinner: Arc<DinnerConfig>,
    pub callbacks: Arc<CallbackRouter>,
}

impl AppState {
    #[must_use]
    pub fn new(
        stores: Stores,
        advisor: Arc<dyn Advisor>,
        transport: Arc<dyn Transport>,
        dinner: DinnerConfig,
        rate_limit: RateLimitConfig,
    ) -> Self {
        Self {
            modes: stores.modes,
            fridge: stores.fridge,
            suggestions: stores.suggestions,
            votes: stores.votes,
            advisor,
            transport,
            rate_limiter: RateLimiter::new(rate_limit),
            dinner: Arc::new(dinner),
            callbacks: Arc::new(callbacks::router()),
        }
    }

    /// Poll builder over this state's stores and Advisor.
    #[must_use]
    pub fn poll_builder(&self) -> PollBuilder<'_> {
        PollBuilder {
            suggestions: self.suggestions.as_ref(),
            ingredients: self.fridge.as_ref(),
            advisor: self.advisor.as_ref(),
            max_options: self.dinner.poll_max_options,
            policy: self.dinner.commit,
        }
    }

    /// Reserve one Advisor call for the chat.
    ///
    /// # Errors
    ///
    /// Returns the limit that was hit.
    pub fn advisor_permit(&self, chat_id: ChatId) -> Result<(), RateLimitError> {
        self.rate_limiter.check_and_record(chat_id)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::event::{ChatEvent, Sender};
    use crate::services::advisor::{AdvisorError, DishCandidate, DishInfo};
    use crate::services::memory::MemoryStore;
    use crate::transport::{Button, MessageId, PostedPoll, TransportError};

    // ----- recording transport -----

    /// One outbound action captured by [`RecordingTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Text { chat_id: ChatId, message_id: MessageId, text: String },
        Buttons { chat_id: ChatId, message_id: MessageId, text: String, buttons: Vec<Button> },
        Edit { chat_id: ChatId, message_id: MessageId, text: String },
        RemoveButtons { chat_id: ChatId, message_id: MessageId },
        Poll { chat_id: ChatId, message_id: MessageId, poll_id: String, question: String, options: Vec<String> },
        Ack { callback_id: String, text: Option<String> },
    }

    impl Sent {
        #[must_use]
        pub fn chat_id(&self) -> Option<ChatId> {
            match self {
                Self::Text { chat_id, .. }
                | Self::Buttons { chat_id, .. }
                | Self::Edit { chat_id, .. }
                | Self::RemoveButtons { chat_id, .. }
                | Self::Poll { chat_id, .. } => Some(*chat_id),
                Self::Ack { .. } => None,
            }
        }

        /// Visible text of a message or edit.
        #[must_use]
        pub fn text(&self) -> Option<&str> {
            match self {
                Self::Text { text, .. } | Self::Buttons { text, .. } | Self::Edit { text, .. } => Some(text),
                _ => None,
            }
        }
    }

    /// [`Transport`] that records every call and always succeeds unless
    /// told to fail polls or sends.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<Sent>>,
        next_id: AtomicI64,
        pub fail_polls: AtomicBool,
        pub fail_sends: AtomicBool,
    }

    impl RecordingTransport {
        fn record(&self, sent: Sent) {
            self.sent.lock().unwrap().push(sent);
        }

        fn next_message_id(&self) -> MessageId {
            self.next_id.fetch_add(1, Ordering::SeqCst) + 100
        }

        fn send_check(&self) -> Result<(), TransportError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                Err(TransportError::Request("injected".into()))
            } else {
                Ok(())
            }
        }

        #[must_use]
        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        #[must_use]
        pub fn sent_to(&self, chat_id: ChatId) -> Vec<Sent> {
            self.sent().into_iter().filter(|s| s.chat_id() == Some(chat_id)).collect()
        }

        /// Texts of messages and edits for the chat, in order.
        #[must_use]
        pub fn texts(&self, chat_id: ChatId) -> Vec<String> {
            self.sent_to(chat_id)
                .iter()
                .filter_map(|s| s.text().map(str::to_owned))
                .collect()
        }

        #[must_use]
        pub fn polls(&self, chat_id: ChatId) -> Vec<Vec<String>> {
            self.sent_to(chat_id)
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Poll { options, .. } => Some(options),
                    _ => None,
                })
                .collect()
        }

        #[must_use]
        pub fn acks(&self) -> Vec<(String, Option<String>)> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Ack { callback_id, text } => Some((callback_id, text)),
                    _ => None,
                })
                .collect()
        }

        /// Button tags of the last message with buttons in the chat.
        #[must_use]
        pub fn last_buttons(&self, chat_id: ChatId) -> Vec<String> {
            self.sent_to(chat_id)
                .into_iter()
                .rev()
                .find_map(|s| match s {
                    Sent::Buttons { buttons, .. } => Some(buttons.into_iter().map(|b| b.data).collect()),
                    _ => None,
                })
                .unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageId, TransportError> {
            self.send_check()?;
            let message_id = self.next_message_id();
            self.record(Sent::Text { chat_id, message_id, text: text.into() });
            Ok(message_id)
        }

        async fn send_with_buttons(
            &self,
            chat_id: ChatId,
            text: &str,
            buttons: &[Button],
        ) -> Result<MessageId, TransportError> {
            self.send_check()?;
            let message_id = self.next_message_id();
            self.record(Sent::Buttons { chat_id, message_id, text: text.into(), buttons: buttons.to_vec() });
            Ok(message_id)
        }

        async fn edit_text(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<(), TransportError> {
            self.record(Sent::Edit { chat_id, message_id, text: text.into() });
            Ok(())
        }

        async fn remove_buttons(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), TransportError> {
            self.record(Sent::RemoveButtons { chat_id, message_id });
            Ok(())
        }

        async fn send_poll(
            &self,
            chat_id: ChatId,
            question: &str,
            options: &[String],
        ) -> Result<PostedPoll, TransportError> {
            if self.fail_polls.load(Ordering::SeqCst) {
                return Err(TransportError::Rejected {
                    method: "sendPoll",
                    code: 400,
                    description: "injected".into(),
                });
            }
            let message_id = self.next_message_id();
            let poll_id = format!("poll-{message_id}");
            self.record(Sent::Poll {
                chat_id,
                message_id,
                poll_id: poll_id.clone(),
                question: question.into(),
                options: options.to_vec(),
            });
            Ok(PostedPoll { message_id, poll_id })
        }

        async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), TransportError> {
            self.record(Sent::Ack { callback_id: callback_id.into(), text: text.map(str::to_owned) });
            Ok(())
        }

        async fn resolve_file_url(&self, file_id: &str) -> Result<String, TransportError> {
            Ok(format!("https://files.test/{file_id}.jpg"))
        }
    }

    // ----- mock advisor -----

    /// One call made to [`MockAdvisor`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum AdvisorCall {
        SuggestDishes { ingredients: Vec<String>, cuisines: Vec<String>, count: usize },
        ExtractIngredients(String),
        ParseIngredients(String),
        DescribeDish(String),
    }

    /// AI candidate with filler cuisine and description.
    #[must_use]
    pub fn candidate(name: &str) -> DishCandidate {
        DishCandidate { name: name.into(), cuisine: "Fusion".into(), description: "A quick dinner".into() }
    }

    /// Scriptable [`Advisor`]. By default `suggest_dishes` returns
    /// `AI1..AIn`, ingredient extraction returns nothing, and
    /// `describe_dish` fails.
    #[derive(Default)]
    pub struct MockAdvisor {
        dishes: Mutex<Option<Vec<DishCandidate>>>,
        ingredients: Mutex<Vec<String>>,
        dish_info: Mutex<Option<DishInfo>>,
        failing: Mutex<HashSet<&'static str>>,
        calls: Mutex<Vec<AdvisorCall>>,
        gate: Mutex<Option<Arc<Notify>>>,
    }

    impl MockAdvisor {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_dishes(&self, dishes: Vec<DishCandidate>) {
            *self.dishes.lock().unwrap() = Some(dishes);
        }

        pub fn set_ingredients(&self, names: &[&str]) {
            *self.ingredients.lock().unwrap() = names.iter().map(|n| (*n).to_string()).collect();
        }

        pub fn set_dish_info(&self, info: DishInfo) {
            *self.dish_info.lock().unwrap() = Some(info);
        }

        /// Make the named operation fail with a timeout.
        pub fn fail(&self, op: &'static str) {
            self.failing.lock().unwrap().insert(op);
        }

        /// Block every call until the returned gate is notified once per call.
        #[must_use]
        pub fn hold(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(gate.clone());
            gate
        }

        #[must_use]
        pub fn calls(&self) -> Vec<AdvisorCall> {
            self.calls.lock().unwrap().clone()
        }

        async fn enter(&self, op: &'static str, call: AdvisorCall) -> Result<(), AdvisorError> {
            self.calls.lock().unwrap().push(call);
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.failing.lock().unwrap().contains(op) {
                return Err(AdvisorError::Timeout { secs: 60 });
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Advisor for MockAdvisor {
        async fn suggest_dishes(
            &self,
            ingredients: &[String],
            cuisines: &[String],
            count: usize,
        ) -> Result<Vec<DishCandidate>, AdvisorError> {
            let call =
                AdvisorCall::SuggestDishes { ingredients: ingredients.to_vec(), cuisines: cuisines.to_vec(), count };
            self.enter("suggest_dishes", call).await?;
            let scripted = self.dishes.lock().unwrap().clone();
            Ok(match scripted {
                Some(mut dishes) => {
                    dishes.truncate(count);
                    dishes
                }
                None => (1..=count).map(|i| candidate(&format!("AI{i}"))).collect(),
            })
        }

        async fn extract_ingredients(&self, photo_url: &str) -> Result<Vec<String>, AdvisorError> {
            self.enter("extract_ingredients", AdvisorCall::ExtractIngredients(photo_url.into())).await?;
            Ok(self.ingredients.lock().unwrap().clone())
        }

        async fn parse_ingredients(&self, text: &str) -> Result<Vec<String>, AdvisorError> {
            self.enter("parse_ingredients", AdvisorCall::ParseIngredients(text.into())).await?;
            Ok(self.ingredients.lock().unwrap().clone())
        }

        async fn describe_dish(&self, name: &str) -> Result<DishInfo, AdvisorError> {
            self.enter("describe_dish", AdvisorCall::DescribeDish(name.into())).await?;
            self.dish_info
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AdvisorError::Malformed("no dish info scripted".into()))
        }
    }

    // ----- harness -----

    pub struct Harness {
        pub state: AppState,
        pub store: Arc<MemoryStore>,
        pub transport: Arc<RecordingTransport>,
        pub advisor: Arc<MockAdvisor>,
    }

    #[must_use]
    pub fn harness() -> Harness {
        harness_with(DinnerConfig::default(), RateLimitConfig::default())
    }

    #[must_use]
    pub fn harness_with(dinner: DinnerConfig, rate_limit: RateLimitConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let advisor = Arc::new(MockAdvisor::new());
        let stores = Stores {
            modes: store.clone(),
            fridge: store.clone(),
            suggestions: store.clone(),
            votes: store.clone(),
        };
        let state = AppState::new(stores, advisor.clone(), transport.clone(), dinner, rate_limit);
        Harness { state, store, transport, advisor }
    }

    impl Harness {
        /// Poll until `check` holds or two seconds pass.
        pub async fn wait_until(&self, what: &str, check: impl Fn(&Self) -> bool) {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
            while !check(self) {
                assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    // ----- event builders -----

    #[must_use]
    pub fn member() -> Sender {
        Sender { id: 7, username: Some("ann".into()), first_name: "Ann".into() }
    }

    #[must_use]
    pub fn command(chat_id: ChatId, name: &str, args: &str) -> ChatEvent {
        ChatEvent::Command { chat_id, from: member(), name: name.into(), args: args.into(), photo: None }
    }

    #[must_use]
    pub fn command_with_photo(chat_id: ChatId, name: &str, file_id: &str) -> ChatEvent {
        ChatEvent::Command { chat_id, from: member(), name: name.into(), args: String::new(), photo: Some(file_id.into()) }
    }

    #[must_use]
    pub fn text(chat_id: ChatId, text: &str) -> ChatEvent {
        ChatEvent::Text { chat_id, from: member(), text: text.into() }
    }

    #[must_use]
    pub fn photo(chat_id: ChatId, file_id: &str) -> ChatEvent {
        ChatEvent::Photo { chat_id, from: member(), file_id: file_id.into() }
    }

    #[must_use]
    pub fn callback(chat_id: ChatId, message_id: MessageId, data: &str) -> ChatEvent {
        ChatEvent::Callback { chat_id, message_id, callback_id: format!("cb-{message_id}"), from: member(), data: data.into() }
    }
}
