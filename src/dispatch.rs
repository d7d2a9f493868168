//! Per-chat dispatcher.
//!
//! DESIGN
//! ======
//! One worker task per active chat, fed by a bounded channel. A worker
//! handles its chat's events strictly in arrival order, each to completion
//! (Advisor round-trips included) before the next. Chats never wait on each
//! other: queuing is a non-blocking `try_send` made under the registry
//! lock, and that lock is never held across an await.
//!
//! BACKPRESSURE
//! ============
//! When a chat's queue is full the event is dropped with a warning. A
//! dropped button press is still acknowledged and a dropped command gets a
//! "busy" reply; both are sent from a detached task so the update source
//! keeps moving.
//!
//! LIFECYCLE
//! =========
//! A worker that sees no event for `CHAT_WORKER_IDLE_SECS` takes the
//! registry lock and retires only if its queue is empty. Every send happens
//! under that same lock, so an empty queue there stays empty, and the chat
//! never has two workers at once. A worker that finds events waiting keeps
//! going. A worker that panics drops its receiver; the next send sees the
//! closed channel and spawns a replacement.
//!
//! Poll answers carry no chat id. They are resolved through the vote ledger
//! and then routed like any other event for that chat. Button presses with
//! no originating message have no chat either; they are only acknowledged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::error::ErrorCode;
use crate::event::{ChatEvent, ChatId};
use crate::handlers;
use crate::state::AppState;

const BUSY: &str = "I'm still working on your earlier requests. Please try again in a moment.";
const BUSY_ACK: &str = "Still busy, please try again.";

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    state: AppState,
    config: WorkerConfig,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    workers: HashMap<ChatId, Worker>,
    next_generation: u64,
}

struct Worker {
    tx: mpsc::Sender<ChatEvent>,
    /// Distinguishes a worker from a later replacement for the same chat.
    generation: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(state: AppState, config: WorkerConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner { state, config, registry: Mutex::new(Registry::default()) }),
        }
    }

    /// Queue an event on its chat's worker. Never waits on a worker.
    pub async fn dispatch(&self, event: ChatEvent) {
        if matches!(event, ChatEvent::DetachedCallback { .. }) {
            let state = self.inner.state.clone();
            tokio::spawn(async move { handlers::handle_event(&state, event).await });
            return;
        }
        let chat_id = match (&event, event.chat_id()) {
            (_, Some(chat_id)) => chat_id,
            (ChatEvent::PollAnswer { poll_id, .. }, None) => match self.inner.state.votes.chat_for_poll(poll_id).await {
                Ok(Some(chat_id)) => chat_id,
                Ok(None) => {
                    debug!(%poll_id, "answer for unknown poll ignored");
                    return;
                }
                Err(e) => {
                    warn!(%poll_id, error = %e, code = e.error_code(), "poll lookup failed; answer dropped");
                    return;
                }
            },
            (_, None) => return,
        };
        self.route(chat_id, event);
    }

    fn route(&self, chat_id: ChatId, mut event: ChatEvent) {
        let mut registry = self.registry();
        for _ in 0..2 {
            if !registry.workers.contains_key(&chat_id) {
                self.spawn_worker(&mut registry, chat_id);
            }
            let result = match registry.workers.get(&chat_id) {
                Some(worker) => worker.tx.try_send(event),
                None => Err(TrySendError::Closed(event)),
            };
            match result {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    drop(registry);
                    self.reject_busy(chat_id, returned);
                    return;
                }
                Err(TrySendError::Closed(returned)) => {
                    debug!(%chat_id, "worker gone; respawning");
                    registry.workers.remove(&chat_id);
                    event = returned;
                }
            }
        }
        warn!(%chat_id, kind = event.kind(), "event dropped: no worker accepted it");
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register and start a fresh worker for `chat_id`.
    fn spawn_worker(&self, registry: &mut Registry, chat_id: ChatId) {
        let (tx, rx) = mpsc::channel(self.inner.config.queue.max(1));
        let generation = registry.next_generation;
        registry.next_generation += 1;
        registry.workers.insert(chat_id, Worker { tx, generation });
        tokio::spawn(run_worker(self.clone(), chat_id, generation, rx));
    }

    /// Remove the worker's registry entry if nothing is waiting for it.
    /// Returns false when the worker must keep running.
    fn retire_if_idle(&self, chat_id: ChatId, generation: u64, rx: &mpsc::Receiver<ChatEvent>) -> bool {
        let mut registry = self.registry();
        if !rx.is_empty() {
            return false;
        }
        if registry.workers.get(&chat_id).is_some_and(|w| w.generation == generation) {
            registry.workers.remove(&chat_id);
        }
        true
    }

    fn reject_busy(&self, chat_id: ChatId, event: ChatEvent) {
        warn!(%chat_id, kind = event.kind(), queue = self.inner.config.queue, "chat queue full; event dropped");
        let transport = self.inner.state.transport.clone();
        match event {
            ChatEvent::Callback { callback_id, .. } => {
                tokio::spawn(async move {
                    if let Err(e) = transport.answer_callback(&callback_id, Some(BUSY_ACK)).await {
                        warn!(%chat_id, error = %e, code = e.error_code(), "busy answer_callback failed");
                    }
                });
            }
            ChatEvent::Command { .. } => {
                tokio::spawn(async move {
                    if let Err(e) = transport.send_text(chat_id, BUSY).await {
                        warn!(%chat_id, error = %e, code = e.error_code(), "busy reply failed");
                    }
                });
            }
            _ => {}
        }
    }

    #[cfg(test)]
    fn active_workers(&self) -> usize {
        self.registry().workers.len()
    }
}

async fn run_worker(dispatcher: Dispatcher, chat_id: ChatId, generation: u64, mut rx: mpsc::Receiver<ChatEvent>) {
    let state = dispatcher.inner.state.clone();
    let idle = dispatcher.inner.config.idle;
    debug!(%chat_id, generation, "chat worker started");

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => handle(&state, chat_id, event).await,
            Ok(None) => break,
            Err(_) => {
                if dispatcher.retire_if_idle(chat_id, generation, &rx) {
                    break;
                }
            }
        }
    }

    debug!(%chat_id, generation, "chat worker stopped");
}

async fn handle(state: &AppState, chat_id: ChatId, event: ChatEvent) {
    debug!(%chat_id, kind = event.kind(), "handling event");
    handlers::handle_event(state, event).await;
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
