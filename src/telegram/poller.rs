//! Long-polling loop feeding Telegram updates into the dispatcher.
//!
//! ERROR HANDLING
//! ==============
//! A failed `getUpdates` is logged and retried after a short pause that
//! doubles up to a cap. The offset only advances past updates that were
//! handed to the dispatcher, so nothing is skipped across failures.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::TelegramClient;
use super::types::update_to_event;
use crate::dispatch::Dispatcher;
use crate::error::ErrorCode;

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Poll forever. Returns only if the surrounding task is dropped.
pub async fn run(
    client: Arc<TelegramClient>,
    dispatcher: Dispatcher,
    bot_username: Option<Arc<str>>,
    timeout_secs: u64,
) {
    info!(timeout_secs, "long polling for updates");
    let mut offset: i64 = 0;
    let mut retry_delay = INITIAL_RETRY_DELAY;

    loop {
        let updates = match client.get_updates(offset, timeout_secs).await {
            Ok(updates) => {
                retry_delay = INITIAL_RETRY_DELAY;
                updates
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), delay_secs = retry_delay.as_secs(), "getUpdates failed");
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let update_id = update.update_id;
            match update_to_event(update, bot_username.as_deref()) {
                Some(event) => dispatcher.dispatch(event).await,
                None => debug!(update_id, "ignoring update"),
            }
        }
    }
}
