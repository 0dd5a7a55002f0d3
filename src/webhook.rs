//! Correlates inbound `call-complete` webhook events with the worker
//! awaiting that specific `call_id`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex};
use tracing::warn;

use crate::error::ExplorationError;
use crate::models::CallCompleteEvent;

enum Slot {
    /// A worker is waiting; deliver the event here when it arrives.
    Waiting(oneshot::Sender<CallCompleteEvent>),
    /// The event arrived before the worker registered; buffer it briefly.
    Buffered(CallCompleteEvent, Instant),
}

/// In-memory map from `call_id` to a single-use completion signal, with a
/// bounded late-arrival buffer to tolerate registration/event races.
pub struct WebhookCorrelator {
    slots: Mutex<HashMap<String, Slot>>,
    buffer_window: Duration,
}

impl WebhookCorrelator {
    pub fn new(buffer_window: Duration) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            buffer_window,
        })
    }

    /// Register interest in `call_id` and wait up to `timeout` for its
    /// completion event. If the event already arrived (buffered), it
    /// resolves immediately.
    pub async fn await_completion(
        &self,
        call_id: &str,
        timeout: Duration,
    ) -> Result<CallCompleteEvent, ExplorationError> {
        let rx = {
            let mut slots = self.slots.lock().await;
            match slots.remove(call_id) {
                Some(Slot::Buffered(event, _)) => return Ok(event),
                Some(Slot::Waiting(_)) | None => {
                    let (tx, rx) = oneshot::channel();
                    slots.insert(call_id.to_string(), Slot::Waiting(tx));
                    rx
                }
            }
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(event)) => Ok(event),
            _ => {
                self.slots.lock().await.remove(call_id);
                Err(ExplorationError::WebhookTimeout(timeout))
            }
        }
    }

    /// Called by the HTTP handler (or a self-triggering mock) when an event
    /// arrives. Duplicate events for the same `call_id` are idempotent:
    /// the latest one wins, whether or not a waiter is already registered.
    pub async fn resolve(&self, event: CallCompleteEvent) {
        self.sweep_expired_buffered().await;

        let mut slots = self.slots.lock().await;
        match slots.remove(&event.call_id) {
            Some(Slot::Waiting(tx)) => {
                let _ = tx.send(event);
            }
            Some(Slot::Buffered(_, _)) | None => {
                slots.insert(event.call_id.clone(), Slot::Buffered(event, Instant::now()));
            }
        }
    }

    async fn sweep_expired_buffered(&self) {
        let mut slots = self.slots.lock().await;
        let window = self.buffer_window;
        let expired: Vec<String> = slots
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Buffered(_, arrived) if arrived.elapsed() > window => Some(id.clone()),
                _ => None,
            })
            .collect();

        for id in expired {
            slots.remove(&id);
            warn!(call_id = %id, "dropping unmatched webhook event past buffer window");
        }
    }
}
