//! Inquiry lifecycle notifications.
//!
//! The service receives an [`EventPublisher`] at construction; tests use
//! [`NoopPublisher`], the binary wires a [`BroadcastPublisher`] so in-process
//! listeners (the workflow engine resuming a paused execution) can subscribe.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InquiryEvent {
    Created { id: String, user: String },
    Responded { id: String, user: String },
    TimedOut { id: String },
}

impl InquiryEvent {
    pub fn inquiry_id(&self) -> &str {
        match self {
            InquiryEvent::Created { id, .. }
            | InquiryEvent::Responded { id, .. }
            | InquiryEvent::TimedOut { id } => id,
        }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: InquiryEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: InquiryEvent) {}
}

#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<InquiryEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InquiryEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: InquiryEvent) {
        let id = event.inquiry_id().to_string();
        // send only fails when nobody is listening
        if self.tx.send(event).is_err() {
            tracing::debug!(inquiry = %id, "no subscribers for inquiry event");
        }
    }
}
