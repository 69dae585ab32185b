//! Change notifications — broadcast of store writes to live subscribers.
//!
//! Every successful write to an application or conversation fans out a
//! [`ChangeEvent`] on a broadcast channel. Subscribers get a [`WatchHandle`]
//! that filters for the record they care about and can be closed explicitly
//! when the consumer navigates away.

use tokio::sync::broadcast;

use crate::model::{Application, Message};

/// Capacity of the store's broadcast channel. Slow subscribers lag and
/// resume at the newest event rather than blocking writers.
pub const WATCH_CHANNEL_CAPACITY: usize = 64;

/// A single store write, carrying the record before and after the write so
/// downstream triggers can compare.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// An application row was created or merged into.
    ApplicationWritten {
        /// `None` when the write created the record.
        before: Option<Application>,
        after: Application,
    },
    /// A chat message was appended to a conversation.
    MessageAppended { message: Message },
}

impl ChangeEvent {
    /// The application this event belongs to.
    pub fn application_id(&self) -> &str {
        match self {
            Self::ApplicationWritten { after, .. } => &after.id,
            Self::MessageAppended { message } => &message.application_id,
        }
    }
}

/// A live subscription to store changes.
///
/// Dropping the handle unsubscribes; [`WatchHandle::close`] does the same
/// explicitly, after which `recv` returns `None` immediately.
pub struct WatchHandle {
    rx: broadcast::Receiver<ChangeEvent>,
    /// When set, only events for this application id are delivered.
    filter: Option<String>,
    closed: bool,
}

impl WatchHandle {
    pub(crate) fn new(rx: broadcast::Receiver<ChangeEvent>, filter: Option<String>) -> Self {
        Self {
            rx,
            filter,
            closed: false,
        }
    }

    /// Receive the next matching event, or `None` once the subscription is
    /// closed or the store has shut down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            if self.closed {
                return None;
            }
            match self.rx.recv().await {
                Ok(event) => {
                    if let Some(id) = &self.filter {
                        if event.application_id() != id {
                            continue;
                        }
                    }
                    return Some(event);
                }
                // Lagged: we missed events; keep going from the newest
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Watch subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events. Subsequent `recv` calls return `None`.
    pub fn close(&mut self) {
        self.closed = true;
    }
}
