use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Notifications raised by a tile layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerEvent {
    /// New tiles are available, or a pass or fetch failed with `error`
    DataChanged { error: Option<String> },
    /// The layer started or stopped waiting on visible-area fetches
    BusyChanged(bool),
}

impl LayerEvent {
    pub fn data_changed() -> Self {
        LayerEvent::DataChanged { error: None }
    }

    pub fn data_error(error: impl Into<String>) -> Self {
        LayerEvent::DataChanged {
            error: Some(error.into()),
        }
    }

    /// Error payload of a `DataChanged` event, if any
    pub fn error(&self) -> Option<&str> {
        match self {
            LayerEvent::DataChanged { error } => error.as_deref(),
            LayerEvent::BusyChanged(_) => None,
        }
    }
}

/// Fan-out of layer events to any number of channel subscribers.
///
/// Each subscriber owns an unbounded receiver. Publishing never blocks;
/// subscribers whose receiver was dropped are forgotten on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<LayerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<LayerEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: LayerEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
