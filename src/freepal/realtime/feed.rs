//! Per-collection broadcast channels for change events, with lazy stream
//! creation and cleanup once every receiver is gone.

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::types::ChangeEvent;
use crate::freepal::remote::Collection;

const BUFFER_SIZE: usize = 100;

pub struct ChangeFeed {
    streams: DashMap<Collection, broadcast::Sender<ChangeEvent>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
        }
    }

    pub fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        self.streams
            .entry(collection)
            .or_insert_with(|| broadcast::channel(BUFFER_SIZE).0)
            .subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        let collection = event.collection;
        if let Some(sender) = self.streams.get(&collection) {
            if sender.send(event).is_err() && sender.receiver_count() == 0 {
                drop(sender);
                self.streams.remove(&collection);
            }
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
