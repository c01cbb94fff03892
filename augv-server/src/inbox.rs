// Single-slot, most-recent-wins mailbox between ingestion and an agent worker

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Outcome of offering an item to an [`Inbox`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Slot was empty
    Accepted,
    /// An undelivered item was overwritten
    Replaced,
    /// Inbox closed; item discarded
    Closed,
}

struct Slot<T> {
    item: Option<T>,
    closed: bool,
}

/// Capacity-one inbox. Producers never block; the single consumer waits in
/// [`Inbox::recv`] until an item arrives or the inbox is closed.
pub struct Inbox<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

impl<T> Default for Inbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Inbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                item: None,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Put an item in the slot, replacing any item the consumer has not taken yet
    pub fn offer(&self, item: T) -> Offer {
        let outcome = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return Offer::Closed;
            }
            if slot.item.replace(item).is_some() {
                Offer::Replaced
            } else {
                Offer::Accepted
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next item. Returns `None` once closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut slot = self.slot.lock();
                if let Some(item) = slot.item.take() {
                    return Some(item);
                }
                if slot.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.slot.lock().item.take()
    }

    pub fn close(&self) {
        self.slot.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }
}
