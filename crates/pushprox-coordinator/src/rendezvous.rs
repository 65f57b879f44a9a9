//! Request rendezvous slots.
//!
//! One slot per target key, created on first use and removed when its
//! last parked waiter leaves. A slot is a meeting point, not a queue:
//! it holds parked waiters from whichever side arrived first, and a
//! request only exists here while its producer is still parked on it.
//! At most one of the two sides is non-empty at any time.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;
use tokio::time::Instant;

use pushprox_wire::ScrapeRequest;

/// A scrape request in flight to a polling client, with the deadline
/// after which it must not be handed out.
#[derive(Debug)]
pub(crate) struct PendingScrape {
    pub(crate) request: ScrapeRequest,
    pub(crate) deadline: Instant,
}

/// A collector-side scrape parked until a client polls its key.
#[derive(Debug)]
pub(crate) struct ParkedProducer {
    pub(crate) seq: u64,
    pub(crate) pending: PendingScrape,
    /// Fired at the instant a consumer takes the request.
    pub(crate) picked_up: oneshot::Sender<()>,
}

/// A client poll parked until a scrape arrives for its key.
#[derive(Debug)]
pub(crate) struct ParkedConsumer {
    pub(crate) seq: u64,
    pub(crate) deliver: oneshot::Sender<PendingScrape>,
}

#[derive(Debug, Default)]
struct RequestSlot {
    producers: VecDeque<ParkedProducer>,
    consumers: VecDeque<ParkedConsumer>,
}

impl RequestSlot {
    fn is_empty(&self) -> bool {
        self.producers.is_empty() && self.consumers.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RequestSlots {
    slots: HashMap<String, RequestSlot>,
}

impl RequestSlots {
    /// Hand `pending` to a parked consumer, or give it back for parking.
    ///
    /// Consumers whose poll connection is already gone are discarded
    /// along the way.
    pub(crate) fn try_hand_off(
        &mut self,
        key: &str,
        mut pending: PendingScrape,
    ) -> Option<PendingScrape> {
        let Some(slot) = self.slots.get_mut(key) else {
            return Some(pending);
        };
        while let Some(consumer) = slot.consumers.pop_front() {
            match consumer.deliver.send(pending) {
                Ok(()) => {
                    self.remove_if_empty(key);
                    return None;
                }
                Err(returned) => pending = returned,
            }
        }
        self.remove_if_empty(key);
        Some(pending)
    }

    pub(crate) fn park_producer(&mut self, key: &str, producer: ParkedProducer) {
        self.slots
            .entry(key.to_string())
            .or_default()
            .producers
            .push_back(producer);
    }

    pub(crate) fn park_consumer(&mut self, key: &str, consumer: ParkedConsumer) {
        self.slots
            .entry(key.to_string())
            .or_default()
            .consumers
            .push_back(consumer);
    }

    /// Take the oldest parked request that is still wanted, acking its
    /// producer at the moment of pickup.
    ///
    /// Requests past their deadline are skipped (their producers reap
    /// them); requests whose producer vanished mid-handoff are dropped.
    pub(crate) fn take_pending(&mut self, key: &str) -> Option<PendingScrape> {
        let now = Instant::now();
        let taken = loop {
            let slot = self.slots.get_mut(key)?;
            let Some(idx) = slot.producers.iter().position(|p| p.pending.deadline > now) else {
                break None;
            };
            let producer = slot.producers.remove(idx).expect("indexed producer");
            if producer.picked_up.send(()).is_ok() {
                break Some(producer.pending);
            }
        };
        self.remove_if_empty(key);
        taken
    }

    /// Remove a parked producer; true if it was still parked.
    pub(crate) fn remove_producer(&mut self, key: &str, seq: u64) -> bool {
        let removed = match self.slots.get_mut(key) {
            Some(slot) => match slot.producers.iter().position(|p| p.seq == seq) {
                Some(idx) => slot.producers.remove(idx).is_some(),
                None => false,
            },
            None => return false,
        };
        self.remove_if_empty(key);
        removed
    }

    /// Remove a parked consumer; true if it was still parked.
    pub(crate) fn remove_consumer(&mut self, key: &str, seq: u64) -> bool {
        let removed = match self.slots.get_mut(key) {
            Some(slot) => match slot.consumers.iter().position(|c| c.seq == seq) {
                Some(idx) => slot.consumers.remove(idx).is_some(),
                None => false,
            },
            None => return false,
        };
        self.remove_if_empty(key);
        removed
    }

    fn remove_if_empty(&mut self, key: &str) {
        if self.slots.get(key).is_some_and(RequestSlot::is_empty) {
            self.slots.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn parked_producers(&self, key: &str) -> usize {
        self.slots.get(key).map_or(0, |s| s.producers.len())
    }

    #[cfg(test)]
    pub(crate) fn parked_consumers(&self, key: &str) -> usize {
        self.slots.get(key).map_or(0, |s| s.consumers.len())
    }
}
