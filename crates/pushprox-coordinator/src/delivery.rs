//! Response rendezvous slots.
//!
//! One slot per scrape id, created lazily by whichever side arrives
//! first and removed on delivery, timeout, or abandonment. Exactly one
//! response is ever handed over per id.

use std::collections::HashMap;

use tokio::sync::oneshot;

use pushprox_wire::ScrapeResponse;

#[derive(Debug)]
enum ResponseSlot {
    /// The scrape got here first and waits for the push.
    AwaiterParked {
        deliver: oneshot::Sender<ScrapeResponse>,
    },
    /// The push got here first and waits to be consumed.
    ResponseParked {
        response: ScrapeResponse,
        consumed: oneshot::Sender<()>,
    },
}

/// Outcome of a push-side delivery attempt.
#[derive(Debug)]
pub(crate) enum DeliverDisposition {
    /// The waiting scrape took the response.
    Consumed,
    /// No awaiter yet; the response is parked under its id.
    Parked,
    /// Another push already parked a response for this id.
    Occupied,
}

#[derive(Debug, Default)]
pub(crate) struct ResponseSlots {
    slots: HashMap<String, ResponseSlot>,
}

impl ResponseSlots {
    /// Push side: hand the response to a parked awaiter, or park it.
    pub(crate) fn deliver(
        &mut self,
        id: &str,
        response: ScrapeResponse,
        consumed: oneshot::Sender<()>,
    ) -> DeliverDisposition {
        match self.slots.remove(id) {
            Some(ResponseSlot::AwaiterParked { deliver }) => match deliver.send(response) {
                Ok(()) => DeliverDisposition::Consumed,
                // The awaiter died mid-handoff; park so its guard or the
                // push timeout reclaims the slot.
                Err(returned) => {
                    self.slots.insert(
                        id.to_string(),
                        ResponseSlot::ResponseParked {
                            response: returned,
                            consumed,
                        },
                    );
                    DeliverDisposition::Parked
                }
            },
            Some(occupied @ ResponseSlot::ResponseParked { .. }) => {
                self.slots.insert(id.to_string(), occupied);
                DeliverDisposition::Occupied
            }
            None => {
                self.slots.insert(
                    id.to_string(),
                    ResponseSlot::ResponseParked { response, consumed },
                );
                DeliverDisposition::Parked
            }
        }
    }

    /// Scrape side: take a parked response, or park the awaiter.
    pub(crate) fn take_or_park(
        &mut self,
        id: &str,
        deliver: oneshot::Sender<ScrapeResponse>,
    ) -> Option<ScrapeResponse> {
        match self.slots.remove(id) {
            Some(ResponseSlot::ResponseParked { response, consumed }) => {
                let _ = consumed.send(());
                Some(response)
            }
            // Ids are unique, so an AwaiterParked entry here can only be a
            // stale leftover; replace it.
            Some(ResponseSlot::AwaiterParked { .. }) | None => {
                self.slots
                    .insert(id.to_string(), ResponseSlot::AwaiterParked { deliver });
                None
            }
        }
    }

    /// Remove a parked awaiter; true if one was present.
    pub(crate) fn remove_awaiter(&mut self, id: &str) -> bool {
        match self.slots.get(id) {
            Some(ResponseSlot::AwaiterParked { .. }) => {
                self.slots.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Remove a parked response; true if one was present.
    pub(crate) fn remove_parked_response(&mut self, id: &str) -> bool {
        match self.slots.get(id) {
            Some(ResponseSlot::ResponseParked { .. }) => {
                self.slots.remove(id);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::StatusCode;

    fn response() -> ScrapeResponse {
        ScrapeResponse::new(StatusCode::OK)
    }

    #[test]
    fn deliver_reaches_parked_awaiter() {
        let mut slots = ResponseSlots::default();
        let (awaiter_tx, mut awaiter_rx) = oneshot::channel();
        assert!(slots.take_or_park("id-1", awaiter_tx).is_none());

        let (consumed_tx, _consumed_rx) = oneshot::channel();
        assert!(matches!(
            slots.deliver("id-1", response(), consumed_tx),
            DeliverDisposition::Consumed
        ));
        assert!(awaiter_rx.try_recv().is_ok());
        assert_eq!(slots.slot_count(), 0);
    }

    #[test]
    fn early_push_parks_until_taken() {
        let mut slots = ResponseSlots::default();
        let (consumed_tx, mut consumed_rx) = oneshot::channel();
        assert!(matches!(
            slots.deliver("id-1", response(), consumed_tx),
            DeliverDisposition::Parked
        ));

        let (awaiter_tx, _awaiter_rx) = oneshot::channel();
        assert!(slots.take_or_park("id-1", awaiter_tx).is_some());
        assert!(consumed_rx.try_recv().is_ok());
        assert_eq!(slots.slot_count(), 0);
    }

    #[test]
    fn dead_awaiter_turns_delivery_into_park() {
        let mut slots = ResponseSlots::default();
        let (awaiter_tx, awaiter_rx) = oneshot::channel();
        assert!(slots.take_or_park("id-1", awaiter_tx).is_none());
        drop(awaiter_rx);

        let (consumed_tx, _consumed_rx) = oneshot::channel();
        assert!(matches!(
            slots.deliver("id-1", response(), consumed_tx),
            DeliverDisposition::Parked
        ));
        assert!(slots.remove_parked_response("id-1"));
    }

    #[test]
    fn second_push_for_same_id_is_occupied() {
        let mut slots = ResponseSlots::default();
        let (first_tx, _first_rx) = oneshot::channel();
        slots.deliver("id-1", response(), first_tx);

        let (second_tx, _second_rx) = oneshot::channel();
        assert!(matches!(
            slots.deliver("id-1", response(), second_tx),
            DeliverDisposition::Occupied
        ));
        assert_eq!(slots.slot_count(), 1);
    }

    #[test]
    fn typed_removal_ignores_the_other_side() {
        let mut slots = ResponseSlots::default();
        let (awaiter_tx, _awaiter_rx) = oneshot::channel();
        slots.take_or_park("id-1", awaiter_tx);

        assert!(!slots.remove_parked_response("id-1"));
        assert!(slots.remove_awaiter("id-1"));
        assert!(!slots.remove_awaiter("id-1"));
        assert_eq!(slots.slot_count(), 0);
    }
}
