//! The rendezvous coordinator.
//!
//! One mutex guards the membership of all three maps (waiting requests,
//! pending responses, known clients) and is never held across an await.
//! The handoff objects themselves synchronize the data flow. Every
//! parked waiter carries a drop guard, so an abandoned connection
//! (hyper drops the handler future when its peer goes away) vacates its
//! slot without any explicit disconnect signal.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use pushprox_wire::{scrape_timeout, ScrapeRequest, ScrapeResponse, ID_HEADER};

use crate::delivery::{DeliverDisposition, ResponseSlots};
use crate::error::{ScrapeError, ScrapeResult};
use crate::id::IdSource;
use crate::registry::KnownClients;
use crate::rendezvous::{ParkedConsumer, ParkedProducer, PendingScrape, RequestSlots};

#[derive(Debug, Default)]
struct Inner {
    waiting: RequestSlots,
    responses: ResponseSlots,
    known: KnownClients,
    next_seq: u64,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Broker matching collector scrapes to long-polling clients.
///
/// Cheap to clone; all clones share the same state.
#[derive(Debug, Clone)]
pub struct Coordinator {
    inner: Arc<Mutex<Inner>>,
    ids: Arc<IdSource>,
    registration_window: Duration,
}

enum OfferOutcome {
    PickedUp,
    Expired,
}

impl Coordinator {
    /// Create a coordinator whose clients stay live for
    /// `registration_window` after their last poll.
    pub fn new(registration_window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            ids: Arc::new(IdSource::new()),
            registration_window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("coordinator lock")
    }

    /// Drive one scrape end to end: mint an id, hand the request to a
    /// client polling for its `host:port`, then wait for the pushed
    /// response. `deadline` bounds both phases.
    ///
    /// Cancel-safe: dropping the returned future (collector gone)
    /// releases whatever the scrape had parked.
    pub async fn do_scrape(
        &self,
        mut request: ScrapeRequest,
        deadline: Instant,
    ) -> ScrapeResult<ScrapeResponse> {
        let url = request.uri.to_string();
        let key = request
            .target_key()
            .map_err(|_| ScrapeError::InvalidTarget { url: url.clone() })?;
        let id = self.ids.next();
        request.headers.set(ID_HEADER, id.clone());
        info!(scrape_id = %id, url = %url, key = %key, "scrape dispatched");

        match self.offer(&key, request, deadline).await {
            OfferOutcome::PickedUp => {}
            OfferOutcome::Expired => return Err(ScrapeError::NoClientMatched { url }),
        }
        debug!(scrape_id = %id, "request picked up, awaiting push");

        let response = self.receive(&id, deadline).await?;
        debug!(scrape_id = %id, status = %response.status, "scrape complete");
        Ok(response)
    }

    /// Park a client poll for `key` until a scrape request arrives.
    ///
    /// Registers the poll in the client registry first, and never hands
    /// out a request whose collector has already given up on it. Poll
    /// cancellation is the caller dropping this future.
    pub async fn wait_for_instruction(&self, key: &str) -> ScrapeRequest {
        loop {
            let (deliver_tx, deliver_rx) = oneshot::channel();
            let seq;
            {
                let mut inner = self.lock();
                inner.known.touch(key);
                if let Some(pending) = inner.waiting.take_pending(key) {
                    return pending.request;
                }
                seq = inner.next_seq();
                inner.waiting.park_consumer(
                    key,
                    ParkedConsumer {
                        seq,
                        deliver: deliver_tx,
                    },
                );
            }

            let mut guard = ParkGuard::new(
                &self.inner,
                ParkTarget::Consumer {
                    key: key.to_string(),
                    seq,
                },
            );
            match deliver_rx.await {
                Ok(pending) => {
                    guard.disarm();
                    if Instant::now() < pending.deadline {
                        return pending.request;
                    }
                    debug!(key, "discarding expired scrape at pickup, fetching another");
                }
                // Handoff fell through; park again.
                Err(_) => guard.disarm(),
            }
        }
    }

    /// Accept a pushed scrape response and hand it to the waiting
    /// scrape. The push-side deadline comes from the remaining-seconds
    /// header the client echoed; both internal headers are stripped
    /// before the response can reach the collector.
    pub async fn deliver_scrape_result(&self, mut response: ScrapeResponse) -> ScrapeResult<()> {
        let id = response
            .id()
            .ok_or(ScrapeError::MissingId)?
            .to_string();
        let push_timeout = scrape_timeout(&response.headers);
        response.strip_internal_headers();
        info!(scrape_id = %id, status = %response.status, "push received");

        let (consumed_tx, consumed_rx) = oneshot::channel();
        let disposition = self.lock().responses.deliver(&id, response, consumed_tx);
        match disposition {
            DeliverDisposition::Consumed => return Ok(()),
            DeliverDisposition::Parked => {}
            DeliverDisposition::Occupied => {
                // A response for this id is already parked; at most one
                // delivery wins.
                sleep(push_timeout).await;
                return Err(ScrapeError::PushTimedOut { id });
            }
        }

        let mut guard = ParkGuard::new(&self.inner, ParkTarget::Deliverer { id: id.clone() });
        tokio::select! {
            biased;
            consumed = consumed_rx => {
                guard.disarm();
                match consumed {
                    Ok(()) => Ok(()),
                    Err(_) => Err(ScrapeError::PushTimedOut { id }),
                }
            }
            _ = sleep(push_timeout) => {
                guard.remove_now();
                debug!(scrape_id = %id, "push timed out waiting to be consumed");
                Err(ScrapeError::PushTimedOut { id })
            }
        }
    }

    /// Snapshot of clients seen within the registration window.
    pub fn live_clients(&self) -> Vec<String> {
        self.lock().known.live(self.registration_window)
    }

    /// Periodically drop registry entries older than the registration
    /// window. Liveness filtering happens in [`Coordinator::live_clients`];
    /// this only reclaims memory.
    pub async fn run_gc(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (deleted, remaining) =
                        self.lock().known.sweep(self.registration_window);
                    info!(deleted, remaining, "client registry gc");
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Offer a request to whatever client polls `key`, parking until
    /// pickup or `deadline`.
    async fn offer(
        &self,
        key: &str,
        request: ScrapeRequest,
        deadline: Instant,
    ) -> OfferOutcome {
        let pending = PendingScrape { request, deadline };
        let (picked_tx, picked_rx) = oneshot::channel();
        let seq;
        {
            let mut inner = self.lock();
            match inner.waiting.try_hand_off(key, pending) {
                None => return OfferOutcome::PickedUp,
                Some(pending) => {
                    seq = inner.next_seq();
                    inner.waiting.park_producer(
                        key,
                        ParkedProducer {
                            seq,
                            pending,
                            picked_up: picked_tx,
                        },
                    );
                }
            }
        }

        let mut guard = ParkGuard::new(
            &self.inner,
            ParkTarget::Producer {
                key: key.to_string(),
                seq,
            },
        );
        tokio::select! {
            biased;
            picked = picked_rx => {
                if picked.is_ok() {
                    guard.disarm();
                    OfferOutcome::PickedUp
                } else if guard.remove_now() {
                    OfferOutcome::Expired
                } else {
                    // Absent from the map: a consumer won the race.
                    OfferOutcome::PickedUp
                }
            }
            _ = sleep_until(deadline) => {
                if guard.remove_now() {
                    OfferOutcome::Expired
                } else {
                    OfferOutcome::PickedUp
                }
            }
        }
    }

    /// Await the pushed response for scrape `id`, parking until delivery
    /// or `deadline`.
    async fn receive(&self, id: &str, deadline: Instant) -> ScrapeResult<ScrapeResponse> {
        let (deliver_tx, deliver_rx) = oneshot::channel();
        if let Some(response) = self.lock().responses.take_or_park(id, deliver_tx) {
            return Ok(response);
        }

        let mut guard = ParkGuard::new(&self.inner, ParkTarget::Awaiter { id: id.to_string() });
        tokio::select! {
            biased;
            delivered = deliver_rx => {
                // The deliverer removed the slot entry before sending.
                guard.disarm();
                delivered.map_err(|_| ScrapeError::ScrapeTimedOut { id: id.to_string() })
            }
            _ = sleep_until(deadline) => {
                guard.remove_now();
                Err(ScrapeError::ScrapeTimedOut { id: id.to_string() })
            }
        }
    }
}

/// Which parked entry a guard is responsible for.
enum ParkTarget {
    Producer { key: String, seq: u64 },
    Consumer { key: String, seq: u64 },
    Awaiter { id: String },
    Deliverer { id: String },
}

/// Removes a parked waiter's slot entry unless the handoff completed.
///
/// Covers both the explicit timeout arms and the implicit cancellation
/// path where the owning future is dropped mid-park.
struct ParkGuard {
    inner: Arc<Mutex<Inner>>,
    target: ParkTarget,
    armed: bool,
}

impl ParkGuard {
    fn new(inner: &Arc<Mutex<Inner>>, target: ParkTarget) -> Self {
        Self {
            inner: Arc::clone(inner),
            target,
            armed: true,
        }
    }

    /// The handoff completed; the entry is already gone.
    fn disarm(&mut self) {
        self.armed = false;
    }

    /// Remove the parked entry now; true if it was still present.
    fn remove_now(&mut self) -> bool {
        self.armed = false;
        let mut inner = self.inner.lock().expect("coordinator lock");
        match &self.target {
            ParkTarget::Producer { key, seq } => inner.waiting.remove_producer(key, *seq),
            ParkTarget::Consumer { key, seq } => inner.waiting.remove_consumer(key, *seq),
            ParkTarget::Awaiter { id } => inner.responses.remove_awaiter(id),
            ParkTarget::Deliverer { id } => inner.responses.remove_parked_response(id),
        }
    }
}

impl Drop for ParkGuard {
    fn drop(&mut self) {
        if self.armed {
            self.remove_now();
        }
    }
}

#[cfg(test)]
impl Coordinator {
    fn parked_producers(&self, key: &str) -> usize {
        self.lock().waiting.parked_producers(key)
    }

    fn parked_consumers(&self, key: &str) -> usize {
        self.lock().waiting.parked_consumers(key)
    }

    fn request_slot_count(&self) -> usize {
        self.lock().waiting.slot_count()
    }

    fn response_slot_count(&self) -> usize {
        self.lock().responses.slot_count()
    }

    fn known_count(&self) -> usize {
        self.lock().known.len()
    }
}
