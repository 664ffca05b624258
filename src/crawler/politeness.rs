//! Politeness controls for a crawl run
//!
//! Two limits apply to every content fetch:
//! - A semaphore bounding in-flight fetches across the whole run
//! - A per-domain clock spacing request starts by a random delay

use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Per-run politeness controller
#[derive(Debug)]
pub struct Politeness {
    /// Bounds in-flight fetches; a permit is held for fetch plus processing
    fetch_slots: Arc<Semaphore>,

    /// Upper bound (exclusive) of the random gap between requests to one domain
    max_delay: Duration,

    /// Earliest start time handed out next, per domain
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl Politeness {
    /// Creates a controller for one run
    ///
    /// # Arguments
    ///
    /// * `max_in_flight` - Maximum simultaneous fetches (at least one is always allowed)
    /// * `max_delay` - Exclusive upper bound of the random gap between requests to one domain
    pub fn new(max_in_flight: usize, max_delay: Duration) -> Self {
        Self {
            fetch_slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            max_delay,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for a fetch slot
    ///
    /// Returns `None` only if the semaphore was closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.fetch_slots.clone().acquire_owned().await.ok()
    }

    /// Number of fetch slots currently free
    pub fn available_slots(&self) -> usize {
        self.fetch_slots.available_permits()
    }

    /// Reserves the next request start for `domain` and returns how long to wait for it
    ///
    /// Each call pushes the domain's clock forward by a fresh random gap, so
    /// concurrent callers for one domain get increasing start times.
    pub fn reserve(&self, domain: &str) -> Duration {
        let now = Instant::now();
        let gap = self.random_gap();

        let mut slots = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(domain.to_string()).or_insert(now);
        let start = (*slot).max(now);
        *slot = start + gap;

        start - now
    }

    /// Sleeps until this request's turn for `domain`
    pub async fn wait_turn(&self, domain: &str) {
        let wait = self.reserve(domain);
        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} before next request to {}", wait, domain);
            tokio::time::sleep(wait).await;
        }
    }

    fn random_gap(&self) -> Duration {
        let max_ms = self.max_delay.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}
