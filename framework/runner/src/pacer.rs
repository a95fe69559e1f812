use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Spaces request dispatches evenly so the whole pool stays under a requests-per-second ceiling.
///
/// Each caller reserves the next free slot and sleeps until it. Slots are never handed out in the
/// past, so an idle period does not build up a burst allowance.
#[derive(Debug)]
pub struct DispatchPacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl DispatchPacer {
    pub fn per_second(max_requests_per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / max_requests_per_second.max(1),
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn wait(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock();
            let now = Instant::now();
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
