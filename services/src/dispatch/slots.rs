use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Caps how many deliveries run at once. Callers over the cap wait in FIFO order.
///
/// A caller whose `acquire` future is dropped while waiting leaves the queue; if
/// the slot had already been handed to it, the slot moves on to the next waiter.
pub struct DeliverySlots {
    queue: Mutex<SlotQueue>,
}

struct SlotQueue {
    max_concurrent: usize,
    running: usize,
    waiting: VecDeque<Arc<Notify>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub running: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
}

impl SlotQueue {
    fn try_acquire(&mut self) -> Option<Arc<Notify>> {
        if self.running < self.max_concurrent {
            self.running += 1;
            None
        } else {
            let notify = Arc::new(Notify::new());
            self.waiting.push_back(notify.clone());
            Some(notify)
        }
    }

    fn release(&mut self) {
        self.running = self.running.saturating_sub(1);

        // Hand the freed slot straight to the next waiter.
        if let Some(next) = self.waiting.pop_front() {
            self.running += 1;
            next.notify_one();
        }
    }

    /// Forget a waiter that stopped waiting. Returns `false` if it was already
    /// handed a slot.
    fn withdraw(&mut self, notify: &Arc<Notify>) -> bool {
        match self.waiting.iter().position(|w| Arc::ptr_eq(w, notify)) {
            Some(index) => {
                self.waiting.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Held while a caller waits for a slot.
struct PendingSlot<'a> {
    slots: &'a DeliverySlots,
    notify: Arc<Notify>,
    granted: bool,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        let mut queue = self.slots.lock();
        if !queue.withdraw(&self.notify) {
            queue.release();
        }
    }
}

impl DeliverySlots {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            queue: Mutex::new(SlotQueue {
                max_concurrent: max_concurrent.max(1),
                running: 0,
                waiting: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) {
        let Some(notify) = self.lock().try_acquire() else {
            return;
        };

        let mut pending = PendingSlot {
            slots: self,
            notify,
            granted: false,
        };
        // `release` already counted us as running once this resolves.
        pending.notify.clone().notified().await;
        pending.granted = true;
    }

    pub fn release(&self) {
        self.lock().release();
    }

    pub fn stats(&self) -> SlotStats {
        let queue = self.lock();
        SlotStats {
            running: queue.running,
            waiting: queue.waiting.len(),
            max_concurrent: queue.max_concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_max_concurrent() {
        let slots = Arc::new(DeliverySlots::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let slots = slots.clone();
            let running = running.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                slots.acquire().await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                slots.release();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        let stats = slots.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.max_concurrent, 2);
    }

    #[tokio::test]
    async fn waiter_is_counted() {
        let slots = Arc::new(DeliverySlots::new(1));
        slots.acquire().await;

        let waiter = {
            let slots = slots.clone();
            tokio::spawn(async move { slots.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(slots.stats().waiting, 1);

        slots.release();
        waiter.await.unwrap();
        let stats = slots.stats();
        assert_eq!(stats.running, 1);
        assert_eq!(stats.waiting, 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_gives_up_its_place() {
        let slots = DeliverySlots::new(1);
        slots.acquire().await;

        let waited = tokio::time::timeout(Duration::from_millis(20), slots.acquire()).await;
        assert!(waited.is_err());
        assert_eq!(slots.stats().waiting, 0);

        slots.release();
        let stats = slots.stats();
        assert_eq!(stats.running, 0);
        assert_eq!(stats.waiting, 0);

        // The slot is usable again.
        slots.acquire().await;
        assert_eq!(slots.stats().running, 1);
    }

    #[tokio::test]
    async fn slot_handed_to_a_dropped_waiter_moves_on() {
        let slots = DeliverySlots::new(1);
        slots.acquire().await;

        let first = slots.acquire();
        tokio::pin!(first);
        // Register the first waiter without completing it.
        assert!(futures_util::poll!(first.as_mut()).is_pending());

        let second = slots.acquire();
        tokio::pin!(second);
        assert!(futures_util::poll!(second.as_mut()).is_pending());
        assert_eq!(slots.stats().waiting, 2);

        // The slot goes to `first`, which is then dropped before it wakes.
        slots.release();
        drop(first);

        second.await;
        let stats = slots.stats();
        assert_eq!(stats.running, 1);
        assert_eq!(stats.waiting, 0);
    }
}
