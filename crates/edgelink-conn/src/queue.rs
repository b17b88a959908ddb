//! Bounded ring channels for frame and record dispatch.
//!
//! A ring channel never blocks the producer: pushing into a full queue
//! evicts the oldest element to admit the newest. Receiving blocks until
//! an element arrives or every sender is gone. This is the discipline
//! behind every delivery queue in this crate — a stalled peer costs the
//! oldest pending entries, never the socket loop.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    senders: usize,
    receiver_alive: bool,
    dropped: u64,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer half of a ring channel. Cloneable.
pub struct RingSender<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half of a ring channel. Single consumer.
pub struct RingReceiver<T> {
    shared: Arc<Shared<T>>,
}

/// Create a bounded ring channel with the given capacity.
///
/// Capacity must be nonzero.
pub fn ring<T>(capacity: usize) -> (RingSender<T>, RingReceiver<T>) {
    assert!(capacity > 0, "ring capacity must be nonzero");
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            items: VecDeque::with_capacity(capacity),
            capacity,
            senders: 1,
            receiver_alive: true,
            dropped: 0,
        }),
        available: Condvar::new(),
    });
    (
        RingSender {
            shared: Arc::clone(&shared),
        },
        RingReceiver { shared },
    )
}

impl<T> RingSender<T> {
    /// Push without blocking.
    ///
    /// When the queue is at capacity the oldest queued element is dropped
    /// to admit the newest; the evicted element is returned so the caller
    /// can observe the loss. Pushing after the receiver is gone discards
    /// the element and returns it.
    pub fn push(&self, item: T) -> Option<T> {
        let mut state = self.shared.lock();
        if !state.receiver_alive {
            return Some(item);
        }
        let evicted = if state.items.len() == state.capacity {
            state.dropped += 1;
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        drop(state);
        self.shared.available.notify_one();
        evicted
    }

    /// Total elements evicted by overflow so far.
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }

    /// True once the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        !self.shared.lock().receiver_alive
    }
}

impl<T> Clone for RingSender<T> {
    fn clone(&self) -> Self {
        self.shared.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for RingSender<T> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.senders -= 1;
        if state.senders == 0 {
            drop(state);
            // Wake the receiver so it can observe the closed channel.
            self.shared.available.notify_all();
        }
    }
}

impl<T> RingReceiver<T> {
    /// Block until an element is available.
    ///
    /// Returns `None` once every sender is gone and the queue is drained.
    pub fn recv(&self) -> Option<T> {
        let mut state = self.shared.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.senders == 0 {
                return None;
            }
            state = self
                .shared
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`recv`](Self::recv), giving up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.senders == 0 {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .shared
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Take an element if one is queued, without blocking.
    pub fn try_recv(&self) -> Option<T> {
        self.shared.lock().items.pop_front()
    }

    /// Number of elements currently queued.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for RingReceiver<T> {
    fn drop(&mut self) {
        self.shared.lock().receiver_alive = false;
    }
}
