/*
 * Created on Thu Jul 01 2021
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2021, The Kestrel developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The blocking-pop coordinator
//!
//! `BLPOP`/`BRPOP` operations that find nothing to pop register a [`Waiter`]
//! in the per-key FIFO held here and then suspend on it, outside the table
//! lock. List pushes hand off to at most one waiter per push call.
//!
//! A waiter is a single-shot signal with three states:
//!
//! ```text
//!         (register)
//!         ──────────► Pending
//!                      │  │
//!          (pushed by  │  │ (timeout)
//!            pusher)   ▼  ▼
//!                   Signalled  Abandoned
//! ```
//!
//! Both transitions out of `Pending` are terminal and race against each
//! other through compare-and-swap, so exactly one side owns the outcome: a
//! pusher that loses the race to a timeout skips the waiter and wakes the
//! next one, and a popper whose timeout loses the race to a pusher retries
//! its pop. The underlying [`Notify`] stores a permit when `notify_one` runs
//! before the waiter awaits, so a wake-up issued early is not lost.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

const PENDING: u8 = 0;
const SIGNALLED: u8 = 1;
const ABANDONED: u8 = 2;

/// A single-shot handle shared by one suspended popper and (at most) one
/// pusher
#[derive(Debug)]
pub struct Waiter {
    state: AtomicU8,
    notify: Notify,
}

impl Waiter {
    fn new() -> Self {
        Waiter {
            state: AtomicU8::new(PENDING),
            notify: Notify::new(),
        }
    }
    /// Transition `Pending -> Signalled` and wake the popper. Returns false
    /// if the waiter had already reached a terminal state
    pub fn signal(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, SIGNALLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.notify.notify_one();
        }
        won
    }
    /// Transition `Pending -> Abandoned`. Returns false if a pusher
    /// signalled first, in which case the handoff belongs to the popper
    /// after all
    pub fn abandon(&self) -> bool {
        self.state
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
    /// Suspend until this waiter is signalled
    pub async fn notified(&self) {
        self.notify.notified().await
    }
    #[cfg(test)]
    fn is_abandoned(&self) -> bool {
        self.state.load(Ordering::Acquire) == ABANDONED
    }
}

/// The mapping from key to the FIFO of waiters blocked on it. Mutated only
/// under the table lock
#[derive(Debug, Default)]
pub struct WaitMap {
    queues: HashMap<String, VecDeque<Arc<Waiter>>>,
}

impl WaitMap {
    /// Append a fresh waiter to the tail of the FIFO for `key`
    pub fn register(&mut self, key: &str) -> Arc<Waiter> {
        let waiter = Arc::new(Waiter::new());
        self.queues
            .entry(key.to_owned())
            .or_insert_with(VecDeque::new)
            .push_back(waiter.clone());
        waiter
    }
    /// Pop waiters from the front of the FIFO for `key` until one accepts
    /// the signal; abandoned waiters are discarded along the way. At most
    /// one waiter is woken per call
    pub fn wake_one(&mut self, key: &str) {
        if let Some(queue) = self.queues.get_mut(key) {
            while let Some(waiter) = queue.pop_front() {
                if waiter.signal() {
                    break;
                }
            }
            if queue.is_empty() {
                self.queues.remove(key);
            }
        }
    }
    #[cfg(test)]
    fn queued(&self, key: &str) -> usize {
        self.queues.get(key).map(VecDeque::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{self, Duration};

    #[test]
    fn test_terminal_transitions_are_single_shot() {
        let waiter = Waiter::new();
        assert!(waiter.signal());
        assert!(!waiter.signal());
        assert!(!waiter.abandon());
        let waiter = Waiter::new();
        assert!(waiter.abandon());
        assert!(!waiter.signal());
        assert!(waiter.is_abandoned());
    }

    #[test]
    fn test_wake_one_is_fifo_and_skips_abandoned() {
        let mut map = WaitMap::default();
        let first = map.register("k");
        let second = map.register("k");
        let third = map.register("k");
        assert_eq!(map.queued("k"), 3);
        // the first waiter timed out before any push came in
        assert!(first.abandon());
        map.wake_one("k");
        // the push skipped the abandoned waiter and served the next in line
        assert!(!second.signal(), "second should already be signalled");
        assert!(!third.is_abandoned());
        assert_eq!(map.queued("k"), 1);
        map.wake_one("k");
        assert!(!third.signal(), "third should already be signalled");
        assert_eq!(map.queued("k"), 0);
    }

    #[test]
    fn test_wake_one_on_an_idle_key_does_nothing() {
        let mut map = WaitMap::default();
        map.wake_one("nobody-home");
        assert_eq!(map.queued("nobody-home"), 0);
    }

    #[tokio::test]
    async fn test_signal_before_wait_is_not_lost() {
        let waiter = Arc::new(Waiter::new());
        assert!(waiter.signal());
        // the permit stored by the early notify completes this immediately
        time::timeout(Duration::from_secs(1), waiter.notified())
            .await
            .expect("the early signal was lost");
    }

    #[tokio::test]
    async fn test_signal_wakes_a_suspended_waiter() {
        let mut map = WaitMap::default();
        let waiter = map.register("k");
        let popper = {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.notified().await })
        };
        map.wake_one("k");
        time::timeout(Duration::from_secs(1), popper)
            .await
            .expect("the waiter was never woken")
            .unwrap();
    }
}
