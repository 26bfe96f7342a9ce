/*
* Copyright 2019 Comcast Cable Communications Management, LLC
*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
* http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific language governing permissions and
* limitations under the License.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Data is available in the thread's queue.
pub(crate) const EVENT_RX_POST: usize = 1;
/// The thread should quiesce and acknowledge suspend.
pub(crate) const EVENT_SUSPEND: usize = 1 << 1;
/// A suspended thread should resume processing.
pub(crate) const EVENT_RESUME: usize = 1 << 2;
/// The thread should flush its queue and exit.
pub(crate) const EVENT_SHUTDOWN: usize = 1 << 3;

/// The event-flag word of an RX thread.
///
/// Mutated by the manager and the enqueue path, read and cleared by the
/// owning thread. The flag is only a wake reason; the authoritative wake
/// test is the per-thread re-check in the worker loop.
pub(crate) struct EventFlag(AtomicUsize);

impl EventFlag {
    pub(crate) fn new() -> Self {
        EventFlag(AtomicUsize::new(0))
    }

    #[inline]
    pub(crate) fn post(&self, bits: usize) {
        self.0.fetch_or(bits, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn clear(&self, bits: usize) {
        self.0.fetch_and(!bits, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn read(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A one-way completion an RX thread signals back to the manager.
///
/// Stands in for the start/suspend/resume/shutdown acknowledgments. A
/// successful wait consumes the completion so the same event can carry the
/// next suspend/resume cycle.
pub(crate) struct Event {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Event {
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Signals the completion, unblocking the waiter.
    pub(crate) fn complete(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cond.notify_all();
    }

    /// Waits for the completion with a bounded timeout. Returns `false` if
    /// the event was not signaled in time.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock().unwrap();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cond.wait_timeout(done, deadline - now).unwrap();
            done = guard;
        }
        *done = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn event_completes_before_wait() {
        let event = Event::new();
        event.complete();
        assert!(event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn event_times_out() {
        let event = Event::new();
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn event_resets_after_wait() {
        let event = Event::new();
        event.complete();
        assert!(event.wait_timeout(Duration::from_millis(10)));
        // consumed; a second wait must block again.
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn event_crosses_threads() {
        let event = Arc::new(Event::new());
        let signaler = event.clone();
        let handle = thread::spawn(move || signaler.complete());
        assert!(event.wait_timeout(Duration::from_secs(1)));
        handle.join().expect("panic!");
    }

    #[test]
    fn flag_post_and_clear() {
        let flag = EventFlag::new();
        flag.post(EVENT_RX_POST | EVENT_SUSPEND);
        assert_eq!(EVENT_RX_POST | EVENT_SUSPEND, flag.read());
        flag.clear(EVENT_RX_POST);
        assert_eq!(EVENT_SUSPEND, flag.read());
    }
}
