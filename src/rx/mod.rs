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

//! Receive-side thread pool: per-ring worker threads, queue admission, and
//! the pool-wide suspend/resume/shutdown barriers.

mod affinity;
mod delivery;
mod event;
mod queue;
mod stats;
mod thread;

pub use self::affinity::CpuMask;
pub use self::delivery::{Resolve, StackDelivery};
pub use self::stats::StatsSnapshot;

use self::event::{EVENT_RESUME, EVENT_SHUTDOWN, EVENT_SUSPEND};
use self::thread::RxThread;
use crate::config::RxtmConfig;
use crate::error::{Result, RxtmError};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self as os_thread, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Maximum number of REO rings supported (for stats tracking).
pub const MAX_REO_RINGS: usize = 4;

/// Number of RX threads supported, one per REO ring.
pub const MAX_RX_THREADS: usize = MAX_REO_RINGS;

/// An identifier for a hardware receive ring and the RX thread bound to it.
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RingId(pub u8);

impl fmt::Debug for RingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring{}", self.0)
    }
}

/// The pool-wide lifecycle state. All threads agree with it at any stable
/// point; only the manager writes it, under the barrier protocols.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RxThreadState {
    /// Initial state, and the state after deinit.
    Invalid,
    /// Threads spawned, waiting for all start acks.
    Init,
    /// Threads are processing packets or waiting for them.
    Running,
    /// Threads are quiesced; enqueued packets stay queued until resume.
    Suspended,
}

/// The one wait condition every RX thread blocks on.
///
/// Wakes are broadcast; each thread filters by re-checking its own event
/// flag and queue. The thundering herd is acceptable at this thread count.
pub(crate) struct PoolShared {
    lock: Mutex<()>,
    cond: Condvar,
}

impl PoolShared {
    fn new() -> Self {
        PoolShared {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap()
    }

    pub(crate) fn wait<'a>(&self, guard: MutexGuard<'a, ()>) -> MutexGuard<'a, ()> {
        self.cond.wait(guard).unwrap()
    }

    /// Wakes every waiter. Takes the lock so a flag posted just before a
    /// thread commits to sleeping cannot lose its wakeup.
    pub(crate) fn notify_all(&self) {
        let _guard = self.lock.lock().unwrap();
        self.cond.notify_all();
    }
}

/// The RX thread pool manager.
///
/// Owns the worker threads for their whole lifetime. `init` returns a
/// running pool or nothing; `deinit` consumes the manager and blocks until
/// every thread has exited, so a thread never outlives the pool.
pub struct RxThreadManager<D: StackDelivery> {
    threads: Vec<Arc<RxThread<D>>>,
    handles: Vec<JoinHandle<()>>,
    delivery: Arc<D>,
    state: Mutex<RxThreadState>,
    ack_timeout: Duration,
}

impl<D: StackDelivery> RxThreadManager<D> {
    /// Initializes the pool: spawns one thread per configured ring and
    /// blocks until every thread has signaled readiness.
    ///
    /// On any partial failure the already-spawned threads are torn down
    /// before the error is returned; no partial pool is left running.
    pub fn init(config: &RxtmConfig, delivery: Arc<D>) -> Result<Self> {
        config.validate()?;
        let ack_timeout = config.ack_timeout();

        info!(
            num_rx_threads = config.num_rx_threads,
            "initializing rx thread pool..."
        );

        let shared = Arc::new(PoolShared::new());
        let mut threads = Vec::with_capacity(config.num_rx_threads);
        let mut handles = Vec::with_capacity(config.num_rx_threads);

        for id in 0..config.num_rx_threads {
            let thread = Arc::new(RxThread::new(
                RingId(id as u8),
                shared.clone(),
                delivery.clone(),
            ));
            let runner = Arc::clone(&thread);
            let spawned = os_thread::Builder::new()
                .name(format!("dp_rx_thread_{}", id))
                .spawn(move || {
                    // a collaborator panic must not wedge the barriers.
                    if panic::catch_unwind(AssertUnwindSafe(|| runner.run())).is_err() {
                        warn!(id = ?runner.id(), "rx thread panicked.");
                        runner.abort();
                    }
                });

            match spawned {
                Ok(handle) => {
                    threads.push(thread);
                    handles.push(handle);
                }
                Err(err) => {
                    Self::teardown(&threads, &mut handles, ack_timeout);
                    return Err(RxtmError::ResourceExhausted(err));
                }
            }
        }

        for thread in &threads {
            if !thread.wait_start(ack_timeout) {
                let id = thread.id().0;
                Self::teardown(&threads, &mut handles, ack_timeout);
                return Err(RxtmError::Timeout {
                    op: "start",
                    thread: id,
                });
            }
        }

        for (thread, mask) in threads.iter().zip(&config.affinity) {
            if let Err(err) = thread.set_affinity(CpuMask(*mask)) {
                Self::teardown(&threads, &mut handles, ack_timeout);
                return Err(err);
            }
        }

        info!("rx thread pool running.");

        Ok(RxThreadManager {
            threads,
            handles,
            delivery,
            state: Mutex::new(RxThreadState::Running),
            ack_timeout,
        })
    }

    /// Returns the current pool state.
    pub fn state(&self) -> RxThreadState {
        *self.state.lock().unwrap()
    }

    /// Returns the number of RX threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Returns the shared delivery collaborator.
    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    /// Hands a packet batch to the thread owning `ring`.
    ///
    /// Never blocks and never fails for a valid ring id. Safe to call
    /// concurrently, including for the same ring. While the pool is
    /// suspended the batch is queued and deferred until resume; enqueue
    /// never drops for state reasons alone.
    pub fn enqueue(&self, batch: Vec<D::Packet>, ring: RingId) -> Result<()> {
        let thread = self
            .threads
            .get(ring.0 as usize)
            .ok_or(RxtmError::InvalidArgument(ring.0))?;
        thread.enqueue(batch, ring);
        Ok(())
    }

    /// Suspends every RX thread.
    ///
    /// A barrier: returns only once every thread has acknowledged, so no
    /// thread is mid-delivery when the caller proceeds. Queued packets are
    /// frozen in place until `resume`. A thread that fails to acknowledge
    /// within the bounded wait is surfaced as `Timeout` and the pool is
    /// left for the caller to recover.
    pub fn suspend(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if *state != RxThreadState::Running {
            return Err(RxtmError::InvalidState(*state));
        }

        for thread in &self.threads {
            thread.post(EVENT_SUSPEND);
        }
        for thread in &self.threads {
            if !thread.wait_suspended(self.ack_timeout) {
                return Err(RxtmError::Timeout {
                    op: "suspend",
                    thread: thread.id().0,
                });
            }
        }

        *state = RxThreadState::Suspended;
        info!("rx thread pool suspended.");
        Ok(())
    }

    /// Resumes every RX thread. The symmetric barrier to `suspend`.
    pub fn resume(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if *state != RxThreadState::Suspended {
            return Err(RxtmError::InvalidState(*state));
        }

        for thread in &self.threads {
            thread.post(EVENT_RESUME);
        }
        for thread in &self.threads {
            if !thread.wait_resumed(self.ack_timeout) {
                return Err(RxtmError::Timeout {
                    op: "resume",
                    thread: thread.id().0,
                });
            }
        }

        *state = RxThreadState::Running;
        info!("rx thread pool resumed.");
        Ok(())
    }

    /// Shuts the pool down and waits for every thread to exit.
    ///
    /// Packets still queued are released back to the collaborator and
    /// counted as `dropped_others`. Consuming the manager makes a second
    /// deinit a compile error rather than a runtime one.
    pub fn deinit(mut self) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            match *state {
                RxThreadState::Running | RxThreadState::Suspended => {}
                s => return Err(RxtmError::InvalidState(s)),
            }
        }

        info!("shutting down rx thread pool...");

        for thread in &self.threads {
            thread.post(EVENT_SHUTDOWN);
        }
        for thread in &self.threads {
            if !thread.wait_shutdown(self.ack_timeout) {
                return Err(RxtmError::Timeout {
                    op: "shutdown",
                    thread: thread.id().0,
                });
            }
        }

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("rx thread panicked.");
            }
        }
        self.threads.clear();
        *self.state.lock().unwrap() = RxThreadState::Invalid;

        info!("rx thread pool shutdown.");
        Ok(())
    }

    /// Dumps each thread's counters and returns the snapshots.
    ///
    /// Read-only; no effect on pool state.
    pub fn dump_stats(&self) -> Vec<StatsSnapshot> {
        self.threads
            .iter()
            .map(|thread| {
                let s = thread.snapshot();
                info!(
                    id = s.id,
                    queued = s.total_queued(),
                    dequeued = s.nbuf_dequeued,
                    sent_to_stack = s.nbuf_sent_to_stack,
                    max_qlen = s.nbufq_max_len,
                    dropped_invalid_vdev = s.dropped_invalid_vdev,
                    dropped_invalid_peer = s.dropped_invalid_peer,
                    dropped_others = s.dropped_others,
                    aff_mask = s.aff_mask,
                    "rx thread stats."
                );
                s
            })
            .collect()
    }

    /// Returns the delivery context owned by the thread servicing `ctx_id`,
    /// or `None` if the id is out of range. Callable from any thread in any
    /// pool state.
    pub fn get_delivery_context(&self, ctx_id: RingId) -> Option<&D::Context> {
        self.threads
            .get(ctx_id.0 as usize)
            .map(|thread| thread.context())
    }

    /// Applies an affinity mask to the thread servicing `ctx_id`.
    pub fn set_affinity(&self, ctx_id: RingId, mask: CpuMask) -> Result<()> {
        let thread = self
            .threads
            .get(ctx_id.0 as usize)
            .ok_or(RxtmError::InvalidArgument(ctx_id.0))?;
        thread.set_affinity(mask)
    }

    /// Returns the affinity mask currently applied to a thread.
    pub fn get_affinity(&self, ctx_id: RingId) -> Option<CpuMask> {
        self.threads
            .get(ctx_id.0 as usize)
            .map(|thread| thread.affinity())
    }

    /// Best-effort shutdown used by init rollback and the drop guard. A
    /// thread that does not ack in time is detached, not joined.
    fn teardown(
        threads: &[Arc<RxThread<D>>],
        handles: &mut Vec<JoinHandle<()>>,
        ack_timeout: Duration,
    ) {
        for thread in threads {
            thread.post(EVENT_SHUTDOWN);
        }

        let mut stuck = false;
        for thread in threads {
            if !thread.wait_shutdown(ack_timeout) {
                warn!(id = ?thread.id(), "rx thread failed to exit; detaching.");
                stuck = true;
            }
        }

        if stuck {
            handles.clear();
            return;
        }
        for handle in handles.drain(..) {
            if handle.join().is_err() {
                warn!("rx thread panicked.");
            }
        }
    }
}

impl<D: StackDelivery> Drop for RxThreadManager<D> {
    fn drop(&mut self) {
        // the normal path is deinit, which leaves nothing to do here. this
        // covers a manager dropped early so threads do not outlive it.
        if self.handles.is_empty() {
            return;
        }
        warn!("rx thread pool dropped without deinit; shutting down.");
        let threads = std::mem::take(&mut self.threads);
        Self::teardown(&threads, &mut self.handles, self.ack_timeout);
    }
}

impl<D: StackDelivery> fmt::Debug for RxThreadManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxThreadManager")
            .field("num_threads", &self.threads.len())
            .field("state", &self.state())
            .finish()
    }
}
