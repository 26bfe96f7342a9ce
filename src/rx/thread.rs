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

use super::affinity::{self, CpuMask};
use super::delivery::{Resolve, StackDelivery};
use super::event::{Event, EventFlag, EVENT_RESUME, EVENT_RX_POST, EVENT_SHUTDOWN, EVENT_SUSPEND};
use super::queue::BatchQueue;
use super::stats::{RxThreadStats, StatsSnapshot};
use super::{PoolShared, RingId};
use crate::error::{Result, RxtmError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One RX thread, bound 1:1 to the ring whose id it carries.
///
/// The record is shared between the manager, the enqueue path and the
/// execution loop itself. The loop blocks on the pool-wide wait condition
/// and re-checks its own event flag and queue on every wake; correctness
/// relies on that re-check, not on wake specificity.
pub(crate) struct RxThread<D: StackDelivery> {
    id: RingId,
    event_flag: EventFlag,
    queue: BatchQueue<D::Packet>,
    start_event: Event,
    suspend_event: Event,
    resume_event: Event,
    shutdown_event: Event,
    aff_mask: AtomicU64,
    native_id: AtomicU64,
    stats: RxThreadStats,
    context: D::Context,
    pool: Arc<PoolShared>,
    delivery: Arc<D>,
}

impl<D: StackDelivery> RxThread<D> {
    pub(super) fn new(id: RingId, pool: Arc<PoolShared>, delivery: Arc<D>) -> Self {
        let context = delivery.context(id);
        RxThread {
            id,
            event_flag: EventFlag::new(),
            queue: BatchQueue::new(),
            start_event: Event::new(),
            suspend_event: Event::new(),
            resume_event: Event::new(),
            shutdown_event: Event::new(),
            aff_mask: AtomicU64::new(0),
            native_id: AtomicU64::new(0),
            stats: RxThreadStats::new(),
            context,
            pool,
            delivery,
        }
    }

    #[inline]
    pub(super) fn id(&self) -> RingId {
        self.id
    }

    #[inline]
    pub(super) fn context(&self) -> &D::Context {
        &self.context
    }

    /// Appends a batch to the thread's queue and wakes it. Never blocks
    /// beyond the queue append itself and never fails.
    pub(super) fn enqueue(&self, batch: Vec<D::Packet>, ring: RingId) {
        self.stats.inc_queued(ring.0 as usize, batch.len());
        let len = self.queue.push(batch);
        self.event_flag.post(EVENT_RX_POST);
        self.pool.notify_all();

        debug!(id = ?self.id, qlen = len, "batch queued.");
    }

    /// Posts lifecycle event bits and wakes the thread.
    pub(super) fn post(&self, bits: usize) {
        self.event_flag.post(bits);
        self.pool.notify_all();
    }

    pub(super) fn wait_start(&self, timeout: Duration) -> bool {
        self.start_event.wait_timeout(timeout)
    }

    pub(super) fn wait_suspended(&self, timeout: Duration) -> bool {
        self.suspend_event.wait_timeout(timeout)
    }

    pub(super) fn wait_resumed(&self, timeout: Duration) -> bool {
        self.resume_event.wait_timeout(timeout)
    }

    pub(super) fn wait_shutdown(&self, timeout: Duration) -> bool {
        self.shutdown_event.wait_timeout(timeout)
    }

    /// Terminates a thread whose loop died by panic: releases whatever is
    /// still queued, then completes the shutdown ack so lifecycle barriers
    /// do not wedge. Delivery runs outside the queue lock, so the queue
    /// cannot be poisoned here.
    pub(super) fn abort(&self) {
        self.flush_on_shutdown();
        self.shutdown_event.complete();
    }

    /// Stores the new mask and applies it to the live thread.
    pub(super) fn set_affinity(&self, mask: CpuMask) -> Result<()> {
        let native = self.native_id.load(Ordering::SeqCst) as libc::pthread_t;
        affinity::apply(native, mask).map_err(|source| RxtmError::Affinity {
            thread: self.id.0,
            source,
        })?;
        self.aff_mask.store(mask.0, Ordering::SeqCst);

        debug!(id = ?self.id, ?mask, "affinity applied.");
        Ok(())
    }

    #[inline]
    pub(super) fn affinity(&self) -> CpuMask {
        CpuMask(self.aff_mask.load(Ordering::SeqCst))
    }

    pub(super) fn snapshot(&self) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::default();
        self.stats.fill(&mut snapshot);
        snapshot.id = self.id.0;
        snapshot.nbufq_max_len = self.queue.high_water() as u64;
        snapshot.aff_mask = self.aff_mask.load(Ordering::SeqCst);
        snapshot
    }

    /// The execution loop. Runs on the thread's own execution handle until
    /// shutdown.
    pub(super) fn run(&self) {
        self.native_id
            .store(unsafe { libc::pthread_self() } as u64, Ordering::SeqCst);
        debug!(id = ?self.id, "rx thread up.");
        self.start_event.complete();

        loop {
            self.wait_for_event();

            let flags = self.event_flag.read();
            if flags & EVENT_SHUTDOWN != 0 {
                break;
            }
            if flags & EVENT_SUSPEND != 0 {
                if !self.quiesce() {
                    break;
                }
                continue;
            }

            // clear before draining; a post racing the drain re-arms the bit
            // and forces another pass.
            self.event_flag.clear(EVENT_RX_POST);
            self.process_queue();
        }

        self.flush_on_shutdown();
        debug!(id = ?self.id, "rx thread down.");
        self.shutdown_event.complete();
    }

    /// Blocks on the pool wait condition until this thread has something to
    /// react to.
    fn wait_for_event(&self) {
        let mut guard = self.pool.lock();
        loop {
            if self.event_flag.read() != 0 || !self.queue.is_empty() {
                return;
            }
            guard = self.pool.wait(guard);
        }
    }

    /// Acknowledges suspend and blocks until resume. Packets stay queued
    /// throughout. Returns `false` if shutdown arrived instead of resume.
    fn quiesce(&self) -> bool {
        debug!(id = ?self.id, qlen = self.queue.len(), "rx thread suspended.");
        self.suspend_event.complete();

        let flags = {
            let mut guard = self.pool.lock();
            loop {
                let flags = self.event_flag.read();
                if flags & (EVENT_RESUME | EVENT_SHUTDOWN) != 0 {
                    break flags;
                }
                guard = self.pool.wait(guard);
            }
        };

        if flags & EVENT_SHUTDOWN != 0 {
            return false;
        }

        self.event_flag.clear(EVENT_SUSPEND | EVENT_RESUME);
        self.resume_event.complete();
        debug!(id = ?self.id, "rx thread resumed.");
        true
    }

    /// Drains the queue in FIFO order, one batch at a time, re-checking the
    /// lifecycle bits between batches so suspend and shutdown are honored at
    /// a batch boundary.
    fn process_queue(&self) {
        while let Some(batch) = self.queue.pop() {
            self.stats.inc_dequeued(batch.len());
            for packet in batch {
                self.deliver_one(packet);
            }

            if self.event_flag.read() & (EVENT_SUSPEND | EVENT_SHUTDOWN) != 0 {
                return;
            }
        }
    }

    /// Resolves and forwards a single packet. Failures are counted, never
    /// propagated; one bad packet must not abort the rest of the batch.
    fn deliver_one(&self, packet: D::Packet) {
        match self.delivery.resolve(&packet) {
            Resolve::InvalidVdev => {
                self.delivery.release(packet);
                self.stats.inc_dropped_invalid_vdev();
            }
            Resolve::InvalidPeer => {
                self.delivery.release(packet);
                self.stats.inc_dropped_invalid_peer();
            }
            Resolve::Ok => match self.delivery.deliver(packet, &self.context) {
                Ok(()) => self.stats.inc_sent_to_stack(),
                Err(err) => {
                    debug!(id = ?self.id, %err, "stack delivery failed.");
                    self.stats.inc_dropped_others(1);
                }
            },
        }
    }

    /// Releases every batch still queued at shutdown back to the packet
    /// owner, accounted as `dropped_others`.
    fn flush_on_shutdown(&self) {
        let mut flushed = 0;
        while let Some(batch) = self.queue.pop() {
            self.stats.inc_dequeued(batch.len());
            flushed += batch.len();
            for packet in batch {
                self.delivery.release(packet);
            }
        }

        if flushed > 0 {
            self.stats.inc_dropped_others(flushed);
            debug!(id = ?self.id, flushed, "flushed undelivered packets on shutdown.");
        }
    }
}
