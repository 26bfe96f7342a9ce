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

use super::MAX_REO_RINGS;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-thread packet counters.
///
/// Incremented by the enqueue path and the owning thread, read by anyone
/// through `snapshot`. All counts are packets; the queue high-water mark
/// lives with the queue itself because it counts batches.
pub(crate) struct RxThreadStats {
    nbuf_queued: [AtomicU64; MAX_REO_RINGS],
    nbuf_dequeued: AtomicU64,
    nbuf_sent_to_stack: AtomicU64,
    dropped_invalid_vdev: AtomicU64,
    dropped_invalid_peer: AtomicU64,
    dropped_others: AtomicU64,
}

impl RxThreadStats {
    pub(crate) fn new() -> Self {
        RxThreadStats {
            nbuf_queued: Default::default(),
            nbuf_dequeued: AtomicU64::new(0),
            nbuf_sent_to_stack: AtomicU64::new(0),
            dropped_invalid_vdev: AtomicU64::new(0),
            dropped_invalid_peer: AtomicU64::new(0),
            dropped_others: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn inc_queued(&self, ring: usize, n: usize) {
        self.nbuf_queued[ring].fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_dequeued(&self, n: usize) {
        self.nbuf_dequeued.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_sent_to_stack(&self) {
        self.nbuf_sent_to_stack.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_dropped_invalid_vdev(&self) {
        self.dropped_invalid_vdev.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_dropped_invalid_peer(&self) {
        self.dropped_invalid_peer.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn inc_dropped_others(&self, n: usize) {
        self.dropped_others.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, snapshot: &mut StatsSnapshot) {
        for (slot, counter) in snapshot.nbuf_queued.iter_mut().zip(&self.nbuf_queued) {
            *slot = counter.load(Ordering::Relaxed);
        }
        snapshot.nbuf_dequeued = self.nbuf_dequeued.load(Ordering::Relaxed);
        snapshot.nbuf_sent_to_stack = self.nbuf_sent_to_stack.load(Ordering::Relaxed);
        snapshot.dropped_invalid_vdev = self.dropped_invalid_vdev.load(Ordering::Relaxed);
        snapshot.dropped_invalid_peer = self.dropped_invalid_peer.load(Ordering::Relaxed);
        snapshot.dropped_others = self.dropped_others.load(Ordering::Relaxed);
    }
}

/// Point-in-time copy of one thread's counters.
#[derive(Clone, Debug, Default)]
pub struct StatsSnapshot {
    /// Id of the thread the snapshot was taken from.
    pub id: u8,
    /// Packets queued into the thread, per REO ring.
    pub nbuf_queued: [u64; MAX_REO_RINGS],
    /// Packets dequeued from the thread's queue.
    pub nbuf_dequeued: u64,
    /// Packets forwarded to the stack. Some dequeued packets are dropped
    /// due to no peer or vdev, hence a separate counter.
    pub nbuf_sent_to_stack: u64,
    /// Maximum number of batches ever queued for the thread.
    pub nbufq_max_len: u64,
    /// Packets dropped due to no vdev.
    pub dropped_invalid_vdev: u64,
    /// Packets dropped due to no peer.
    pub dropped_invalid_peer: u64,
    /// Packets dropped for other reasons, including delivery failures and
    /// the shutdown flush.
    pub dropped_others: u64,
    /// Affinity mask currently applied to the thread.
    pub aff_mask: u64,
}

impl StatsSnapshot {
    /// Total packets ever queued into the thread.
    pub fn total_queued(&self) -> u64 {
        self.nbuf_queued.iter().sum()
    }

    /// Total packets accounted as sent or dropped.
    pub fn total_accounted(&self) -> u64 {
        self.nbuf_sent_to_stack
            + self.dropped_invalid_vdev
            + self.dropped_invalid_peer
            + self.dropped_others
    }
}
