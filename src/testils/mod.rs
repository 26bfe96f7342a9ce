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

//! Utilities for unit and integration tests.

use crate::rx::{Resolve, RingId, StackDelivery};
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A fake packet: a sequence number plus the verdict the stub resolver
/// returns for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestPacket {
    pub seq: u64,
    pub verdict: Resolve,
}

impl TestPacket {
    pub fn ok(seq: u64) -> Self {
        TestPacket {
            seq,
            verdict: Resolve::Ok,
        }
    }

    pub fn invalid_vdev(seq: u64) -> Self {
        TestPacket {
            seq,
            verdict: Resolve::InvalidVdev,
        }
    }

    pub fn invalid_peer(seq: u64) -> Self {
        TestPacket {
            seq,
            verdict: Resolve::InvalidPeer,
        }
    }
}

/// A recording stack-delivery collaborator.
///
/// Resolution follows the verdict baked into each packet. Delivered and
/// released sequence numbers are recorded for assertions. Delivery can be
/// forced to fail, to panic, or to stall, exercising the `dropped_others`
/// path, the panic containment, and the barrier timeouts respectively.
#[derive(Default)]
pub struct StubDelivery {
    delivered: Mutex<Vec<(u8, u64)>>,
    released: Mutex<Vec<u64>>,
    fail_delivery: AtomicBool,
    panic_delivery: AtomicBool,
    delivery_delay: Mutex<Option<Duration>>,
}

impl StubDelivery {
    pub fn new() -> Self {
        StubDelivery::default()
    }

    /// Makes every subsequent `deliver` call fail.
    pub fn fail_deliveries(&self) {
        self.fail_delivery.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent `deliver` call panic.
    pub fn panic_deliveries(&self) {
        self.panic_delivery.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent `deliver` call sleep for `delay` first.
    pub fn delay_deliveries(&self, delay: Duration) {
        *self.delivery_delay.lock().unwrap() = Some(delay);
    }

    /// Sequence numbers delivered so far, with the context id each came
    /// through, in delivery order.
    pub fn delivered(&self) -> Vec<(u8, u64)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    /// Sequence numbers released back without delivery.
    pub fn released(&self) -> Vec<u64> {
        self.released.lock().unwrap().clone()
    }

    pub fn released_count(&self) -> usize {
        self.released.lock().unwrap().len()
    }
}

impl StackDelivery for StubDelivery {
    type Packet = TestPacket;
    type Context = RingId;

    fn context(&self, id: RingId) -> RingId {
        id
    }

    fn resolve(&self, packet: &TestPacket) -> Resolve {
        packet.verdict
    }

    fn deliver(&self, packet: TestPacket, context: &RingId) -> Result<()> {
        if self.panic_delivery.load(Ordering::SeqCst) {
            panic!("stub delivery panic");
        }
        if self.fail_delivery.load(Ordering::SeqCst) {
            bail!("stub delivery failure");
        }
        let delay = *self.delivery_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.delivered.lock().unwrap().push((context.0, packet.seq));
        Ok(())
    }

    fn release(&self, packet: TestPacket) {
        self.released.lock().unwrap().push(packet.seq);
    }
}

/// Polls `predicate` until it holds or five seconds pass.
pub fn eventually<F: Fn() -> bool>(predicate: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    predicate()
}
