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

use rxtm::testils::{eventually, StubDelivery, TestPacket};
use rxtm::{CpuMask, Resolve, RingId, RxThreadManager, RxtmConfig, RxtmError};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn pool_of(n: usize) -> (RxThreadManager<StubDelivery>, Arc<StubDelivery>) {
    let delivery = Arc::new(StubDelivery::new());
    let config = RxtmConfig {
        num_rx_threads: n,
        ..Default::default()
    };
    let pool = RxThreadManager::init(&config, delivery.clone()).expect("init");
    (pool, delivery)
}

#[test]
fn delivers_in_fifo_order_per_ring() {
    let (pool, delivery) = pool_of(1);

    for seq in 0..100 {
        pool.enqueue(vec![TestPacket::ok(seq)], RingId(0)).unwrap();
    }

    assert!(eventually(|| delivery.delivered_count() == 100));
    let seqs = delivery
        .delivered()
        .iter()
        .map(|&(_, seq)| seq)
        .collect::<Vec<_>>();
    assert_eq!((0..100).collect::<Vec<_>>(), seqs);

    pool.deinit().expect("deinit");
}

#[test]
fn suspend_preserves_queued_batches_in_order() {
    let (pool, delivery) = pool_of(1);

    pool.suspend().expect("suspend");
    for seq in 0..5 {
        pool.enqueue(vec![TestPacket::ok(seq)], RingId(0)).unwrap();
    }

    // frozen: queued but not processed.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(0, delivery.delivered_count());
    let snapshots = pool.dump_stats();
    let s = &snapshots[0];
    assert_eq!(5, s.nbufq_max_len);
    assert_eq!(0, s.nbuf_dequeued);

    pool.resume().expect("resume");
    assert!(eventually(|| delivery.delivered_count() == 5));
    let seqs = delivery
        .delivered()
        .iter()
        .map(|&(_, seq)| seq)
        .collect::<Vec<_>>();
    assert_eq!(vec![0, 1, 2, 3, 4], seqs);

    // the high-water mark does not decay after the drain.
    assert_eq!(5, pool.dump_stats()[0].nbufq_max_len);

    pool.deinit().expect("deinit");
}

#[test]
fn concurrent_producers_lose_nothing() {
    let (pool, delivery) = pool_of(2);
    let pool = Arc::new(pool);

    let mut producers = vec![];
    for p in 0..4u64 {
        let pool = pool.clone();
        producers.push(thread::spawn(move || {
            for i in 0..50 {
                let seq = p * 1000 + i;
                pool.enqueue(vec![TestPacket::ok(seq)], RingId(0)).unwrap();
            }
        }));
    }
    for i in 0..30 {
        pool.enqueue(vec![TestPacket::ok(9000 + i)], RingId(1))
            .unwrap();
    }
    for producer in producers {
        producer.join().expect("panic!");
    }

    assert!(eventually(|| delivery.delivered_count() == 230));

    // nothing lost, nothing duplicated.
    let unique = delivery
        .delivered()
        .iter()
        .map(|&(_, seq)| seq)
        .collect::<HashSet<_>>();
    assert_eq!(230, unique.len());

    // per-ring totals went where they were enqueued.
    let ring0 = delivery
        .delivered()
        .iter()
        .filter(|&&(ctx, _)| ctx == 0)
        .count();
    assert_eq!(200, ring0);

    Arc::try_unwrap(pool)
        .ok()
        .expect("pool still shared")
        .deinit()
        .expect("deinit");
}

#[test]
fn invalid_packets_are_dropped_and_counted() {
    let (pool, delivery) = pool_of(1);

    let batch = (0..5).map(TestPacket::invalid_peer).collect::<Vec<_>>();
    pool.enqueue(batch, RingId(0)).unwrap();
    pool.enqueue(vec![TestPacket::invalid_vdev(5)], RingId(0))
        .unwrap();

    assert!(eventually(|| delivery.released_count() == 6));

    let snapshots = pool.dump_stats();
    let s = &snapshots[0];
    assert_eq!(5, s.dropped_invalid_peer);
    assert_eq!(1, s.dropped_invalid_vdev);
    assert_eq!(0, s.nbuf_sent_to_stack);
    assert_eq!(6, s.nbuf_dequeued);

    pool.deinit().expect("deinit");
}

#[test]
fn delivery_failures_count_as_dropped_others() {
    let (pool, delivery) = pool_of(1);
    delivery.fail_deliveries();

    pool.enqueue(
        vec![TestPacket::ok(0), TestPacket::ok(1), TestPacket::ok(2)],
        RingId(0),
    )
    .unwrap();

    assert!(eventually(|| pool.dump_stats()[0].dropped_others == 3));
    assert_eq!(0, delivery.delivered_count());

    pool.deinit().expect("deinit");
}

#[test]
fn deinit_flushes_queued_packets_back_to_owner() {
    let (pool, delivery) = pool_of(1);

    pool.suspend().expect("suspend");
    for seq in 0..4 {
        pool.enqueue(
            vec![TestPacket::ok(seq * 2), TestPacket::ok(seq * 2 + 1)],
            RingId(0),
        )
        .unwrap();
    }

    pool.deinit().expect("deinit");

    // every undelivered packet was handed back, none delivered.
    assert_eq!(8, delivery.released_count());
    assert_eq!(0, delivery.delivered_count());
}

#[test]
fn worker_panic_does_not_leak_queued_packets() {
    let (pool, delivery) = pool_of(1);
    delivery.panic_deliveries();

    // freeze the thread so all four batches are queued before it dies on
    // the first delivery.
    pool.suspend().expect("suspend");
    for seq in 0..4 {
        pool.enqueue(vec![TestPacket::ok(seq)], RingId(0)).unwrap();
    }
    pool.resume().expect("resume");

    // the three batches behind the panicking one are released and counted,
    // not silently lost.
    assert!(eventually(|| delivery.released_count() == 3));
    assert!(eventually(|| pool.dump_stats()[0].dropped_others == 3));
    assert_eq!(0, delivery.delivered_count());

    pool.deinit().expect("deinit");
}

#[test]
fn stuck_worker_surfaces_suspend_timeout() {
    let delivery = Arc::new(StubDelivery::new());
    delivery.delay_deliveries(Duration::from_millis(500));
    let config = RxtmConfig {
        num_rx_threads: 1,
        ack_timeout_ms: 50,
        ..Default::default()
    };
    let pool = RxThreadManager::init(&config, delivery.clone()).expect("init");

    pool.enqueue(vec![TestPacket::ok(0)], RingId(0)).unwrap();

    // wait until the thread has dequeued the batch; it is then committed
    // to the stalled delivery and cannot ack until it finishes.
    assert!(eventually(|| pool.dump_stats()[0].nbuf_dequeued == 1));
    match pool.suspend() {
        Err(RxtmError::Timeout {
            op: "suspend",
            thread: 0,
        }) => {}
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }

    // the pool is indeterminate; dropping it detaches the stuck thread.
    drop(pool);
}

#[test]
fn every_packet_is_accounted_after_a_full_run() {
    let (pool, delivery) = pool_of(2);

    let mut total = 0u64;
    for seq in 0..20 {
        let verdict = match seq % 4 {
            0 => Resolve::Ok,
            1 => Resolve::InvalidVdev,
            2 => Resolve::InvalidPeer,
            _ => Resolve::Ok,
        };
        let ring = RingId((seq % 2) as u8);
        pool.enqueue(vec![TestPacket { seq, verdict }], ring).unwrap();
        total += 1;
    }

    assert!(eventually(|| {
        pool.dump_stats()
            .iter()
            .map(|s| s.total_accounted())
            .sum::<u64>()
            == total
    }));

    let snapshots = pool.dump_stats();
    let queued = snapshots.iter().map(|s| s.total_queued()).sum::<u64>();
    let accounted = snapshots.iter().map(|s| s.total_accounted()).sum::<u64>();
    assert_eq!(total, queued);
    assert_eq!(queued, accounted);

    pool.deinit().expect("deinit");
    assert_eq!(
        total as usize,
        delivery.delivered_count() + delivery.released_count()
    );
}

#[test]
fn enqueue_rejects_unknown_ring() {
    let (pool, _delivery) = pool_of(1);

    match pool.enqueue(vec![TestPacket::ok(0)], RingId(1)) {
        Err(RxtmError::InvalidArgument(1)) => {}
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }

    pool.deinit().expect("deinit");
}

#[cfg(target_os = "linux")]
#[test]
fn affinity_applies_to_a_live_thread() {
    let (pool, _delivery) = pool_of(1);

    pool.set_affinity(RingId(0), CpuMask::single(0))
        .expect("set_affinity");
    assert_eq!(Some(CpuMask::single(0)), pool.get_affinity(RingId(0)));

    match pool.set_affinity(RingId(1), CpuMask::single(0)) {
        Err(RxtmError::InvalidArgument(1)) => {}
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }

    pool.deinit().expect("deinit");
}
