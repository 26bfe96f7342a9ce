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

use std::collections::VecDeque;
use std::sync::Mutex;

/// FIFO of packet batches for one RX thread.
///
/// Multiple producers may append concurrently; only the owning thread
/// dequeues. Unbounded by design, bounded in practice by the producer rate.
/// The high-water mark counts batches, not packets, and never decreases.
pub(crate) struct BatchQueue<P> {
    inner: Mutex<Inner<P>>,
}

struct Inner<P> {
    batches: VecDeque<Vec<P>>,
    high_water: usize,
}

impl<P> BatchQueue<P> {
    pub(crate) fn new() -> Self {
        BatchQueue {
            inner: Mutex::new(Inner {
                batches: VecDeque::new(),
                high_water: 0,
            }),
        }
    }

    /// Appends a batch and returns the new queue length.
    pub(crate) fn push(&self, batch: Vec<P>) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.batches.push_back(batch);
        let len = inner.batches.len();
        if len > inner.high_water {
            inner.high_water = len;
        }
        len
    }

    /// Removes and returns the batch at the head of the queue.
    pub(crate) fn pop(&self) -> Option<Vec<P>> {
        self.inner.lock().unwrap().batches.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().batches.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().batches.len()
    }

    pub(crate) fn high_water(&self) -> usize {
        self.inner.lock().unwrap().high_water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let queue = BatchQueue::new();
        queue.push(vec![1]);
        queue.push(vec![2, 3]);
        queue.push(vec![4]);

        assert_eq!(Some(vec![1]), queue.pop());
        assert_eq!(Some(vec![2, 3]), queue.pop());
        assert_eq!(Some(vec![4]), queue.pop());
        assert_eq!(None, queue.pop());
    }

    #[test]
    fn high_water_is_monotone() {
        let queue = BatchQueue::new();
        queue.push(vec![1]);
        queue.push(vec![2]);
        queue.push(vec![3]);
        assert_eq!(3, queue.high_water());

        queue.pop();
        queue.pop();
        queue.pop();
        assert!(queue.is_empty());
        assert_eq!(3, queue.high_water());

        queue.push(vec![4]);
        assert_eq!(3, queue.high_water());
    }

    #[test]
    fn len_tracks_batches() {
        let queue = BatchQueue::new();
        assert_eq!(0, queue.len());
        queue.push(vec![1, 2, 3]);
        assert_eq!(1, queue.len());
        queue.pop();
        assert_eq!(0, queue.len());
    }
}
