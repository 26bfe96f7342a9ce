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

//! Receive-side thread manager for a network datapath.
//!
//! Decouples interrupt-context packet reception from higher-layer delivery:
//! an unthrottled producer enqueues packet batches per hardware receive
//! ring, and a small pool of dedicated worker threads, one per ring, drains
//! them to a stack-delivery collaborator in strict per-ring FIFO order.
//!
//! The pool supports a globally synchronized suspend/resume barrier for
//! power and mode transitions, per-thread CPU affinity, and per-ring
//! statistics. Packet contents are opaque; vdev/peer resolution and the
//! actual stack delivery are provided by the embedder through the
//! [`StackDelivery`] trait.
//!
//! [`StackDelivery`]: crate::rx::StackDelivery

pub mod config;
mod error;
pub mod rx;
#[cfg(any(test, feature = "testils"))]
pub mod testils;

pub use crate::config::{load_config, RxtmConfig};
pub use crate::error::{Result, RxtmError};
pub use crate::rx::{
    CpuMask, Resolve, RingId, RxThreadManager, RxThreadState, StackDelivery, StatsSnapshot,
    MAX_REO_RINGS, MAX_RX_THREADS,
};
