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

use crate::rx::RxThreadState;
use std::io;
use thiserror::Error;

/// An error generated by the RX thread manager.
///
/// Lifecycle failures are always surfaced to the caller. Per-packet delivery
/// failures are not errors; they are absorbed by the worker loop and show up
/// in the drop counters instead.
#[derive(Debug, Error)]
pub enum RxtmError {
    /// Thread or queue allocation failed during pool init. The init call is
    /// fully rolled back before this is returned.
    #[error("rx thread pool allocation failed")]
    ResourceExhausted(#[source] io::Error),

    /// A ring or context id outside `0..num_rx_threads`, or an out-of-range
    /// config value. Rejected with no side effect.
    #[error("ring/context id {0} out of range")]
    InvalidArgument(u8),

    /// A lifecycle barrier was not acknowledged within the bounded wait.
    /// Denotes a stuck worker; the pool is left in an indeterminate state
    /// and is not retried automatically.
    #[error("timed out waiting for {op} ack from rx thread {thread}")]
    Timeout { op: &'static str, thread: u8 },

    /// A lifecycle call was made from a pool state that does not permit it.
    #[error("operation not permitted in pool state {0:?}")]
    InvalidState(RxThreadState),

    /// The affinity mask could not be applied to the worker's thread.
    #[error("failed to apply affinity mask to rx thread {thread}")]
    Affinity {
        thread: u8,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RxtmError>;
