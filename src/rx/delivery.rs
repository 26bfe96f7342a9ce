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

use super::RingId;
use anyhow::Result;

/// Per-packet verdict from the vdev/peer lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolve {
    /// The vdev and peer are valid; the packet can go up the stack.
    Ok,
    /// No vdev is associated with the packet.
    InvalidVdev,
    /// The vdev exists but the peer is unknown.
    InvalidPeer,
}

/// The stack-delivery collaborator.
///
/// The RX threads never inspect packet contents; everything they need from
/// the datapath above them goes through this trait. One implementation is
/// shared by all threads, while each thread owns one `Context` created for
/// its ring at pool init.
pub trait StackDelivery: Send + Sync + 'static {
    /// The reference-counted packet unit moved through the queues. Opaque
    /// to the RX threads.
    type Packet: Send + 'static;

    /// Per-thread delivery context, e.g. a NAPI instance. The RX threads
    /// hold it and pass it back on every `deliver` call but never read it.
    type Context: Send + Sync + 'static;

    /// Creates the delivery context for the thread servicing `id`.
    fn context(&self, id: RingId) -> Self::Context;

    /// Resolves the vdev/peer for a packet.
    fn resolve(&self, packet: &Self::Packet) -> Resolve;

    /// Forwards a resolved packet to the stack. A failure is counted as
    /// `dropped_others` and processing of the rest of the batch continues.
    fn deliver(&self, packet: Self::Packet, context: &Self::Context) -> Result<()>;

    /// Returns an undeliverable packet to its owner. Called for packets
    /// flushed from the queues on shutdown.
    fn release(&self, packet: Self::Packet) {
        drop(packet);
    }
}
