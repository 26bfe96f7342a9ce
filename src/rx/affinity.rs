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

use std::fmt;
use std::io;

/// A bitmask of CPUs an RX thread is permitted to run on.
///
/// Bit `n` set means CPU `n` is allowed. The mask source is external policy
/// (e.g. an IRQ balancer); only the mechanism of applying it lives here.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct CpuMask(pub u64);

impl CpuMask {
    /// A mask pinning the thread to a single CPU.
    pub fn single(cpu: usize) -> Self {
        CpuMask(1 << cpu)
    }

    /// Returns whether the mask allows `cpu`.
    #[inline]
    pub fn contains(&self, cpu: usize) -> bool {
        cpu < 64 && self.0 & (1 << cpu) != 0
    }

    /// Returns whether the mask allows no CPU at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpus{:#x}", self.0)
    }
}

/// Applies `mask` to a live thread identified by its pthread handle.
#[cfg(target_os = "linux")]
pub(crate) fn apply(native: libc::pthread_t, mask: CpuMask) -> io::Result<()> {
    if mask.is_empty() {
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }

    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in 0..64 {
            if mask.contains(cpu) {
                libc::CPU_SET(cpu, &mut set);
            }
        }

        let rc =
            libc::pthread_setaffinity_np(native, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }

    Ok(())
}

/// Affinity is advisory on platforms without `pthread_setaffinity_np`.
#[cfg(not(target_os = "linux"))]
pub(crate) fn apply(_native: libc::pthread_t, _mask: CpuMask) -> io::Result<()> {
    Ok(())
}
