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

//! Toml-based configuration for the RX thread pool.
//!
//! # Example
//!
//! ```
//! num_rx_threads = 2
//! ack_timeout_ms = 200
//! affinity = [0x1, 0x2]
//! ```

use crate::error::{Result, RxtmError};
use crate::rx::MAX_RX_THREADS;
use anyhow::Result as Fallible;
use clap::{clap_app, crate_version};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::time::Duration;

/// RX thread pool configuration settings.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RxtmConfig {
    /// Number of RX threads to run, one per hardware receive ring. Must be
    /// between 1 and the ring count of the hosting system. Defaults to `4`.
    #[serde(default = "default_num_rx_threads")]
    pub num_rx_threads: usize,

    /// Bounded wait, in milliseconds, for each thread to acknowledge a
    /// start/suspend/resume/shutdown barrier. A thread missing the deadline
    /// is reported as stuck. Defaults to `200`.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Initial per-thread CPU affinity masks, indexed by thread id. May
    /// name fewer entries than threads; the rest inherit the scheduler
    /// default. Defaults to empty.
    #[serde(default)]
    pub affinity: Vec<u64>,
}

fn default_num_rx_threads() -> usize {
    MAX_RX_THREADS
}

fn default_ack_timeout_ms() -> u64 {
    200
}

impl RxtmConfig {
    pub(crate) fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_rx_threads == 0 || self.num_rx_threads > MAX_RX_THREADS {
            return Err(RxtmError::InvalidArgument(self.num_rx_threads as u8));
        }
        if self.affinity.len() > self.num_rx_threads {
            return Err(RxtmError::InvalidArgument(self.affinity.len() as u8));
        }
        Ok(())
    }
}

impl Default for RxtmConfig {
    fn default() -> Self {
        RxtmConfig {
            num_rx_threads: default_num_rx_threads(),
            ack_timeout_ms: default_ack_timeout_ms(),
            affinity: vec![],
        }
    }
}

impl fmt::Debug for RxtmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxtmConfig")
            .field("num_rx_threads", &self.num_rx_threads)
            .field("ack_timeout_ms", &self.ack_timeout_ms)
            .field("affinity", &self.affinity)
            .finish()
    }
}

/// Loads the pool config from a TOML file.
///
/// # Example
///
/// ```
/// home$ ./myapp -f config.toml
/// ```
pub fn load_config() -> Fallible<RxtmConfig> {
    let matches = clap_app!(rxtm =>
        (version: crate_version!())
        (@arg file: -f --file +required +takes_value "configuration file")
    )
    .get_matches();

    let path = matches.value_of("file").unwrap();
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|err| err.into())
}
