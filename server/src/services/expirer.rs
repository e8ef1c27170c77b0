/*
 * Created on Sun May 16 2021
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2021, The Kestrel developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The TTL expirer
//!
//! The expirer is deliberately coarse: it wakes up once per sweep interval,
//! takes every TTL entry down by one and evicts the entries that fell below
//! zero, together with their keys. A key given `EXPIRE k t` therefore lives
//! for at least `t` seconds and may survive for up to roughly two extra
//! sweep intervals in the worst case.

use crate::coredb::CoreDB;
use crate::dbnet::Terminator;
use tokio::time::{self, Duration};

/// Seconds between two sweeps of the TTL table
const TTL_SWEEP_EVERY: u64 = 60;

/// The ttl_service periodically sweeps the TTL table in `CoreDB`
///
/// The service terminates when the termination signal is received
pub async fn ttl_service(handle: CoreDB, mut terminator: Terminator) {
    let duration = Duration::from_secs(TTL_SWEEP_EVERY);
    loop {
        tokio::select! {
            // Sleep until `duration` from the current time instant
            _ = time::sleep_until(time::Instant::now() + duration) => {
                let evicted = { handle.acquire_write().sweep_expired() };
                if evicted > 0 {
                    log::debug!("TTL sweep evicted {} key(s)", evicted);
                }
            }
            // Otherwise wait for a notification
            _ = terminator.receive_signal() => {
                // we got a notification to quit; so break out
                break;
            }
        }
    }
    log::info!("TTL service has exited");
}
