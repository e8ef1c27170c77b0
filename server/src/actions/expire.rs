/*
 * Created on Wed Sep 09 2020
 *
 * This file is a part of Kestrel
 * Kestrel is a free and open-source in-memory key/value database that aims
 * to provide a simple, predictable data server for many concurrent clients
 * over plain TCP.
 *
 * Copyright (c) 2020, The Kestrel developers
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

//! # Key expiry queries
//! This module provides the `EXPIRE`, `TTL` and `PERSIST` actions. The
//! semantics are approximate, at-least-t-seconds: the background sweep runs
//! on a coarse interval, so a key may outlive its TTL by up to two sweep
//! periods

use crate::dbnet::prelude::*;

action!(
    /// Run an `EXPIRE` query. The TTL is set regardless of any prior TTL
    /// state and the given number of seconds is echoed back
    fn expire(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(
            act.len(),
            |len| len == 2,
            "EXPIRE takes a key and a number of seconds",
        )?;
        let key = act.next_key()?;
        let seconds = act.next_seconds()?;
        {
            handle.acquire_write().expire(&key, seconds);
        }
        con.write_response(&Value::Int(seconds)).await?;
        Ok(())
    }

    /// Run a `TTL` query, replying with the remaining seconds or -1 if the
    /// key carries no TTL
    fn ttl(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(act.len(), |len| len == 1, "TTL takes one key")?;
        let key = act.next_key()?;
        let seconds = { handle.acquire_read().ttl_of(&key) };
        con.write_response(&Value::Int(seconds)).await?;
        Ok(())
    }

    /// Run a `PERSIST` query, dropping any TTL on the key
    fn persist(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(act.len(), |len| len == 1, "PERSIST takes one key")?;
        let key = act.next_key()?;
        {
            handle.acquire_write().persist(&key);
        }
        con.write_response(&Value::Null).await?;
        Ok(())
    }
);
