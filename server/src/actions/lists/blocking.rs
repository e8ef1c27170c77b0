/*
 * Created on Sat Sep 18 2021
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

//! # Blocking list queries
//!
//! `BLPOP` and `BRPOP` follow one sequence: take the write lock, try a
//! non-blocking pop, register a waiter if there was nothing to take, and
//! release the lock **before** suspending on the waiter handle. The wait
//! itself never holds the table lock, so pushers and other clients keep
//! running while a popper sleeps.
//!
//! On a wake-up the pop is retried under a fresh lock. A timeout races its
//! abandon transition against a concurrent pusher's signal; losing that race
//! means the handoff already happened, so the popper retries instead of
//! dropping the element on the floor.

use crate::dbnet::prelude::*;
use tokio::time::{self, Duration};

/// How long a `BLPOP` waits when no timeout is given
const DEFAULT_BLPOP_TIMEOUT: f64 = 60.0;
/// How long a `BRPOP` waits when no timeout is given
const DEFAULT_BRPOP_TIMEOUT: f64 = 30.0;
/// The ceiling on client-supplied timeouts
const MAX_TIMEOUT: f64 = 31_536_000.0; // one year

action!(
    /// Run a `BLPOP` query
    fn blpop(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(
            act.len(),
            |len| len == 1 || len == 2,
            "BLPOP takes a key and an optional timeout",
        )?;
        let key = act.next_key()?;
        let timeout = match act.next() {
            Some(value) => seconds(value)?,
            None => DEFAULT_BLPOP_TIMEOUT,
        };
        blocking_pop(handle, con, key, End::Head, timeout).await
    }

    /// Run a `BRPOP` query
    fn brpop(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(
            act.len(),
            |len| len == 1 || len == 2,
            "BRPOP takes a key and an optional timeout",
        )?;
        let key = act.next_key()?;
        let timeout = match act.next() {
            Some(value) => seconds(value)?,
            None => DEFAULT_BRPOP_TIMEOUT,
        };
        blocking_pop(handle, con, key, End::Tail, timeout).await
    }
);

/// Parse a client-supplied timeout into seconds
fn seconds(value: Value) -> ActionResult<f64> {
    let wrongfmt = || {
        ActionError::ActionError(
            "Wrong format: the timeout must be a non-negative number of seconds".to_owned(),
        )
    };
    let secs = match value {
        Value::Int(int) if int >= 0 => int as f64,
        Value::Float(float) if float.is_finite() && float >= 0.0 => float,
        Value::Str(ref text) => match text.parse::<f64>() {
            Ok(float) if float.is_finite() && float >= 0.0 => float,
            _ => return Err(wrongfmt()),
        },
        _ => return Err(wrongfmt()),
    };
    Ok(secs.min(MAX_TIMEOUT))
}

async fn blocking_pop<Strm>(
    handle: &CoreDB,
    con: &mut Connection<Strm>,
    key: String,
    end: End,
    timeout: f64,
) -> ActionResult<()>
where
    Strm: BufferedSocketStream,
{
    // Try the non-blocking pop and, failing that, register a waiter, all
    // under one lock acquisition. The lock is released before the wait below
    let fast_path = {
        let mut writer = handle.acquire_write();
        // make sure pushes against this key are well-typed even if the key
        // didn't exist yet
        writer.ensure_list(&key);
        match writer.pop(&key, end) {
            Some(value) => Ok(value),
            None => Err(writer.register_waiter(&key)),
        }
    };
    let waiter = match fast_path {
        Ok(value) => {
            con.write_response(&value).await?;
            return Ok(());
        }
        Err(waiter) => waiter,
    };
    let handed_off = match time::timeout(Duration::from_secs_f64(timeout), waiter.notified()).await
    {
        Ok(()) => true,
        // the timeout fired; if the abandon transition fails, a pusher
        // signalled us concurrently and the handoff is ours after all
        Err(_) => !waiter.abandon(),
    };
    if handed_off {
        let popped = { handle.acquire_write().pop(&key, end) };
        match popped {
            Some(value) => con.write_response(&value).await?,
            None => {
                log::error!(
                    "blocking pop on '{}' was signalled, but the retry found nothing",
                    key
                );
                con.write_response(&Value::Null).await?;
            }
        }
    } else {
        con.write_response(&Value::Null).await?;
    }
    Ok(())
}
