/*
 * Created on Wed Sep 15 2021
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

//! # List queries
//!
//! The `LPUSH`/`RPUSH`/`LPOP`/`RPOP`/`LLEN` actions. Pushes create the list
//! on demand and hand off to at most one blocked popper per push call; the
//! blocking pop variants live in [`blocking`]

pub mod blocking;

use crate::dbnet::prelude::*;

action!(
    /// Run an `LPUSH` query. Values are inserted at the head one at a time
    /// in argument order, so the last argument ends up at the head
    fn lpush(handle: &CoreDB, con: &mut Connection<Strm>, act: ActionIter) {
        ensure_length(
            act.len(),
            |len| len >= 2,
            "LPUSH takes a key and at least one value",
        )?;
        push_terminal(handle, con, act, End::Head).await
    }

    /// Run an `RPUSH` query, appending each value at the tail
    fn rpush(handle: &CoreDB, con: &mut Connection<Strm>, act: ActionIter) {
        ensure_length(
            act.len(),
            |len| len >= 2,
            "RPUSH takes a key and at least one value",
        )?;
        push_terminal(handle, con, act, End::Tail).await
    }

    /// Run an `LPOP` query
    fn lpop(handle: &CoreDB, con: &mut Connection<Strm>, act: ActionIter) {
        ensure_length(act.len(), |len| len == 1, "LPOP takes one key")?;
        pop_terminal(handle, con, act, End::Head).await
    }

    /// Run an `RPOP` query
    fn rpop(handle: &CoreDB, con: &mut Connection<Strm>, act: ActionIter) {
        ensure_length(act.len(), |len| len == 1, "RPOP takes one key")?;
        pop_terminal(handle, con, act, End::Tail).await
    }
);

action!(
    /// Run an `LLEN` query. Replies null for absent keys and for keys that
    /// hold something other than a list
    fn llen(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(act.len(), |len| len == 1, "LLEN takes one key")?;
        let key = act.next_key()?;
        let res = { handle.acquire_read().list_len(&key) };
        match res {
            Some(len) => con.write_response(&Value::Int(len as i64)).await?,
            None => con.write_response(&Value::Null).await?,
        }
        Ok(())
    }
);

/// Push the remaining arguments onto the list at the key named by the first
/// argument, then wake one waiter. Exactly one waiter is woken per push
/// call, not per pushed value
async fn push_terminal<Strm>(
    handle: &CoreDB,
    con: &mut Connection<Strm>,
    mut act: ActionIter,
    end: End,
) -> ActionResult<()>
where
    Strm: BufferedSocketStream,
{
    let key = act.next_key()?;
    let values: Vec<Value> = act.collect();
    let pushed = {
        let mut writer = handle.acquire_write();
        let pushed = writer.push(&key, end, values);
        if pushed.is_some() {
            writer.wake_one(&key);
        }
        pushed
    };
    match pushed {
        Some(len) => {
            con.write_response(&Value::Int(len as i64)).await?;
            Ok(())
        }
        None => Err(ActionError::ActionError(format!(
            "Wrong type: '{}' is not a list",
            key
        ))),
    }
}

/// Pop one element from the given end of the list at the key named by the
/// only argument. Absent keys, empty lists and non-list values all reply
/// null; callers cannot tell these apart
async fn pop_terminal<Strm>(
    handle: &CoreDB,
    con: &mut Connection<Strm>,
    mut act: ActionIter,
    end: End,
) -> ActionResult<()>
where
    Strm: BufferedSocketStream,
{
    let key = act.next_key()?;
    let popped = { handle.acquire_write().pop(&key, end) };
    match popped {
        Some(value) => con.write_response(&value).await?,
        None => con.write_response(&Value::Null).await?,
    }
    Ok(())
}
