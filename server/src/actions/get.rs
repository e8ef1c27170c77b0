/*
 * Created on Fri Aug 14 2020
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

//! # `GET` queries
//! This module provides functions to work with `GET` queries

use crate::dbnet::prelude::*;

action!(
    /// Run a `GET` query
    fn get(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(act.len(), |len| len == 1, "GET takes one key")?;
        let key = act.next_key()?;
        let res = { handle.acquire_read().get(&key).cloned() };
        match res {
            // Good, we got the value, write it off to the stream
            Some(value) => con.write_response(&value).await?,
            // Ah, couldn't find that key
            None => con.write_response(&Value::Null).await?,
        }
        Ok(())
    }
);
