/*
 * Created on Tue Aug 18 2020
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

//! # `MGET` queries
//! This module provides functions to work with `MGET` queries

use crate::dbnet::prelude::*;

action!(
    /// Run an `MGET` query, replying with an array of per-key `GET` results
    /// in argument order
    fn mget(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(act.len(), |len| len != 0, "MGET takes at least one key")?;
        let mut keys = Vec::with_capacity(act.len());
        while !act.is_empty() {
            keys.push(act.next_key()?);
        }
        let values = {
            let reader = handle.acquire_read();
            keys.iter()
                .map(|key| reader.get(key).cloned().unwrap_or(Value::Null))
                .collect()
        };
        con.write_response(&Value::List(values)).await?;
        Ok(())
    }
);
