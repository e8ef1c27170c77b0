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

//! # `MSET` queries
//! This module provides functions to work with `MSET` queries

use crate::dbnet::prelude::*;

action!(
    /// Run an `MSET` query, setting each key/value pair and replying with
    /// the number of pairs written. An odd argument count is a format error
    fn mset(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(
            act.len(),
            |len| len != 0 && len % 2 == 0,
            "MSET takes key/value pairs",
        )?;
        let mut pairs = Vec::with_capacity(act.len() / 2);
        while !act.is_empty() {
            let key = act.next_key()?;
            let value = act.next_value()?;
            pairs.push((key, value));
        }
        let howmany = pairs.len();
        {
            let mut writer = handle.acquire_write();
            for (key, value) in pairs {
                writer.set(key, value);
            }
        }
        con.write_response(&Value::Int(howmany as i64)).await?;
        Ok(())
    }
);
