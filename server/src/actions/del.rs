/*
 * Created on Mon Aug 17 2020
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

//! # `DELETE` queries
//! This module provides functions to work with `DELETE` queries

use crate::dbnet::prelude::*;

action!(
    /// Run a `DELETE` query
    ///
    /// Removes the key from the table and from the TTL table. Replies `1`
    /// if the key existed and `0` otherwise, so repeated deletes are
    /// harmless
    fn del(handle: &CoreDB, con: &mut Connection<Strm>, mut act: ActionIter) {
        ensure_length(act.len(), |len| len == 1, "DELETE takes one key")?;
        let key = act.next_key()?;
        let removed = { handle.acquire_write().del(&key) };
        con.write_response(&Value::Int(removed as i64)).await?;
        Ok(())
    }
);
