/*
 * Created on Thu Sep 10 2020
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

//! # `INFO` queries

use crate::dbnet::prelude::*;

action!(
    /// Run an `INFO` query, replying with the textual `key, type, size`
    /// summary of the table
    fn info(handle: &CoreDB, con: &mut Connection<Strm>, act: ActionIter) {
        ensure_length(act.len(), |len| len == 0, "INFO takes no arguments")?;
        let summary = { handle.acquire_read().info_summary() };
        con.write_response(&Value::Str(summary)).await?;
        Ok(())
    }
);
