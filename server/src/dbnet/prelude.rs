/*
 * Created on Sat Jul 03 2021
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

//! A 'prelude' for actions
//!
//! This module is hollow itself, it only re-exports from the store, the
//! connection machinery and the protocol

pub use crate::actions::{ensure_length, ActionError, ActionResult};
pub use crate::coredb::{CoreDB, End};
pub use crate::dbnet::connection::Connection;
pub use crate::dbnet::BufferedSocketStream;
pub use crate::queryengine::ActionIter;
pub use libkestrel::protocol::Value;
