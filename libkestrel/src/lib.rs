/*
 * Created on Tue Mar 16 2021
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

//! The core library for Kestrel
//!
//! This contains the wire protocol codec and the modules which are shared
//! by both the `kestrel-client` and the `server` crates

pub mod protocol;
pub mod util;

use std::error::Error;

/// A generic result
pub type TResult<T> = Result<T, Box<dyn Error>>;

/// The version of this build
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// The project homepage
pub const URL: &str = "https://github.com/kestrel-kv/kestrel";
/// The size of the read buffer in bytes
pub const BUF_CAP: usize = 8 * 1024; // 8 KB per-connection
