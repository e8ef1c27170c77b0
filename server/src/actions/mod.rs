/*
 * Created on Wed Aug 19 2020
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

//! # Actions
//!
//! Actions are like shell commands, you provide arguments -- they return
//! output. This module contains a collection of the actions supported by
//! Kestrel
//!

pub mod del;
pub mod expire;
pub mod flush;
pub mod get;
pub mod info;
pub mod lists;
pub mod mget;
pub mod mset;
pub mod set;

use std::io::Error as IoError;

/// A generic result for actions
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors that can occur while running actions
#[derive(Debug)]
pub enum ActionError {
    /// A command-level failure, reported to the client as an error reply;
    /// the connection carries on
    ActionError(String),
    /// An I/O failure; the connection is torn down
    IoError(IoError),
}

impl PartialEq for ActionError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ActionError(a1), Self::ActionError(a2)) => a1 == a2,
            (Self::IoError(ioe1), Self::IoError(ioe2)) => ioe1.to_string() == ioe2.to_string(),
            _ => false,
        }
    }
}

impl From<IoError> for ActionError {
    fn from(e: IoError) -> Self {
        Self::IoError(e)
    }
}

/// Fail with a `Wrong format` reply unless the argument count satisfies the
/// provided predicate
pub fn ensure_length(len: usize, is_valid: fn(usize) -> bool, expect: &str) -> ActionResult<()> {
    if is_valid(len) {
        Ok(())
    } else {
        Err(ActionError::ActionError(format!("Wrong format: {}", expect)))
    }
}
