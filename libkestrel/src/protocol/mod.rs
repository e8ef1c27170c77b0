/*
 * Created on Wed Mar 17 2021
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

//! # The Kestrel wire protocol
//!
//! The Kestrel protocol frames typed values on a reliable byte stream. Every
//! frame begins with a one-byte type symbol (the _tsymbol_), followed by a
//! type-specific body; headers and scalar bodies are terminated by `\r\n`.
//! Compound frames (arrays and maps) encode their elements recursively with
//! their own tsymbols, so arbitrarily nested structures and opaque binary
//! blobs can share one stream. A client request is always an outermost array
//! of frames.
//!
//! The grammar, with all numeric headers in decimal ASCII:
//!
//! ```text
//! +<len>\r\n<len octets>\r\n       binary blob
//! -<text>\r\n                      error
//! :<decimal>\r\n                   integer
//! ?<decimal>\r\n                   float
//! $<len>\r\n<len bytes>\r\n        UTF-8 string ($-1\r\n is the null frame)
//! *<n>\r\n<n frames>               array
//! %<n>\r\n<2n frames>              map (k, v, k, v, ...)
//! ```
//!
//! This module contains the [`Value`] type that frames deserialize into, the
//! [`Parser`] that reads one frame off a buffer and the [`encoder`] that
//! writes one frame into a buffer. Both halves are plain byte-slice
//! transformations so that the asynchronous server and the synchronous
//! client can share them.

pub mod encoder;
pub mod parser;

pub use parser::{ParseError, ParseResult, Parser};

use bytes::Bytes;

/// The tsymbol for binary blobs
pub const TSYMBOL_BYTES: u8 = b'+';
/// The tsymbol for error replies
pub const TSYMBOL_ERROR: u8 = b'-';
/// The tsymbol for integers
pub const TSYMBOL_INT: u8 = b':';
/// The tsymbol for floats
pub const TSYMBOL_FLOAT: u8 = b'?';
/// The tsymbol for UTF-8 strings (and the null frame)
pub const TSYMBOL_STRING: u8 = b'$';
/// The tsymbol for arrays
pub const TSYMBOL_ARRAY: u8 = b'*';
/// The tsymbol for maps
pub const TSYMBOL_MAP: u8 = b'%';

/// The maximum depth to which compound frames may nest. Anything deeper is
/// rejected as a bad packet to cap stack use on malicious input
pub const MAX_NESTING_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
/// A typed value, as carried by one frame on the wire and as stored by the
/// server's in-memory table
pub enum Value {
    /// UTF-8 text (`$`)
    Str(String),
    /// An opaque binary payload (`+`)
    Bytes(Bytes),
    /// A 64-bit signed integer (`:`)
    Int(i64),
    /// A 64-bit float (`?`)
    Float(f64),
    /// An ordered sequence of values (`*`)
    List(Vec<Value>),
    /// An insertion-ordered mapping of values to values (`%`)
    Map(Vec<(Value, Value)>),
    /// The null frame (`$-1`)
    Null,
    /// An error message; carried in replies only (`-`)
    ErrorMsg(String),
}

impl Value {
    /// The name of this value's variant, as shown by `INFO`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Null => "null",
            Value::ErrorMsg(_) => "error",
        }
    }
    /// A coarse measure of the value's size: the byte length for strings and
    /// blobs, the element count for containers and the machine width for
    /// numbers
    pub fn size(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Int(_) | Value::Float(_) => 8,
            Value::List(l) => l.len(),
            Value::Map(m) => m.len(),
            Value::Null => 0,
            Value::ErrorMsg(e) => e.len(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(int: i64) -> Self {
        Value::Int(int)
    }
}

impl From<f64> for Value {
    fn from(float: f64) -> Self {
        Value::Float(float)
    }
}

impl From<Bytes> for Value {
    fn from(blob: Bytes) -> Self {
        Value::Bytes(blob)
    }
}

impl From<Vec<Value>> for Value {
    fn from(list: Vec<Value>) -> Self {
        Value::List(list)
    }
}
