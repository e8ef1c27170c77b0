/*
 * Created on Thu Mar 18 2021
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

//! Serialization of [`Value`]s into wire frames
//!
//! The encoder is the inverse of the parser: it writes exactly one frame
//! per value. Integers and floats use their shortest decimal textual form,
//! so every value the encoder produces parses back to an equal value
//! (floats up to the usual textual round-trip guarantees).

use super::{
    Value, TSYMBOL_ARRAY, TSYMBOL_BYTES, TSYMBOL_ERROR, TSYMBOL_FLOAT, TSYMBOL_INT, TSYMBOL_MAP,
    TSYMBOL_STRING,
};

const TERMINATOR: &[u8] = b"\r\n";

/// Encode one value into a fresh buffer
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    write_value(&mut buf, value);
    buf
}

/// Write one frame for `value` into the provided buffer. Null encodes as
/// `$-1\r\n`; compound values recurse into their elements
pub fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Str(string) => {
            buf.push(TSYMBOL_STRING);
            write_sizeline(buf, string.len());
            buf.extend_from_slice(string.as_bytes());
            buf.extend_from_slice(TERMINATOR);
        }
        Value::Bytes(blob) => {
            buf.push(TSYMBOL_BYTES);
            write_sizeline(buf, blob.len());
            buf.extend_from_slice(blob);
            buf.extend_from_slice(TERMINATOR);
        }
        Value::Int(int) => {
            buf.push(TSYMBOL_INT);
            buf.extend_from_slice(int.to_string().as_bytes());
            buf.extend_from_slice(TERMINATOR);
        }
        Value::Float(float) => {
            buf.push(TSYMBOL_FLOAT);
            buf.extend_from_slice(float.to_string().as_bytes());
            buf.extend_from_slice(TERMINATOR);
        }
        Value::List(elements) => {
            buf.push(TSYMBOL_ARRAY);
            write_sizeline(buf, elements.len());
            for element in elements {
                write_value(buf, element);
            }
        }
        Value::Map(pairs) => {
            buf.push(TSYMBOL_MAP);
            write_sizeline(buf, pairs.len());
            for (key, value) in pairs {
                write_value(buf, key);
                write_value(buf, value);
            }
        }
        Value::Null => {
            buf.extend_from_slice(b"$-1\r\n");
        }
        Value::ErrorMsg(message) => {
            buf.push(TSYMBOL_ERROR);
            buf.extend_from_slice(message.as_bytes());
            buf.extend_from_slice(TERMINATOR);
        }
    }
}

fn write_sizeline(buf: &mut Vec<u8>, size: usize) {
    buf.extend_from_slice(size.to_string().as_bytes());
    buf.extend_from_slice(TERMINATOR);
}
