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

//! This module provides deserialization primitives for protocol frames
//!
//! The [`Parser`] is incremental: it is handed whatever bytes the connection
//! has buffered so far and either produces one complete frame along with the
//! number of bytes it consumed, or reports [`ParseError::NotEnough`] so that
//! the caller can read more data and retry. Nothing is consumed from the
//! caller's buffer until a frame parses in full.

use super::{
    Value, MAX_NESTING_DEPTH, TSYMBOL_ARRAY, TSYMBOL_BYTES, TSYMBOL_ERROR, TSYMBOL_FLOAT,
    TSYMBOL_INT, TSYMBOL_MAP, TSYMBOL_STRING,
};
use bytes::Bytes;
use core::str;

#[derive(Debug, PartialEq)]
/// # Parser errors
///
/// Several errors can arise during parsing and this enum accounts for them
pub enum ParseError {
    /// The buffer contains no data at all
    ///
    /// The caller uses this to distinguish an idle connection from a
    /// partially received frame
    Empty,
    /// The frame is incomplete; more data needs to be read
    NotEnough,
    /// The frame begins with a tsymbol the server doesn't know, or a
    /// terminator is missing where one was expected
    UnexpectedByte,
    /// The frame is structurally invalid: a negative length, or nesting
    /// beyond [`MAX_NESTING_DEPTH`]
    BadPacket,
    /// A header or scalar body failed to parse into its target type
    DatatypeParseFailure,
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty buffer"),
            ParseError::NotEnough => write!(f, "incomplete frame"),
            ParseError::UnexpectedByte => write!(f, "unexpected byte"),
            ParseError::BadPacket => write!(f, "bad packet"),
            ParseError::DatatypeParseFailure => write!(f, "datatype parse failure"),
        }
    }
}

/// A generic result to indicate parsing errors through the [`ParseError`] enum
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug)]
/// # The frame parser
///
/// The parser reads exactly one frame off the provided buffer. On success it
/// returns the decoded [`Value`] and the number of bytes consumed; the caller
/// is responsible for advancing its buffer by that amount. Bytes past the
/// first complete frame are left untouched.
pub struct Parser<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser instance, bound to the lifetime of the source buffer
    pub const fn new(buffer: &'a [u8]) -> Self {
        Parser { buffer, cursor: 0 }
    }

    /// Try to parse one frame out of the buffer
    pub fn parse(mut self) -> ParseResult<(Value, usize)> {
        if self.buffer.is_empty() {
            return Err(ParseError::Empty);
        }
        let value = self.parse_next_element(0)?;
        Ok((value, self.cursor))
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Read one byte, moving the cursor past it
    fn next_byte(&mut self) -> ParseResult<u8> {
        if self.remaining() == 0 {
            Err(ParseError::NotEnough)
        } else {
            let byte = self.buffer[self.cursor];
            self.cursor += 1;
            Ok(byte)
        }
    }

    /// Read `len` bytes, moving the cursor past them
    fn read_until(&mut self, len: usize) -> ParseResult<&'a [u8]> {
        if self.remaining() < len {
            Err(ParseError::NotEnough)
        } else {
            let chunk = &self.buffer[self.cursor..self.cursor + len];
            self.cursor += len;
            Ok(chunk)
        }
    }

    /// Read a line, i.e everything up to (and excluding) the next `\r\n`.
    /// The cursor is left just past the terminator
    fn read_line(&mut self) -> ParseResult<&'a [u8]> {
        let start = self.cursor;
        let mut pos = start;
        while pos + 1 < self.buffer.len() {
            if self.buffer[pos] == b'\r' && self.buffer[pos + 1] == b'\n' {
                self.cursor = pos + 2;
                return Ok(&self.buffer[start..pos]);
            }
            pos += 1;
        }
        Err(ParseError::NotEnough)
    }

    /// Assert that the cursor sits on a `\r\n` terminator and step past it
    fn expect_terminator(&mut self) -> ParseResult<()> {
        let chunk = self.read_until(2)?;
        if chunk == b"\r\n" {
            Ok(())
        } else {
            Err(ParseError::UnexpectedByte)
        }
    }

    /// Parse a stream of bytes into a [`usize`]
    fn parse_into_usize(bytes: &[u8]) -> ParseResult<usize> {
        if bytes.is_empty() {
            return Err(ParseError::NotEnough);
        }
        let mut item_usize = 0usize;
        for dig in bytes {
            if !dig.is_ascii_digit() {
                // dig has to be an ASCII digit
                return Err(ParseError::DatatypeParseFailure);
            }
            // 48 is the ASCII code for 0, and 57 is the ascii code for 9
            let curdig = usize::from(dig - 48);
            // The usize can overflow; check that case
            let product = match item_usize.checked_mul(10) {
                Some(not_overflowed) => not_overflowed,
                None => return Err(ParseError::DatatypeParseFailure),
            };
            let sum = match product.checked_add(curdig) {
                Some(not_overflowed) => not_overflowed,
                None => return Err(ParseError::DatatypeParseFailure),
            };
            item_usize = sum;
        }
        Ok(item_usize)
    }

    /// Parse a stream of bytes into an [`i64`], accepting a leading minus sign
    fn parse_into_i64(bytes: &[u8]) -> ParseResult<i64> {
        str::from_utf8(bytes)
            .ok()
            .and_then(|string| string.parse::<i64>().ok())
            .ok_or(ParseError::DatatypeParseFailure)
    }

    /// Parse a stream of bytes into an [`f64`], accepting any form the
    /// language's float parser accepts
    fn parse_into_f64(bytes: &[u8]) -> ParseResult<f64> {
        str::from_utf8(bytes)
            .ok()
            .and_then(|string| string.parse::<f64>().ok())
            .ok_or(ParseError::DatatypeParseFailure)
    }

    /// Read a `<len>\r\n<len bytes>\r\n` body and return the payload
    fn parse_next_chunk(&mut self) -> ParseResult<&'a [u8]> {
        let sizeline = self.read_line()?;
        let size = Self::parse_into_usize(sizeline)?;
        let chunk = self.read_until(size)?;
        self.expect_terminator()?;
        Ok(chunk)
    }

    /// Parse the next element. The cursor should be at the tsymbol (not passed)
    fn parse_next_element(&mut self, depth: usize) -> ParseResult<Value> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::BadPacket);
        }
        let tsymbol = self.next_byte()?;
        match tsymbol {
            TSYMBOL_BYTES => {
                let chunk = self.parse_next_chunk()?;
                Ok(Value::Bytes(Bytes::copy_from_slice(chunk)))
            }
            TSYMBOL_STRING => {
                let sizeline = self.read_line()?;
                if sizeline == b"-1" {
                    // the null frame; no body follows
                    return Ok(Value::Null);
                }
                if sizeline.first() == Some(&b'-') {
                    return Err(ParseError::BadPacket);
                }
                let size = Self::parse_into_usize(sizeline)?;
                let chunk = self.read_until(size)?;
                self.expect_terminator()?;
                let string = str::from_utf8(chunk)
                    .map_err(|_| ParseError::DatatypeParseFailure)?
                    .to_owned();
                Ok(Value::Str(string))
            }
            TSYMBOL_INT => {
                let line = self.read_line()?;
                Ok(Value::Int(Self::parse_into_i64(line)?))
            }
            TSYMBOL_FLOAT => {
                let line = self.read_line()?;
                Ok(Value::Float(Self::parse_into_f64(line)?))
            }
            TSYMBOL_ERROR => {
                let line = self.read_line()?;
                let message = str::from_utf8(line)
                    .map_err(|_| ParseError::DatatypeParseFailure)?
                    .to_owned();
                Ok(Value::ErrorMsg(message))
            }
            TSYMBOL_ARRAY => {
                let sizeline = self.read_line()?;
                let size = Self::parse_into_usize(sizeline)?;
                // every element occupies at least one byte, so a count
                // larger than what is buffered can be bounced before the
                // allocation
                if size > self.remaining() {
                    return Err(ParseError::NotEnough);
                }
                let mut elements = Vec::with_capacity(size);
                for _ in 0..size {
                    elements.push(self.parse_next_element(depth + 1)?);
                }
                Ok(Value::List(elements))
            }
            TSYMBOL_MAP => {
                let sizeline = self.read_line()?;
                let size = Self::parse_into_usize(sizeline)?;
                if size > self.remaining() {
                    return Err(ParseError::NotEnough);
                }
                let mut pairs = Vec::with_capacity(size);
                for _ in 0..size {
                    let key = self.parse_next_element(depth + 1)?;
                    let value = self.parse_next_element(depth + 1)?;
                    pairs.push((key, value));
                }
                Ok(Value::Map(pairs))
            }
            _ => Err(ParseError::UnexpectedByte),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> ParseResult<(Value, usize)> {
        Parser::new(input).parse()
    }

    #[test]
    fn test_parse_command_array() {
        let input = b"*3\r\n$3\r\nSET\r\n$2\r\nk0\r\n$2\r\nv0\r\n";
        let (frame, consumed) = parse(input).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(
            frame,
            Value::List(vec!["SET".into(), "k0".into(), "v0".into()])
        );
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse(b":1024\r\n").unwrap().0, Value::Int(1024));
        assert_eq!(parse(b":-42\r\n").unwrap().0, Value::Int(-42));
        assert_eq!(parse(b"?3.25\r\n").unwrap().0, Value::Float(3.25));
        assert_eq!(parse(b"$-1\r\n").unwrap().0, Value::Null);
        assert_eq!(
            parse(b"-Unrecognized command: FOO\r\n").unwrap().0,
            Value::ErrorMsg("Unrecognized command: FOO".to_owned())
        );
    }

    #[test]
    fn test_parse_blob_with_embedded_terminator() {
        // the blob length is authoritative; a CRLF inside the payload is data
        let input = b"+6\r\nab\r\ncd\r\n";
        let (frame, consumed) = parse(input).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(frame, Value::Bytes(Bytes::from_static(b"ab\r\ncd")));
    }

    #[test]
    fn test_parse_string_length_counts_bytes_not_chars() {
        // 'ü' is two bytes in UTF-8
        let input = "$3\r\naü\r\n".as_bytes();
        let (frame, _) = parse(input).unwrap();
        assert_eq!(frame, Value::Str("aü".to_owned()));
    }

    #[test]
    fn test_parse_nested_map() {
        let input = b"%2\r\n$1\r\na\r\n:1\r\n$1\r\nb\r\n*1\r\n+2\r\nhi\r\n";
        let (frame, consumed) = parse(input).unwrap();
        assert_eq!(consumed, input.len());
        assert_eq!(
            frame,
            Value::Map(vec![
                ("a".into(), Value::Int(1)),
                (
                    "b".into(),
                    Value::List(vec![Value::Bytes(Bytes::from_static(b"hi"))])
                ),
            ])
        );
    }

    #[test]
    fn test_parse_incomplete_frames() {
        assert_eq!(parse(b"").unwrap_err(), ParseError::Empty);
        assert_eq!(parse(b"$").unwrap_err(), ParseError::NotEnough);
        assert_eq!(parse(b"$2\r\nv").unwrap_err(), ParseError::NotEnough);
        assert_eq!(parse(b"$2\r\nv0").unwrap_err(), ParseError::NotEnough);
        assert_eq!(
            parse(b"*2\r\n$1\r\na\r\n").unwrap_err(),
            ParseError::NotEnough
        );
    }

    #[test]
    fn test_parse_leaves_the_next_frame_alone() {
        let input = b":1\r\n:2\r\n";
        let (frame, consumed) = parse(input).unwrap();
        assert_eq!(frame, Value::Int(1));
        assert_eq!(consumed, 4);
        let (frame, _) = parse(&input[consumed..]).unwrap();
        assert_eq!(frame, Value::Int(2));
    }

    #[test]
    fn test_parse_bad_packets() {
        // unknown tsymbol
        assert_eq!(parse(b"#2\r\nhi\r\n").unwrap_err(), ParseError::UnexpectedByte);
        // non-numeric header
        assert_eq!(
            parse(b"*A\r\n").unwrap_err(),
            ParseError::DatatypeParseFailure
        );
        // negative string length other than the null marker
        assert_eq!(parse(b"$-2\r\nxx\r\n").unwrap_err(), ParseError::BadPacket);
        // payload not followed by a terminator
        assert_eq!(
            parse(b"$2\r\nv0xx").unwrap_err(),
            ParseError::UnexpectedByte
        );
        // non-utf8 data under a string tsymbol
        assert_eq!(
            parse(b"$2\r\n\xff\xfe\r\n").unwrap_err(),
            ParseError::DatatypeParseFailure
        );
    }

    #[test]
    fn test_parse_nesting_depth_is_bounded() {
        let mut input = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 2) {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert_eq!(parse(&input).unwrap_err(), ParseError::BadPacket);
    }
}
