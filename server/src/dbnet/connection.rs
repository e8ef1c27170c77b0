/*
 * Created on Sun Apr 25 2021
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

//! # Per-connection machinery
//!
//! A [`Connection`] pairs a buffered write half with a read buffer that
//! frames are parsed out of incrementally: bytes are pulled off the socket
//! until the parser produces one complete frame, the buffer is advanced past
//! it, and whatever was read beyond the frame stays put for the next round.
//!
//! The [`ConnectionHandler`] drives the request/response cycle over such a
//! connection until the peer hangs up, an I/O error occurs, the framing
//! breaks, or the server shuts down.

use crate::actions::ActionError;
use crate::coredb::CoreDB;
use crate::dbnet::{BufferedSocketStream, Terminator};
use crate::queryengine;
use bytes::{Buf, BytesMut};
use libkestrel::protocol::{encoder, ParseError, Parser, Value};
use libkestrel::BUF_CAP;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, Semaphore};

/// Result of one attempt to read a query off a connection
pub enum QueryResult {
    /// A complete frame, ready to dispatch
    Q(Value),
    /// The framing broke down; the connection must be closed
    E(ParseError),
    /// The client disconnected cleanly
    Disconnected,
}

/// A TCP connection wrapped for the wire protocol
pub struct Connection<T> {
    /// The connection to the remote socket, wrapped in a buffered writer
    stream: BufWriter<T>,
    /// The in-memory read buffer. The size is given by `BUF_CAP`
    buffer: BytesMut,
}

impl<T> Connection<T>
where
    T: BufferedSocketStream,
{
    /// Initialize a new `Connection` instance
    pub fn new(stream: T) -> Self {
        Connection {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(BUF_CAP),
        }
    }
    /// Try to parse one frame from the buffered data
    fn try_query(&self) -> Result<(Value, usize), ParseError> {
        Parser::new(&self.buffer).parse()
    }
    /// Read one query off the stream
    ///
    /// This function asynchronously waits until all the data required for
    /// parsing the frame is available. Decoding fails with
    /// [`QueryResult::Disconnected`] when the peer closes the stream on a
    /// frame boundary; an EOF in the middle of a frame is a connection
    /// reset
    pub async fn read_query(&mut self) -> IoResult<QueryResult> {
        loop {
            match self.try_query() {
                Ok((frame, forward_by)) => {
                    self.buffer.advance(forward_by);
                    return Ok(QueryResult::Q(frame));
                }
                Err(ParseError::Empty) | Err(ParseError::NotEnough) => (),
                Err(e) => return Ok(QueryResult::E(e)),
            }
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(QueryResult::Disconnected)
                } else {
                    Err(IoError::from(ErrorKind::ConnectionReset))
                };
            }
        }
    }
    /// Write one reply frame into the stream's write buffer
    pub async fn write_response(&mut self, value: &Value) -> IoResult<()> {
        let payload = encoder::encode(value);
        self.stream.write_all(&payload).await
    }
    /// Write an error reply frame
    pub async fn write_error(&mut self, message: &str) -> IoResult<()> {
        self.write_response(&Value::ErrorMsg(message.to_owned()))
            .await
    }
    /// Flush everything buffered so far down the socket
    pub async fn flush_stream(&mut self) -> IoResult<()> {
        self.stream.flush().await
    }
    /// Write an error reply and flush; used just before the connection is
    /// dropped
    pub async fn close_conn_with_error(&mut self, message: &str) -> IoResult<()> {
        self.write_error(message).await?;
        self.flush_stream().await
    }
}

/// A generic connection handler. It takes an accepted connection, reads
/// queries off it, passes them to the query engine and flushes the replies,
/// looping until disconnect or shutdown
pub struct ConnectionHandler<T> {
    db: CoreDB,
    con: Connection<T>,
    climit: Arc<Semaphore>,
    terminator: Terminator,
    _term_sig_tx: mpsc::Sender<()>,
}

impl<T> ConnectionHandler<T>
where
    T: BufferedSocketStream,
{
    pub fn new(
        db: CoreDB,
        con: Connection<T>,
        climit: Arc<Semaphore>,
        terminator: Terminator,
        _term_sig_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            db,
            con,
            climit,
            terminator,
            _term_sig_tx,
        }
    }
    pub async fn run(&mut self) -> IoResult<()> {
        log::debug!("ConnectionHandler initialized to handle a remote client");
        while !self.terminator.is_termination_signal() {
            let try_frame = tokio::select! {
                frame = self.con.read_query() => frame?,
                _ = self.terminator.receive_signal() => {
                    return Ok(());
                }
            };
            match try_frame {
                QueryResult::Q(frame) => {
                    match queryengine::execute_simple(&self.db, &mut self.con, frame).await {
                        Ok(()) => {}
                        Err(ActionError::ActionError(e)) => self.con.write_error(&e).await?,
                        Err(ActionError::IoError(e)) => return Err(e),
                    }
                    self.con.flush_stream().await?;
                }
                QueryResult::E(e) => {
                    // the stream framing is lost, so there is nothing left
                    // to do but tell the client and hang up
                    log::debug!("Failed to read query: {}", e);
                    return self.con.close_conn_with_error("bad request").await;
                }
                QueryResult::Disconnected => {
                    log::debug!("Client went away");
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

impl<T> Drop for ConnectionHandler<T> {
    fn drop(&mut self) {
        // Make sure that the permit is returned to the semaphore
        // in the case that there is a panic inside
        self.climit.add_permits(1);
    }
}
