/*
 * Created on Mon Oct 04 2021
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

//! # The Kestrel client
//!
//! A small synchronous client meant for embedding into tools. The client
//! owns a pool of persistent connections behind one mutex; [`Client::execute`]
//! takes the lock, writes the request on one pooled connection, reads the
//! reply and releases the lock. There is no pipelining: one request is in
//! flight per connection at a time.
//!
//! ```no_run
//! use kestrel_client::Client;
//! use libkestrel::protocol::Value;
//!
//! let db = Client::new("127.0.0.1", 31337).unwrap();
//! db.set("greeting", "hello".into()).unwrap();
//! assert_eq!(db.get("greeting").unwrap(), Value::Str("hello".to_owned()));
//! db.close();
//! ```

use libkestrel::protocol::{encoder, ParseError, Parser, Value};
use libkestrel::BUF_CAP;
use parking_lot::Mutex;
use std::fmt;
use std::io::{Error as IoError, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

/// How many persistent connections a client keeps by default
pub const DEFAULT_POOL_SIZE: usize = 2;

/// A generic result for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client
#[derive(Debug)]
pub enum ClientError {
    /// The connection failed underneath us
    Io(IoError),
    /// The server replied with an error frame; this carries the server's
    /// error text
    Server(String),
    /// The server sent something that doesn't parse as a frame
    Protocol(ParseError),
    /// The client was closed; all pooled connections are gone
    Closed,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "io error: {}", e),
            ClientError::Server(e) => write!(f, "server error: {}", e),
            ClientError::Protocol(e) => write!(f, "protocol error: {}", e),
            ClientError::Closed => write!(f, "the client has been closed"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<IoError> for ClientError {
    fn from(e: IoError) -> Self {
        ClientError::Io(e)
    }
}

/// One pooled connection: the stream and its read buffer
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl Connection {
    /// Write one request frame and read one reply frame
    fn execute(&mut self, request: &Value) -> ClientResult<Value> {
        let payload = encoder::encode(request);
        self.stream.write_all(&payload)?;
        self.stream.flush()?;
        loop {
            match Parser::new(&self.buffer).parse() {
                Ok((frame, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(frame);
                }
                Err(ParseError::Empty) | Err(ParseError::NotEnough) => (),
                Err(e) => return Err(ClientError::Protocol(e)),
            }
            let mut chunk = [0u8; BUF_CAP];
            let read = self.stream.read(&mut chunk)?;
            if read == 0 {
                return Err(ClientError::Io(IoError::from(ErrorKind::UnexpectedEof)));
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }
}

#[derive(Debug)]
struct Pool {
    connections: Vec<Connection>,
    cursor: usize,
}

/// A handle to a Kestrel server
///
/// The client is safe to share across threads; requests from concurrent
/// threads serialize on the pool mutex
#[derive(Debug)]
pub struct Client {
    pool: Mutex<Pool>,
}

impl Client {
    /// Connect a client with the default pool size
    pub fn new(host: &str, port: u16) -> std::io::Result<Client> {
        Self::with_pool_size(host, port, DEFAULT_POOL_SIZE)
    }
    /// Connect a client with `pool_size` persistent connections (at least
    /// one)
    pub fn with_pool_size(host: &str, port: u16, pool_size: usize) -> std::io::Result<Client> {
        let mut connections = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let stream = TcpStream::connect((host, port))?;
            connections.push(Connection {
                stream,
                buffer: Vec::with_capacity(BUF_CAP),
            });
        }
        Ok(Client {
            pool: Mutex::new(Pool {
                connections,
                cursor: 0,
            }),
        })
    }
    /// Run any command: the escape hatch for verbs this client doesn't have
    /// a method for. An error reply raises [`ClientError::Server`] with the
    /// server's error text
    pub fn execute(&self, command: &str, args: Vec<Value>) -> ClientResult<Value> {
        let mut request = Vec::with_capacity(args.len() + 1);
        request.push(Value::Str(command.to_owned()));
        request.extend(args);
        let mut pool = self.pool.lock();
        if pool.connections.is_empty() {
            return Err(ClientError::Closed);
        }
        let idx = pool.cursor % pool.connections.len();
        pool.cursor = pool.cursor.wrapping_add(1);
        let reply = pool.connections[idx].execute(&Value::List(request))?;
        match reply {
            Value::ErrorMsg(message) => Err(ClientError::Server(message)),
            value => Ok(value),
        }
    }
    /// Shut down and drop every pooled connection. Any call after this
    /// fails with [`ClientError::Closed`]
    pub fn close(&self) {
        let mut pool = self.pool.lock();
        for con in pool.connections.drain(..) {
            let _ = con.stream.shutdown(Shutdown::Both);
        }
    }

    // Below are the typed per-command methods

    pub fn get(&self, key: &str) -> ClientResult<Value> {
        self.execute("GET", vec![key.into()])
    }
    pub fn set(&self, key: &str, value: Value) -> ClientResult<Value> {
        self.execute("SET", vec![key.into(), value])
    }
    pub fn delete(&self, key: &str) -> ClientResult<Value> {
        self.execute("DELETE", vec![key.into()])
    }
    pub fn flush(&self) -> ClientResult<Value> {
        self.execute("FLUSH", vec![])
    }
    pub fn mget(&self, keys: &[&str]) -> ClientResult<Value> {
        self.execute("MGET", keys.iter().map(|key| (*key).into()).collect())
    }
    pub fn mset(&self, items: Vec<(&str, Value)>) -> ClientResult<Value> {
        let mut args = Vec::with_capacity(items.len() * 2);
        for (key, value) in items {
            args.push(key.into());
            args.push(value);
        }
        self.execute("MSET", args)
    }
    pub fn lpush(&self, key: &str, values: Vec<Value>) -> ClientResult<Value> {
        let mut args = vec![key.into()];
        args.extend(values);
        self.execute("LPUSH", args)
    }
    pub fn rpush(&self, key: &str, values: Vec<Value>) -> ClientResult<Value> {
        let mut args = vec![key.into()];
        args.extend(values);
        self.execute("RPUSH", args)
    }
    pub fn lpop(&self, key: &str) -> ClientResult<Value> {
        self.execute("LPOP", vec![key.into()])
    }
    pub fn rpop(&self, key: &str) -> ClientResult<Value> {
        self.execute("RPOP", vec![key.into()])
    }
    pub fn llen(&self, key: &str) -> ClientResult<Value> {
        self.execute("LLEN", vec![key.into()])
    }
    /// A blocking head pop. Without a timeout the server waits for its
    /// default (60 seconds); the read blocks until the server replies
    pub fn blpop(&self, key: &str, timeout: Option<i64>) -> ClientResult<Value> {
        let mut args = vec![key.into()];
        if let Some(timeout) = timeout {
            args.push(Value::Int(timeout));
        }
        self.execute("BLPOP", args)
    }
    /// A blocking tail pop; the server default timeout is 30 seconds
    pub fn brpop(&self, key: &str, timeout: Option<i64>) -> ClientResult<Value> {
        let mut args = vec![key.into()];
        if let Some(timeout) = timeout {
            args.push(Value::Int(timeout));
        }
        self.execute("BRPOP", args)
    }
    pub fn expire(&self, key: &str, seconds: i64) -> ClientResult<Value> {
        self.execute("EXPIRE", vec![key.into(), Value::Int(seconds)])
    }
    pub fn ttl(&self, key: &str) -> ClientResult<Value> {
        self.execute("TTL", vec![key.into()])
    }
    pub fn persist(&self, key: &str) -> ClientResult<Value> {
        self.execute("PERSIST", vec![key.into()])
    }
    pub fn info(&self) -> ClientResult<Value> {
        self.execute("INFO", vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// A one-shot fake server: accepts a single connection, reads one
    /// request frame and writes back the provided raw reply
    fn fake_server(reply: &'static [u8]) -> (u16, thread::JoinHandle<Value>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buffer = Vec::new();
            let request = loop {
                match Parser::new(&buffer).parse() {
                    Ok((frame, _)) => break frame,
                    Err(ParseError::Empty) | Err(ParseError::NotEnough) => (),
                    Err(e) => panic!("bad request from the client: {}", e),
                }
                let mut chunk = [0u8; 1024];
                let read = stream.read(&mut chunk).unwrap();
                assert_ne!(read, 0);
                buffer.extend_from_slice(&chunk[..read]);
            };
            stream.write_all(reply).unwrap();
            request
        });
        (port, handle)
    }

    #[test]
    fn test_get_roundtrip() {
        let (port, server) = fake_server(b"$2\r\nv0\r\n");
        let client = Client::with_pool_size("127.0.0.1", port, 1).unwrap();
        let reply = client.get("k0").unwrap();
        assert_eq!(reply, Value::Str("v0".to_owned()));
        let request = server.join().unwrap();
        assert_eq!(
            request,
            Value::List(vec!["GET".into(), "k0".into()])
        );
    }

    #[test]
    fn test_error_replies_become_server_errors() {
        let (port, server) = fake_server(b"-Unrecognized command: NOPE\r\n");
        let client = Client::with_pool_size("127.0.0.1", port, 1).unwrap();
        match client.execute("NOPE", vec![]) {
            Err(ClientError::Server(message)) => {
                assert_eq!(message, "Unrecognized command: NOPE");
            }
            other => panic!("expected a server error, got: {:?}", other),
        }
        let _ = server.join().unwrap();
    }

    #[test]
    fn test_close_closes_the_pool() {
        let (port, server) = fake_server(b":1\r\n");
        let client = Client::with_pool_size("127.0.0.1", port, 1).unwrap();
        assert_eq!(client.set("k", "v".into()).unwrap(), Value::Int(1));
        let _ = server.join().unwrap();
        client.close();
        match client.get("k") {
            Err(ClientError::Closed) => (),
            other => panic!("expected the client to be closed, got: {:?}", other),
        }
    }
}
