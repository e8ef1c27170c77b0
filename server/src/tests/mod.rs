/*
 * Created on Tue Sep 21 2021
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

//! Full-stack tests that start a real listener on an ephemeral loopback
//! port and speak raw frames to it over TCP

use crate::coredb::CoreDB;
use crate::dbnet::{BaseListener, Listener};
use libkestrel::protocol::{encoder, ParseError, Parser, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A throwaway server bound to an ephemeral loopback port
struct TestServer {
    addr: SocketAddr,
    listener: JoinHandle<()>,
    _signal: broadcast::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        let (signal, _) = broadcast::channel(1);
        let db = CoreDB::new_empty();
        let base = BaseListener::init(
            &db,
            LOCALHOST,
            0,
            Arc::new(Semaphore::new(64)),
            signal.clone(),
        )
        .await
        .unwrap();
        let addr = base.local_addr().unwrap();
        let mut listener = Listener::new(base);
        let handle = tokio::spawn(async move {
            let _ = listener.run().await;
        });
        TestServer {
            addr,
            listener: handle,
            _signal: signal,
        }
    }
    async fn connect(&self) -> TestConnection {
        TestConnection::open(self.addr).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// A raw client connection that frames values by hand
struct TestConnection {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TestConnection {
    async fn open(addr: SocketAddr) -> Self {
        TestConnection {
            stream: TcpStream::connect(addr).await.unwrap(),
            buffer: Vec::new(),
        }
    }
    async fn send_raw(&mut self, payload: &[u8]) {
        self.stream.write_all(payload).await.unwrap();
    }
    /// Read bytes off the socket until one full frame parses
    async fn recv_frame(&mut self) -> Value {
        loop {
            match Parser::new(&self.buffer).parse() {
                Ok((frame, consumed)) => {
                    self.buffer.drain(..consumed);
                    return frame;
                }
                Err(ParseError::Empty) | Err(ParseError::NotEnough) => (),
                Err(e) => panic!("bad frame from the server: {}", e),
            }
            let mut chunk = [0u8; 1024];
            let read = self.stream.read(&mut chunk).await.unwrap();
            assert_ne!(read, 0, "the server closed the connection");
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }
    /// Read exactly `len` raw reply bytes; for literal-frame assertions on
    /// fresh connections
    async fn recv_exactly(&mut self, len: usize) -> Vec<u8> {
        assert!(self.buffer.is_empty());
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await.unwrap();
        buf
    }
    /// Send a command as an array of strings and wait for the reply
    async fn run(&mut self, command: &[&str]) -> Value {
        let frame = Value::List(command.iter().map(|word| Value::from(*word)).collect());
        self.send_raw(&encoder::encode(&frame)).await;
        self.recv_frame().await
    }
}

#[tokio::test]
async fn test_set_then_get_literal_frames() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    con.send_raw(b"*3\r\n$3\r\nSET\r\n$2\r\nk0\r\n$2\r\nv0\r\n")
        .await;
    assert_eq!(con.recv_exactly(4).await, b":1\r\n");
    con.send_raw(b"*2\r\n$3\r\nGET\r\n$2\r\nk0\r\n").await;
    assert_eq!(con.recv_exactly(8).await, b"$2\r\nv0\r\n");
}

#[tokio::test]
async fn test_get_missing_is_null() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    con.send_raw(b"*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n").await;
    assert_eq!(con.recv_exactly(5).await, b"$-1\r\n");
}

#[tokio::test]
async fn test_lpush_then_lpop_order() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(
        con.run(&["LPUSH", "list1", "a", "b", "c"]).await,
        Value::Int(3)
    );
    assert_eq!(con.run(&["LPOP", "list1"]).await, "c".into());
    assert_eq!(con.run(&["LPOP", "list1"]).await, "b".into());
    assert_eq!(con.run(&["LLEN", "list1"]).await, Value::Int(1));
}

#[tokio::test]
async fn test_rpush_then_rpop_order() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(con.run(&["RPUSH", "list2", "a"]).await, Value::Int(1));
    assert_eq!(con.run(&["RPUSH", "list2", "b"]).await, Value::Int(2));
    assert_eq!(con.run(&["RPOP", "list2"]).await, "b".into());
    assert_eq!(con.run(&["RPOP", "list2"]).await, "a".into());
    assert_eq!(con.run(&["RPOP", "list2"]).await, Value::Null);
}

#[tokio::test]
async fn test_blpop_times_out_with_null() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    let start = Instant::now();
    assert_eq!(con.run(&["BLPOP", "empty", "1"]).await, Value::Null);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_blpop_returns_immediately_when_data_is_ready() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(con.run(&["RPUSH", "q", "x"]).await, Value::Int(1));
    let start = Instant::now();
    assert_eq!(con.run(&["BLPOP", "q", "30"]).await, "x".into());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_blpop_unblocked_by_rpush_from_another_connection() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let blocked = tokio::spawn(async move { a.run(&["BLPOP", "q", "30"]).await });
    // give the popper a moment to register its waiter
    time::sleep(Duration::from_millis(150)).await;
    let mut b = server.connect().await;
    assert_eq!(b.run(&["RPUSH", "q", "hello"]).await, Value::Int(1));
    let popped = time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("the blocked popper was not woken in time")
        .unwrap();
    assert_eq!(popped, "hello".into());
}

#[tokio::test]
async fn test_waiters_are_served_in_fifo_order() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let first = tokio::spawn(async move { a.run(&["BLPOP", "q", "5"]).await });
    time::sleep(Duration::from_millis(150)).await;
    let mut b = server.connect().await;
    let second = tokio::spawn(async move { b.run(&["BLPOP", "q", "5"]).await });
    time::sleep(Duration::from_millis(150)).await;
    let mut pusher = server.connect().await;
    // one push wakes exactly one waiter: the first one in line
    assert_eq!(pusher.run(&["RPUSH", "q", "one"]).await, Value::Int(1));
    let popped = time::timeout(Duration::from_secs(1), first)
        .await
        .expect("the first waiter was not woken in time")
        .unwrap();
    assert_eq!(popped, "one".into());
    time::sleep(Duration::from_millis(150)).await;
    assert!(!second.is_finished(), "the second waiter was woken early");
    assert_eq!(pusher.run(&["RPUSH", "q", "two"]).await, Value::Int(1));
    let popped = time::timeout(Duration::from_secs(1), second)
        .await
        .expect("the second waiter was not woken in time")
        .unwrap();
    assert_eq!(popped, "two".into());
}

#[tokio::test]
async fn test_set_does_not_wake_list_waiters() {
    let server = TestServer::start().await;
    let mut a = server.connect().await;
    let blocked = tokio::spawn(async move { a.run(&["BLPOP", "q", "1"]).await });
    time::sleep(Duration::from_millis(150)).await;
    let mut b = server.connect().await;
    assert_eq!(b.run(&["SET", "q", "not-a-push"]).await, Value::Int(1));
    time::sleep(Duration::from_millis(300)).await;
    assert!(!blocked.is_finished(), "a SET must not wake list waiters");
    // the popper runs into its timeout instead
    let popped = time::timeout(Duration::from_secs(2), blocked)
        .await
        .expect("the popper never timed out")
        .unwrap();
    assert_eq!(popped, Value::Null);
}

#[tokio::test]
async fn test_expire_ttl_persist_cycle() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(con.run(&["SET", "k", "v"]).await, Value::Int(1));
    assert_eq!(con.run(&["EXPIRE", "k", "100"]).await, Value::Int(100));
    match con.run(&["TTL", "k"]).await {
        Value::Int(seconds) => assert!((0..=100).contains(&seconds)),
        other => panic!("expected an integer TTL, got: {:?}", other),
    }
    assert_eq!(con.run(&["PERSIST", "k"]).await, Value::Null);
    assert_eq!(con.run(&["TTL", "k"]).await, Value::Int(-1));
}

#[tokio::test]
async fn test_mset_and_mget() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(
        con.run(&["MSET", "x", "100", "y", "200"]).await,
        Value::Int(2)
    );
    assert_eq!(
        con.run(&["MGET", "x", "y", "z"]).await,
        Value::List(vec!["100".into(), "200".into(), Value::Null])
    );
    // an odd argument count is a format error
    match con.run(&["MSET", "x", "1", "dangling"]).await {
        Value::ErrorMsg(e) => assert!(e.starts_with("Wrong format")),
        other => panic!("expected a format error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_commands_are_reported() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(
        con.run(&["HEYA"]).await,
        Value::ErrorMsg("Unrecognized command: HEYA".to_owned())
    );
    // commands are matched case-sensitively
    assert_eq!(
        con.run(&["get", "k"]).await,
        Value::ErrorMsg("Unrecognized command: get".to_owned())
    );
}

#[tokio::test]
async fn test_wrong_type_contracts() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(con.run(&["SET", "s", "scalar"]).await, Value::Int(1));
    match con.run(&["LPUSH", "s", "x"]).await {
        Value::ErrorMsg(e) => assert!(e.starts_with("Wrong type")),
        other => panic!("expected a type error, got: {:?}", other),
    }
    assert_eq!(con.run(&["LPOP", "s"]).await, Value::Null);
    assert_eq!(con.run(&["LLEN", "s"]).await, Value::Null);
    // the key itself was left untouched
    assert_eq!(con.run(&["GET", "s"]).await, "scalar".into());
}

#[tokio::test]
async fn test_simple_string_requests_are_split() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(con.run(&["SET", "k0", "v0"]).await, Value::Int(1));
    con.send_raw(b"$6\r\nGET k0\r\n").await;
    assert_eq!(con.recv_frame().await, "v0".into());
}

#[tokio::test]
async fn test_delete_is_idempotent_over_the_wire() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(con.run(&["SET", "k", "v"]).await, Value::Int(1));
    assert_eq!(con.run(&["DELETE", "k"]).await, Value::Int(1));
    assert_eq!(con.run(&["DELETE", "k"]).await, Value::Int(0));
    assert_eq!(con.run(&["GET", "k"]).await, Value::Null);
}

#[tokio::test]
async fn test_flush_reports_the_prior_key_count() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(
        con.run(&["MSET", "a", "1", "b", "2"]).await,
        Value::Int(2)
    );
    assert_eq!(con.run(&["FLUSH"]).await, Value::Int(2));
    assert_eq!(con.run(&["GET", "a"]).await, Value::Null);
    assert_eq!(con.run(&["FLUSH"]).await, Value::Int(0));
}

#[tokio::test]
async fn test_info_reports_keys_types_and_sizes() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    assert_eq!(con.run(&["SET", "k0", "v0"]).await, Value::Int(1));
    assert_eq!(con.run(&["RPUSH", "l", "a", "b"]).await, Value::Int(2));
    match con.run(&["INFO"]).await {
        Value::Str(summary) => {
            assert_eq!(summary, "key, type, size\nk0, str, 2\nl, list, 2\n");
        }
        other => panic!("expected a textual summary, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_command_arrays_are_rejected() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    con.send_raw(b"*0\r\n").await;
    assert_eq!(
        con.recv_frame().await,
        Value::ErrorMsg("Missing command".to_owned())
    );
    // the connection survives a command error
    assert_eq!(con.run(&["SET", "k", "v"]).await, Value::Int(1));
}

#[tokio::test]
async fn test_bad_frames_close_the_connection() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    con.send_raw(b"#nonsense\r\n").await;
    assert_eq!(
        con.recv_frame().await,
        Value::ErrorMsg("bad request".to_owned())
    );
    // nothing more to read: the server hung up
    let mut chunk = [0u8; 16];
    assert_eq!(con.stream.read(&mut chunk).await.unwrap(), 0);
}

#[tokio::test]
async fn test_nested_values_survive_storage() {
    let server = TestServer::start().await;
    let mut con = server.connect().await;
    // SET k <map> with a nested array value, sent as raw frames
    let mut payload = Vec::new();
    payload.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n");
    payload.extend_from_slice(b"%1\r\n$3\r\nkey\r\n*2\r\n:1\r\n+3\r\nbin\r\n");
    con.send_raw(&payload).await;
    assert_eq!(con.recv_frame().await, Value::Int(1));
    con.send_raw(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n").await;
    assert_eq!(
        con.recv_frame().await,
        Value::Map(vec![(
            "key".into(),
            Value::List(vec![
                Value::Int(1),
                Value::Bytes(bytes::Bytes::from_static(b"bin"))
            ])
        )])
    );
}
