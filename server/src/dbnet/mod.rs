/*
 * Created on Tue Jul 20 2021
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

//! # Database networking
//!
//! The listener, the per-connection handlers and the machinery for taking
//! the whole thing down cleanly. Connections are served concurrently by the
//! runtime but bounded by a semaphore whose permits come from the `maxcon`
//! configuration; each connection runs a serial decode → dispatch → encode
//! loop, so within one connection reply N is written before command N+1 is
//! read.

pub mod connection;
pub mod prelude;

use crate::config::ServerConfig;
use crate::coredb::CoreDB;
use crate::services;
use connection::{Connection, ConnectionHandler};
use libkestrel::TResult;
use std::io::Result as IoResult;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};

/// The hard ceiling on the `maxcon` configuration
pub const MAXIMUM_CONNECTION_LIMIT: usize = 50000;

/// This is a "marker trait" that ensures that no silly types are
/// passed into the [`Connection`] type
pub trait BufferedSocketStream: AsyncReadExt + AsyncWriteExt + Unpin + Send + Sync {}

impl BufferedSocketStream for TcpStream {}

/// Responsible for gracefully shutting down the server instead of dying
/// randomly
#[derive(Debug)]
pub struct Terminator {
    terminate: bool,
    signal: broadcast::Receiver<()>,
}

impl Terminator {
    /// Create a new `Terminator` instance
    pub fn new(signal: broadcast::Receiver<()>) -> Self {
        Terminator {
            terminate: false,
            signal,
        }
    }
    /// Check if the signal is a termination signal
    pub const fn is_termination_signal(&self) -> bool {
        self.terminate
    }
    /// Wait to receive a shutdown signal
    pub async fn receive_signal(&mut self) {
        // The server may have already been terminated
        // in that case, just return
        if self.terminate {
            return;
        }
        let _ = self.signal.recv().await;
        self.terminate = true;
    }
}

/// A backoff implementation that is meant to be used in connection loops
pub(self) struct NetBackoff {
    c: AtomicU8,
}

impl NetBackoff {
    /// The maximum backoff duration
    const MAX_BACKOFF: u8 = 64;
    /// Create a new [`NetBackoff`] instance
    pub const fn new() -> Self {
        Self {
            c: AtomicU8::new(1),
        }
    }
    /// Wait for the current backoff duration
    pub async fn spin(&self) {
        let c = self.c.load(Ordering::Relaxed);
        time::sleep(Duration::from_secs(c as _)).await;
        self.c.store(c << 1, Ordering::Relaxed);
    }
    /// Should we disconnect the stream?
    pub fn should_disconnect(&self) -> bool {
        self.c.load(Ordering::Relaxed) > Self::MAX_BACKOFF
    }
}

/// The base TCP listener
pub struct BaseListener {
    /// An atomic reference to the coretable
    pub db: CoreDB,
    /// The incoming connection listener (binding)
    pub listener: TcpListener,
    /// The maximum number of connections
    pub climit: Arc<Semaphore>,
    /// The shutdown broadcaster
    pub signal: broadcast::Sender<()>,
    // When all `Sender`s are dropped - the `Receiver` gets a `None` value
    // We send a clone of `terminate_tx` to each `ConnectionHandler`
    pub terminate_tx: mpsc::Sender<()>,
    pub terminate_rx: mpsc::Receiver<()>,
}

impl BaseListener {
    pub async fn init(
        db: &CoreDB,
        host: IpAddr,
        port: u16,
        semaphore: Arc<Semaphore>,
        signal: broadcast::Sender<()>,
    ) -> TResult<Self> {
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| format!("failed to bind to port {port} with error: {e}"))?;
        Ok(Self {
            db: db.clone(),
            listener,
            climit: semaphore,
            signal,
            terminate_tx,
            terminate_rx,
        })
    }
    /// The address the listener actually bound to. Mostly interesting when
    /// port 0 was requested
    pub fn local_addr(&self) -> IoResult<SocketAddr> {
        self.listener.local_addr()
    }
    pub async fn release_self(self) {
        let Self {
            mut terminate_rx,
            terminate_tx,
            signal,
            ..
        } = self;
        drop(signal);
        drop(terminate_tx);
        let _ = terminate_rx.recv().await;
    }
}

/// The server's TCP listener: accepts connections until it is signalled to
/// stop and spawns a [`ConnectionHandler`] per accepted stream
pub struct Listener {
    pub base: BaseListener,
}

impl Listener {
    pub fn new(base: BaseListener) -> Self {
        Self { base }
    }
    /// Accept an incoming connection
    async fn accept(&mut self) -> IoResult<TcpStream> {
        let backoff = NetBackoff::new();
        loop {
            match self.base.listener.accept().await {
                // We don't need the bindaddr
                Ok((stream, _)) => return Ok(stream),
                Err(e) => {
                    if backoff.should_disconnect() {
                        // Too many retries, goodbye user
                        return Err(e);
                    }
                }
            }
            // spin to wait for the backoff duration
            backoff.spin().await;
        }
    }
    /// Run the accept loop
    pub async fn run(&mut self) -> IoResult<()> {
        loop {
            // Take the permit first, but we won't use it right now
            // that's why we will forget it
            self.base.climit.acquire().await.unwrap().forget();
            /*
             SECURITY: Ignore any errors that may arise in the accept
             loop. If we apply the try operator here, we will immediately
             terminate the run loop causing the entire server to go down.
             Also, do not log any errors because many connection errors
             can arise and it will flood the log and might also result
             in a crash
            */
            let stream = skip_loop_err!(self.accept().await);
            let mut chandle = ConnectionHandler::new(
                self.base.db.clone(),
                Connection::new(stream),
                self.base.climit.clone(),
                Terminator::new(self.base.signal.subscribe()),
                self.base.terminate_tx.clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = chandle.run().await {
                    log::error!("Error: {}", e);
                }
            });
        }
    }
    /// Signal the listener's workers to shut down and only return after
    /// they have shut down
    pub async fn finish_with_termsig(self) {
        self.base.release_self().await
    }
}

/// Initialize the database networking
pub async fn connect(
    cfg: &ServerConfig,
    db: CoreDB,
    signal: broadcast::Sender<()>,
) -> TResult<Listener> {
    let climit = Arc::new(Semaphore::new(cfg.maxcon));
    let base = BaseListener::init(&db, cfg.host, cfg.port, climit, signal).await?;
    let server = Listener::new(base);
    log::info!("Server started on {}:{}", cfg.host, cfg.port);
    Ok(server)
}

#[cfg(unix)]
use core::{future::Future, pin::Pin, task::Context, task::Poll};
#[cfg(unix)]
use tokio::signal::unix::{signal as fnsignal, Signal, SignalKind};
#[cfg(unix)]
/// Object to bind to unix-specific signals
pub struct UnixTerminationSignal {
    sigterm: Signal,
}

#[cfg(unix)]
impl UnixTerminationSignal {
    pub fn init() -> TResult<Self> {
        let sigterm = fnsignal(SignalKind::terminate())
            .map_err(|e| format!("Failed to bind to signal with: {}", e))?;
        Ok(Self { sigterm })
    }
}

#[cfg(unix)]
impl Future for UnixTerminationSignal {
    type Output = Option<()>;

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        self.sigterm.poll_recv(ctx)
    }
}

/// Start the server waiting for incoming connections or a termsig
pub async fn run(cfg: ServerConfig) -> TResult<CoreDB> {
    // Initialize the broadcast channel
    let (signal, _) = broadcast::channel(1);
    let db = CoreDB::new_empty();

    // initialize the background services
    let expirer_handle = tokio::spawn(services::expirer::ttl_service(
        db.clone(),
        Terminator::new(signal.subscribe()),
    ));

    // bind the ctrlc handler
    let sig = tokio::signal::ctrl_c();

    // start the listener
    let mut server = connect(&cfg, db.clone(), signal.clone()).await?;

    #[cfg(not(unix))]
    {
        // Non-unix, usually Windows specific signal handling
        tokio::select! {
            _ = server.run() => {}
            _ = sig => {}
        }
    }
    #[cfg(unix)]
    {
        let sigterm = UnixTerminationSignal::init()?;
        // apart from CTRLC, the only other thing we care about is SIGTERM
        tokio::select! {
            _ = server.run() => {},
            _ = sig => {},
            _ = sigterm => {}
        }
    }

    log::info!("Signalling all workers to shut down");
    // drop the signal and let others exit
    drop(signal);
    server.finish_with_termsig().await;

    // wait for the background services to terminate
    let _ = expirer_handle.await;
    Ok(db)
}
