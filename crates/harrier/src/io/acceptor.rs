// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Listening sockets and the accept path.
//!
//! An acceptor binds at construction (SO_REUSEADDR so restarts do not
//! trip over TIME_WAIT) and starts accepting once registered with the
//! reactor. Each accepted stream is handed to the service's `Many`
//! callback on a pool worker.

use crate::io::reactor::{Entry, IoShared};
use crate::io::task::Task;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Invoked once per accepted stream, on a pool worker. The service takes
/// ownership of the stream and typically registers a server connection.
pub type AcceptCallback = Arc<dyn Fn(TcpStream) + Send + Sync>;

pub struct Acceptor {
    listener: Mutex<TcpListener>,
    token: Token,
    callback: AcceptCallback,
    io: Weak<IoShared>,
    closed: AtomicBool,
    port: u16,
}

impl Acceptor {
    /// Bind `port` on all interfaces (0 picks an ephemeral port, which
    /// tests use). Accepting starts at [`start`](Self::start).
    pub(crate) fn bind(
        port: u16,
        callback: AcceptCallback,
        shared: &Arc<IoShared>,
    ) -> io::Result<Arc<Self>> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&addr.into())?;
        socket.listen(1024)?;
        socket.set_nonblocking(true)?;

        let listener = TcpListener::from_std(socket.into());
        let port = listener.local_addr()?.port();
        log::info!("[ACCEPT] listening on port {}", port);

        Ok(Arc::new(Self {
            listener: Mutex::new(listener),
            token: shared.next_token(),
            callback,
            io: Arc::downgrade(shared),
            closed: AtomicBool::new(false),
            port,
        }))
    }

    /// The bound port (the requested one, or the ephemeral pick).
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Register with the reactor and start accepting.
    pub(crate) fn start(self: &Arc<Self>) -> io::Result<()> {
        let shared = match self.io.upgrade() {
            Some(shared) => shared,
            None => return Ok(()), // reactor already gone
        };
        shared
            .registry
            .register(&mut *self.listener.lock(), self.token, Interest::READABLE)?;
        shared
            .entries
            .lock()
            .insert(self.token, Entry::Acceptor(self.clone()));
        Ok(())
    }

    /// Stop accepting. Idempotent, safe from any thread.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.io.upgrade() {
            shared.entries.lock().remove(&self.token);
            if let Err(e) = shared.registry.deregister(&mut *self.listener.lock()) {
                log::debug!("[ACCEPT] deregister port {}: {}", self.port, e);
            }
        }
        log::info!("[ACCEPT] closed port {}", self.port);
    }

    /// Readable readiness on the listener: accept everything pending and
    /// dispatch the callback per stream.
    pub(crate) fn handle_ready(&self, shared: &Arc<IoShared>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        loop {
            let accepted = self.listener.lock().accept();
            match accepted {
                Ok((stream, peer)) => {
                    log::debug!("[ACCEPT] port {}: connection from {}", self.port, peer);
                    let callback = self.callback.clone();
                    shared.pool.add_task(Task::once(move || callback(stream)));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // An acceptor-socket failure is the one error that
                    // takes the whole service down.
                    log::error!("[ACCEPT] port {}: accept failed: {}", self.port, e);
                    shared.request_stop();
                    return;
                }
            }
        }
    }
}
