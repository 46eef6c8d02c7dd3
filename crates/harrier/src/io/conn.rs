// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-ownership connections and the handler seam.
//!
//! A `Connection` owns one socket plus its inbound and outbound buffers.
//! Ownership is an `Arc`: the reactor's registry holds the entry that
//! keeps the connection registered, and any callback may hold further
//! clones across timer-delayed continuations. Teardown removes the
//! registry entry; the socket closes when the last holder lets go.
//!
//! Locking:
//! - `outbound` is *the* per-connection write mutex: a response is
//!   serialized under it, so it lands contiguously on the wire.
//! - `read_gate` serializes whole read-parse passes, keeping pipelined
//!   requests in order even when readable edges race.
//! - `stream` is locked briefly around the actual syscalls.
//!
//! Never park on a [`Notification`](crate::sync::Notification) while
//! holding any of these.

use crate::buffer::Buffer;
use crate::config::READ_CHUNK;
use crate::io::reactor::{Command, IoShared};
use mio::net::TcpStream;
use mio::{Interest, Token};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Service-side behavior attached to a connection.
///
/// `read_done` runs on a worker after fresh bytes were appended to the
/// inbound buffer; returning false tears the connection down. `conn_done`
/// runs once an asynchronous connect resolves (check
/// [`Connection::ok`]).
pub trait ConnHandler: Send + Sync {
    fn read_done(&self, conn: &Arc<Connection>) -> bool;

    fn conn_done(&self, conn: &Arc<Connection>) {
        let _ = conn;
    }
}

pub struct Connection {
    token: Token,
    stream: Mutex<TcpStream>,
    /// Inbound bytes awaiting parsing.
    pub inbound: Mutex<Buffer>,
    /// Outbound bytes awaiting the wire; its lock is the write mutex.
    pub outbound: Mutex<Buffer>,
    /// Serializes read+parse passes (response FIFO order).
    read_gate: Mutex<()>,
    io: Weak<IoShared>,
    connected: AtomicBool,
    closed: AtomicBool,
    write_armed: AtomicBool,
    error: Mutex<Option<io::Error>>,
}

impl Connection {
    pub(crate) fn new(
        stream: TcpStream,
        token: Token,
        io: Weak<IoShared>,
        connected: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            token,
            stream: Mutex::new(stream),
            inbound: Mutex::new(Buffer::new()),
            outbound: Mutex::new(Buffer::new()),
            read_gate: Mutex::new(()),
            io,
            connected: AtomicBool::new(connected),
            closed: AtomicBool::new(false),
            write_armed: AtomicBool::new(false),
            error: Mutex::new(None),
        })
    }

    /// Healthy: connect completed, no error, not torn down.
    pub fn ok(&self) -> bool {
        self.connected.load(Ordering::Acquire)
            && !self.closed.load(Ordering::Acquire)
            && self.error.lock().is_none()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Human-readable error, if one was recorded.
    pub fn error_string(&self) -> Option<String> {
        self.error.lock().as_ref().map(|e| e.to_string())
    }

    /// Ask the reactor to drain the outbound buffer. Call after filling
    /// it (and after releasing the write mutex).
    pub fn start_write(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if !self.write_armed.swap(true, Ordering::AcqRel) {
            if let Some(shared) = self.io.upgrade() {
                shared.send_command(Command::WriteInterest(self.token));
            }
        }
    }

    /// Tear the connection down: deregister and release the registry's
    /// reference. Idempotent; outstanding holders keep the object alive
    /// but no further events fire.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.io.upgrade() {
            shared.send_command(Command::Deregister(self.token));
        }
    }

    fn record_error(&self, e: io::Error) {
        log::debug!("[CONN] {:?}: {}", self.token, e);
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    // ---- reactor-side paths (poll thread) ----

    /// Writable readiness: finish a pending connect, or drain outbound.
    pub(crate) fn handle_writable(self: &Arc<Self>, shared: &Arc<IoShared>, handler: &Arc<dyn ConnHandler>) {
        if self.closed() {
            return;
        }
        if !self.connected.load(Ordering::Acquire) {
            self.finish_connect(shared, handler);
            return;
        }
        self.flush(shared);
    }

    /// Arm write interest and try an immediate drain (command path).
    pub(crate) fn arm_write(self: &Arc<Self>, shared: &Arc<IoShared>) {
        if self.closed() {
            return;
        }
        {
            let mut stream = self.stream.lock();
            if let Err(e) = shared.registry.reregister(
                &mut *stream,
                self.token,
                Interest::READABLE | Interest::WRITABLE,
            ) {
                drop(stream);
                self.record_error(e);
                self.close();
                return;
            }
        }
        if self.connected.load(Ordering::Acquire) {
            self.flush(shared);
        }
    }

    /// Drain the outbound buffer to the socket; drop write interest once
    /// empty.
    fn flush(self: &Arc<Self>, shared: &Arc<IoShared>) {
        let mut outbound = self.outbound.lock();
        let mut failed: Option<io::Error> = None;
        {
            let stream = self.stream.lock();
            while !outbound.is_empty() {
                match (&*stream).write(outbound.readable()) {
                    Ok(0) => {
                        failed = Some(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "write returned 0",
                        ));
                        break;
                    }
                    Ok(n) => outbound.consume(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        failed = Some(e);
                        break;
                    }
                }
            }
        }
        if let Some(e) = failed {
            drop(outbound);
            self.record_error(e);
            self.close();
            return;
        }

        // Drained. Clearing the flag under the outbound lock closes the
        // race with a worker that is about to call start_write.
        self.write_armed.store(false, Ordering::Release);
        let mut stream = self.stream.lock();
        if let Err(e) = shared
            .registry
            .reregister(&mut *stream, self.token, Interest::READABLE)
        {
            drop(stream);
            drop(outbound);
            self.record_error(e);
            self.close();
        }
    }

    fn finish_connect(self: &Arc<Self>, shared: &Arc<IoShared>, handler: &Arc<dyn ConnHandler>) {
        let outcome = {
            let stream = self.stream.lock();
            match stream.take_error() {
                Ok(Some(e)) | Err(e) => Err(e),
                Ok(None) => match stream.peer_addr() {
                    Ok(_) => Ok(()),
                    Err(e)
                        if e.kind() == io::ErrorKind::NotConnected
                            || e.kind() == io::ErrorKind::WouldBlock =>
                    {
                        // Still in flight; wait for the next edge.
                        return;
                    }
                    Err(e) => Err(e),
                },
            }
        };

        match outcome {
            Ok(()) => {
                self.connected.store(true, Ordering::Release);
                let interest = if self.write_armed.load(Ordering::Acquire) {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                let mut stream = self.stream.lock();
                if let Err(e) = shared.registry.reregister(&mut *stream, self.token, interest) {
                    drop(stream);
                    self.record_error(e);
                    self.close();
                }
            }
            Err(e) => {
                self.record_error(e);
                // Leave `connected` false: ok() reports the failure. The
                // handler gets its callback, then the entry goes away.
                self.close();
            }
        }

        let conn = self.clone();
        let handler = handler.clone();
        shared.pool.add_task(crate::io::task::Task::once(move || {
            handler.conn_done(&conn);
        }));
    }

    // ---- worker-side path ----

    /// Pull everything the socket has into the inbound buffer, then hand
    /// it to the handler. Runs on a pool worker per readable edge; the
    /// read gate keeps passes serial per connection.
    pub(crate) fn drive_read(conn: &Arc<Self>, handler: &Arc<dyn ConnHandler>) {
        let _gate = conn.read_gate.lock();
        // Nothing to read before a connect resolves (and nothing after
        // teardown).
        if conn.closed() || !conn.connected.load(Ordering::Acquire) {
            return;
        }

        let mut saw_eof = false;
        let mut got_bytes = false;
        let mut failed: Option<io::Error> = None;
        {
            let mut inbound = conn.inbound.lock();
            let stream = conn.stream.lock();
            loop {
                let region = inbound.write_region(READ_CHUNK);
                match (&*stream).read(region) {
                    Ok(0) => {
                        inbound.advance_write(READ_CHUNK, 0);
                        saw_eof = true;
                        break;
                    }
                    Ok(n) => {
                        inbound.advance_write(READ_CHUNK, n);
                        got_bytes = true;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        inbound.advance_write(READ_CHUNK, 0);
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                        inbound.advance_write(READ_CHUNK, 0);
                    }
                    Err(e) => {
                        inbound.advance_write(READ_CHUNK, 0);
                        failed = Some(e);
                        break;
                    }
                }
            }
        }

        if got_bytes && !handler.read_done(conn) {
            conn.close();
            return;
        }
        if saw_eof {
            conn.close();
        } else if let Some(e) = failed {
            conn.record_error(e);
            conn.close();
        }
    }

    /// Deregister the stream (poll thread, entry already removed).
    pub(crate) fn deregister(&self, shared: &Arc<IoShared>) {
        self.closed.store(true, Ordering::Release);
        let mut stream = self.stream.lock();
        if let Err(e) = shared.registry.deregister(&mut *stream) {
            log::debug!("[CONN] deregister {:?}: {}", self.token, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Connection logic is exercised end-to-end through the service tests;
    // what can be verified standalone is the state machine around close().

    #[test]
    fn test_close_is_idempotent_without_reactor() {
        // A connection whose IoShared is gone: close() must not panic.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let std_stream = std::net::TcpStream::connect(addr).unwrap();
        std_stream.set_nonblocking(true).unwrap();
        let stream = TcpStream::from_std(std_stream);

        let conn = Connection::new(stream, Token(9), Weak::new(), true);
        assert!(conn.ok());
        conn.close();
        conn.close();
        assert!(conn.closed());
        assert!(!conn.ok());
    }
}
