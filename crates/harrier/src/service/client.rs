// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client facility: issue requests on a managed connection and receive
//! responses, asynchronously or blocking.
//!
//! Both services speak the same wire shape, so they share this one
//! connection type. Response callbacks are a FIFO under the response
//! mutex: on a single connection, callbacks fire in `async_send` order.

use crate::http::{self, ParseStatus, Request, Response};
use crate::io::conn::{ConnHandler, Connection};
use crate::io::manager::ServiceManager;
use crate::sync::Notification;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::net::ToSocketAddrs;
use std::sync::{Arc, OnceLock, Weak};

/// Fired once with the parsed response to the matching `async_send`.
pub type ResponseCallback = Box<dyn FnOnce(Response) + Send + 'static>;

/// Fired once when a connect attempt resolves; check
/// [`ClientConnection::ok`] on the argument.
pub type ConnectCallback = Box<dyn FnOnce(Arc<ClientConnection>) + Send + 'static>;

pub struct ClientConnection {
    me: Weak<ClientConnection>,
    conn: OnceLock<Arc<Connection>>,
    connect_cb: Mutex<Option<ConnectCallback>>,
    response_cbs: Mutex<VecDeque<ResponseCallback>>,
}

impl ClientConnection {
    /// Start an asynchronous connect through `manager`'s reactor. The
    /// callback fires on a pool worker either way; errors detected before
    /// the attempt even starts are returned directly.
    pub fn connect(
        manager: &ServiceManager,
        host: &str,
        port: u16,
        callback: ConnectCallback,
    ) -> io::Result<Arc<Self>> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "host resolved to nothing"))?;

        let client = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            conn: OnceLock::new(),
            connect_cb: Mutex::new(Some(callback)),
            response_cbs: Mutex::new(VecDeque::new()),
        });

        let conn = manager
            .io_manager()
            .connect(addr, client.clone() as Arc<dyn ConnHandler>)?;
        // conn_done may already have run and set this; same target either
        // way.
        let _ = client.conn.set(conn);
        Ok(client)
    }

    /// Healthy: connected and not torn down.
    pub fn ok(&self) -> bool {
        self.conn.get().is_some_and(|c| c.ok())
    }

    pub fn error_string(&self) -> Option<String> {
        self.conn.get().and_then(|c| c.error_string())
    }

    /// Tear the connection down.
    pub fn close(&self) {
        if let Some(conn) = self.conn.get() {
            conn.close();
        }
    }

    /// Send `request`; `callback` fires with the response. The callback
    /// is enqueued before the bytes can hit the wire, so a fast server
    /// cannot answer into an empty queue; the request itself is
    /// serialized under the connection's write mutex.
    pub fn async_send(&self, request: &Request, callback: ResponseCallback) {
        let conn = match self.conn.get() {
            Some(conn) => conn.clone(),
            None => {
                log::error!("[CLIENT] async_send before connect resolved");
                return;
            }
        };
        {
            let mut cbs = self.response_cbs.lock();
            cbs.push_back(callback);
            let mut out = conn.outbound.lock();
            request.to_buffer(&mut out);
        }
        conn.start_write();
    }

    /// Blocking dual of [`async_send`](Self::async_send). Returns `None`
    /// if the connection died before a response arrived.
    ///
    /// Must not be called on a worker thread of the same manager: it
    /// parks on a [`Notification`] that only a worker can fire.
    pub fn send(&self, request: &Request) -> Option<Response> {
        let done = Arc::new(Notification::new());
        let slot: Arc<Mutex<Option<Response>>> = Arc::new(Mutex::new(None));
        {
            let done = done.clone();
            let slot = slot.clone();
            self.async_send(
                request,
                Box::new(move |response| {
                    *slot.lock() = Some(response);
                    done.notify();
                }),
            );
        }
        if !self.ok() {
            // Dead connection: the callback may never fire.
            return slot.lock().take();
        }
        done.wait();
        let response = slot.lock().take();
        response
    }
}

impl ConnHandler for ClientConnection {
    fn conn_done(&self, conn: &Arc<Connection>) {
        let _ = self.conn.set(conn.clone());
        if conn.ok() {
            log::debug!("[CLIENT] connected");
        } else {
            log::warn!(
                "[CLIENT] connect failed: {}",
                self.error_string().unwrap_or_else(|| "unknown".into())
            );
        }
        if let Some(callback) = self.connect_cb.lock().take() {
            if let Some(me) = self.me.upgrade() {
                callback(me);
            }
        }
    }

    fn read_done(&self, conn: &Arc<Connection>) -> bool {
        loop {
            let mut response = Response::new();
            let consumed = {
                let inbound = conn.inbound.lock();
                let mut cursor = inbound.cursor();
                match http::parse_response(&mut cursor, &mut response) {
                    Err(e) => {
                        log::error!("[CLIENT] malformed response: {}", e);
                        return false;
                    }
                    Ok(ParseStatus::Incomplete) => return true,
                    Ok(ParseStatus::Complete) => cursor.bytes_read(),
                }
            };
            conn.inbound.lock().consume(consumed);

            // One callback per response, in send order.
            let callback = self.response_cbs.lock().pop_front();
            match callback {
                Some(callback) => callback(response),
                None => log::warn!("[CLIENT] response with no caller waiting"),
            }
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        // Callbacks still queued will never fire; senders blocked in
        // send() hold an Arc, so they cannot reach this point.
        let waiting = self.response_cbs.lock().len();
        if waiting > 0 {
            log::debug!("[CLIENT] dropped with {} responses outstanding", waiting);
        }
    }
}

/// Blocking connect helper shared by the services' `connect` wrappers.
pub(crate) fn connect_blocking(
    manager: &ServiceManager,
    host: &str,
    port: u16,
) -> io::Result<Arc<ClientConnection>> {
    let done = Arc::new(Notification::new());
    let slot: Arc<Mutex<Option<Arc<ClientConnection>>>> = Arc::new(Mutex::new(None));
    {
        let done = done.clone();
        let slot = slot.clone();
        ClientConnection::connect(
            manager,
            host,
            port,
            Box::new(move |client| {
                *slot.lock() = Some(client);
                done.notify();
            }),
        )?;
    }
    done.wait();
    let client = slot.lock().take();
    client.ok_or_else(|| io::Error::other("connect callback lost"))
}
