// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP file service: documents come from disk through the pinning
//! cache.
//!
//! Routing, per request address (leading slash already stripped):
//! - `quit`  - request a service-wide stop; the connection closes without
//!   a response.
//! - `stats` - 200 whose body is the decimal count of requests completed
//!   in the trailing second.
//! - empty   - rewritten to `index.html`.
//! - other   - pin the file; 200 with the cached bytes, or 503 when the
//!   file cannot be loaded or the cache cannot make room. (No 404/500
//!   distinction; the cache does not say which failure it was beyond the
//!   errno.)

use crate::cache::{CacheError, FileCache};
use crate::config::{CACHE_MAX_BYTES, INDEX_DOCUMENT};
use crate::http::{self, ParseStatus, Request};
use crate::io::conn::{ConnHandler, Connection};
use crate::io::manager::ServiceManager;
use crate::io::pool::WorkerPool;
use crate::service::client::{connect_blocking, ClientConnection, ConnectCallback};
use crate::service::write_response_head;
use crate::stats::RequestStats;
use mio::net::TcpStream;
use std::io;
use std::sync::{Arc, OnceLock};

pub struct HttpService {
    manager: Arc<ServiceManager>,
    stats: RequestStats,
    cache: FileCache,
    port: OnceLock<u16>,
}

impl HttpService {
    /// Start a listening HTTP service on `port` (0 picks one; see
    /// [`port`](Self::port)).
    pub fn new(port: u16, manager: &Arc<ServiceManager>) -> io::Result<Arc<Self>> {
        Self::with_cache_size(port, manager, CACHE_MAX_BYTES)
    }

    /// As [`new`](Self::new) with an explicit cache capacity (tests).
    pub fn with_cache_size(
        port: u16,
        manager: &Arc<ServiceManager>,
        cache_bytes: usize,
    ) -> io::Result<Arc<Self>> {
        let service = Arc::new(Self {
            manager: manager.clone(),
            stats: RequestStats::new(manager.num_workers()),
            cache: FileCache::new(cache_bytes),
            port: OnceLock::new(),
        });
        let weak = Arc::downgrade(&service);
        let bound = manager.register_acceptor(
            port,
            Arc::new(move |stream| {
                if let Some(service) = weak.upgrade() {
                    service.accept_connection(stream);
                }
            }),
        )?;
        let _ = service.port.set(bound);
        Ok(service)
    }

    /// The bound port.
    pub fn port(&self) -> u16 {
        *self.port.get().unwrap_or(&0)
    }

    // Client side

    /// Connect to `host:port` and hand the resulting attempt to `cb`.
    pub fn async_connect(&self, host: &str, port: u16, cb: ConnectCallback) -> io::Result<()> {
        if self.manager.stopped() {
            return Err(io::Error::other("service manager stopped"));
        }
        ClientConnection::connect(&self.manager, host, port, cb).map(|_| ())
    }

    /// Synchronous dual of [`async_connect`](Self::async_connect).
    pub fn connect(&self, host: &str, port: u16) -> io::Result<Arc<ClientConnection>> {
        if self.manager.stopped() {
            return Err(io::Error::other("service manager stopped"));
        }
        connect_blocking(&self.manager, host, port)
    }

    // accessors

    pub fn stats(&self) -> &RequestStats {
        &self.stats
    }

    pub fn file_cache(&self) -> &FileCache {
        &self.cache
    }

    pub fn service_manager(&self) -> &Arc<ServiceManager> {
        &self.manager
    }

    fn accept_connection(self: &Arc<Self>, stream: TcpStream) {
        if self.manager.stopped() {
            return;
        }
        let handler = self.clone() as Arc<dyn ConnHandler>;
        if let Err(e) = self.manager.io_manager().register_connection(stream, handler) {
            log::error!("[HTTP] cannot register connection: {}", e);
        }
    }

    fn handle_request(&self, conn: &Arc<Connection>, request: &Request) -> bool {
        if request.address == "quit" {
            log::info!("[HTTP] stop requested over the wire");
            self.manager.request_stop();
            return false;
        }

        if request.address == "stats" {
            let reqs = self.stats.reqs_last_sec(self.manager.clock().now());
            let body = reqs.to_string();
            {
                let mut out = conn.outbound.lock();
                write_response_head(&mut out, 200, "OK", body.len());
                out.write_str(&body);
            }
            conn.start_write();
            return true;
        }

        let address = if request.address.is_empty() {
            INDEX_DOCUMENT
        } else {
            request.address.as_str()
        };

        match self.cache.pin(address) {
            Ok(handle) => {
                let mut out = conn.outbound.lock();
                write_response_head(&mut out, 200, "OK", handle.buffer().read_size());
                out.copy_from(handle.buffer());
                // Handle drops here: the copy is done, the pin releases.
            }
            Err(e) => {
                match &e {
                    CacheError::Io(io_err) => {
                        log::warn!("[HTTP] cannot serve {}: {}", address, io_err);
                    }
                    CacheError::OverCapacity => {
                        log::warn!("[HTTP] cache full serving {}", address);
                    }
                }
                let body = "<HTML>\r\n<HEAD><TITLE>503 Service Unavailable</TITLE></HEAD>\r\n\
                            <BODY>Service Unavailable</BODY>\r\n</HTML>\r\n";
                let mut out = conn.outbound.lock();
                write_response_head(&mut out, 503, "Service Unavailable", body.len());
                out.write_str(body);
            }
        }

        self.stats
            .finished_request(WorkerPool::me(), self.manager.clock().now());
        conn.start_write();
        true
    }
}

impl ConnHandler for HttpService {
    /// Parse and answer as many complete requests as the inbound buffer
    /// holds.
    fn read_done(&self, conn: &Arc<Connection>) -> bool {
        loop {
            let mut request = Request::new();
            let consumed = {
                let inbound = conn.inbound.lock();
                let mut cursor = inbound.cursor();
                match http::parse_request(&mut cursor, &mut request) {
                    Err(e) => {
                        log::error!("[HTTP] malformed request: {}", e);
                        return false;
                    }
                    Ok(ParseStatus::Incomplete) => return true,
                    Ok(ParseStatus::Complete) => cursor.bytes_read(),
                }
            };
            conn.inbound.lock().consume(consumed);
            if !self.handle_request(conn, &request) {
                return false;
            }
        }
    }
}
