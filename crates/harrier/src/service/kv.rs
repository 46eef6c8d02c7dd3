// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! KV service: GET-by-key against the lock-free split-ordered table.
//!
//! The address is a decimal unsigned 32-bit key. A hit answers 200 with
//! the decimal value; a miss answers 200 with `Content-Length: 0` and a
//! trailing explanatory line (historical wire shape - a pipelining client
//! must treat a miss as the last response on the connection). `quit` and
//! `stats` behave as on the HTTP service.
//!
//! The table starts empty; embedders and tests populate it through
//! [`table`](KvService::table).

use crate::http::{self, ParseStatus, Request};
use crate::io::conn::{ConnHandler, Connection};
use crate::io::manager::ServiceManager;
use crate::io::pool::WorkerPool;
use crate::service::client::{connect_blocking, ClientConnection, ConnectCallback};
use crate::service::write_response_head;
use crate::stats::RequestStats;
use crate::sync::SplitOrderedTable;
use mio::net::TcpStream;
use std::io;
use std::sync::{Arc, OnceLock};

pub struct KvService {
    manager: Arc<ServiceManager>,
    stats: RequestStats,
    table: SplitOrderedTable<u32>,
    port: OnceLock<u16>,
}

impl KvService {
    /// Start a listening KV service on `port` (0 picks one).
    pub fn new(port: u16, manager: &Arc<ServiceManager>) -> io::Result<Arc<Self>> {
        let service = Arc::new(Self {
            manager: manager.clone(),
            stats: RequestStats::new(manager.num_workers()),
            table: SplitOrderedTable::new(manager.num_workers()),
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

    pub fn port(&self) -> u16 {
        *self.port.get().unwrap_or(&0)
    }

    // Client side

    pub fn async_connect(&self, host: &str, port: u16, cb: ConnectCallback) -> io::Result<()> {
        if self.manager.stopped() {
            return Err(io::Error::other("service manager stopped"));
        }
        ClientConnection::connect(&self.manager, host, port, cb).map(|_| ())
    }

    pub fn connect(&self, host: &str, port: u16) -> io::Result<Arc<ClientConnection>> {
        if self.manager.stopped() {
            return Err(io::Error::other("service manager stopped"));
        }
        connect_blocking(&self.manager, host, port)
    }

    // accessors

    pub fn table(&self) -> &SplitOrderedTable<u32> {
        &self.table
    }

    pub fn stats(&self) -> &RequestStats {
        &self.stats
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
            log::error!("[KV] cannot register connection: {}", e);
        }
    }

    fn handle_request(&self, conn: &Arc<Connection>, request: &Request) -> bool {
        if request.address == "quit" {
            log::info!("[KV] stop requested over the wire");
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

        // Non-numeric addresses are simply misses.
        let value = request
            .address
            .parse::<u32>()
            .ok()
            .and_then(|key| self.table.lookup(WorkerPool::me(), key));

        match value {
            Some(value) => {
                let body = value.to_string();
                let mut out = conn.outbound.lock();
                write_response_head(&mut out, 200, "OK", body.len());
                out.write_str(&body);
            }
            None => {
                let mut out = conn.outbound.lock();
                write_response_head(&mut out, 200, "OK", 0);
                out.write_str("value corresponding to the key not found\r\n");
            }
        }

        self.stats
            .finished_request(WorkerPool::me(), self.manager.clock().now());
        conn.start_write();
        true
    }
}

impl ConnHandler for KvService {
    fn read_done(&self, conn: &Arc<Connection>) -> bool {
        loop {
            let mut request = Request::new();
            let consumed = {
                let inbound = conn.inbound.lock();
                let mut cursor = inbound.cursor();
                match http::parse_request(&mut cursor, &mut request) {
                    Err(e) => {
                        log::error!("[KV] malformed request: {}", e);
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
