// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Harrier - multi-threaded serving core with lock-free storage
//!
//! A small network service built from four tightly-coupled concurrency
//! subsystems:
//!
//! 1. a **service manager** - mio-driven I/O reactor plus a fixed worker
//!    pool with stable thread ids - owning sockets and scheduling every
//!    callback;
//! 2. **hazard-pointer** safe memory reclamation backing the lock-free
//!    structures;
//! 3. a **lock-free ordered list** and the **split-ordered hash table**
//!    built on it, serving as the KV store;
//! 4. a **bounded pinning file cache** with reader-writer concurrency,
//!    serving as the HTTP document store.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use harrier::io::ServiceManager;
//! use harrier::service::{HttpService, KvService};
//! use std::sync::Arc;
//!
//! fn main() -> std::io::Result<()> {
//!     let manager = Arc::new(ServiceManager::new(4)?);
//!     let _http = HttpService::new(8080, &manager)?;
//!     let kv = KvService::new(8081, &manager)?;
//!     kv.table().insert(0, 42, 4242);
//!     manager.run(); // until GET /quit
//!     Ok(())
//! }
//! ```
//!
//! ## Data flow
//!
//! ```text
//! listening socket -> acceptor -> connection registered with reactor
//!   -> readable edge -> worker parses inbound bytes
//!   -> route by path: file cache pin (HTTP) | table lookup (KV)
//!   -> response into outbound buffer (write mutex)
//!   -> writable edge -> reactor drains -> EOF retires the connection
//! ```

/// Byte buffer + parse cursor.
pub mod buffer;
/// Bounded pinning file cache.
pub mod cache;
/// Injectable tick clock.
pub mod clock;
/// Tunables - single source of truth.
pub mod config;
/// HTTP-shaped messages, parser, date rendering.
pub mod http;
/// Reactor, worker pool, connections, acceptors, service manager.
pub mod io;
/// Console logger for the `log` facade.
pub mod logging;
/// HTTP and KV services plus the client facility.
pub mod service;
/// Per-worker request-rate ring.
pub mod stats;
/// Hazard pointers, lock-free list/table, and auxiliary primitives.
pub mod sync;

pub use buffer::Buffer;
pub use cache::{CacheError, CacheHandle, FileCache};
pub use clock::{Clock, ManualClock, MonotonicClock, Ticks, TICKS_PER_SEC};
pub use io::{IoManager, ServiceManager, Task, WorkerPool};
pub use service::{ClientConnection, HttpService, KvService};
pub use stats::RequestStats;
pub use sync::{LockFreeList, SplitOrderedTable};
