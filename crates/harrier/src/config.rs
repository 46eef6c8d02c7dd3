// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration - single source of truth for tunables.
//!
//! Every threshold and geometry constant of the serving core lives here.
//! **Never hardcode these elsewhere!**

use std::time::Duration;

// =======================================================================
// Worker pool / reactor
// =======================================================================

/// Default poll timeout when no timer is pending.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum ready events drained per poll iteration.
pub const MAX_EVENTS: usize = 128;

/// Socket read chunk appended to a connection's inbound buffer per
/// `read()` call. Reads loop until `WouldBlock`, so this only bounds the
/// copy granularity, not throughput.
pub const READ_CHUNK: usize = 4096;

// =======================================================================
// Hazard pointers / lock-free structures
// =======================================================================

/// Hazard slots per thread. Slot 0 protects the node being visited,
/// slot 1 its predecessor (the list search rotates the two).
pub const HAZARDS_PER_THREAD: usize = 2;

/// Retired-list length above which a reclamation scan is triggered.
pub const MAX_RETIRED_PER_THREAD: usize = 10;

/// Bucket heads per lazily-allocated segment of the split-ordered table.
pub const SEGMENT_SIZE: usize = 10_000;

/// Number of segment slots (total bucket capacity is
/// `SEGMENT_COUNT * SEGMENT_SIZE`).
pub const SEGMENT_COUNT: usize = 10_000;

/// Initial number of buckets in the split-ordered table.
pub const INITIAL_BUCKETS: usize = 10_000;

/// Average entries per bucket above which the bucket count doubles.
pub const MAX_LOAD: usize = 10;

// =======================================================================
// File cache / stats / services
// =======================================================================

/// Default file-cache capacity in bytes (50 MiB).
pub const CACHE_MAX_BYTES: usize = 50 << 20;

/// Slots in the per-worker request-rate ring. 20 slots of 50 ms span the
/// trailing second.
pub const STATS_SLOTS: usize = 20;

/// `Server:` header value stamped on every response.
pub const SERVER_NAME: &str = "harrier/0.3";

/// Document served when the request path is empty.
pub const INDEX_DOCUMENT: &str = "index.html";
