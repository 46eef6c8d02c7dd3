// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded pinning file cache.
//!
//! Maps file names to their loaded contents; the sum of cached buffers
//! never exceeds the capacity fixed at construction. A hit is cheap: a
//! read lock on the map plus an atomic pin increment. A miss loads the
//! file with *no* cache lock held, then takes the write lock to evict
//! unpinned entries (map order, no better policy) until the new buffer
//! fits - or fails if the unpinned space cannot cover it.
//!
//! A [`CacheHandle`] is a pin: while any handle to an entry lives, that
//! entry will not be evicted. Dropping the handle unpins.

use crate::buffer::Buffer;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Why a pin failed.
#[derive(Debug)]
pub enum CacheError {
    /// The file could not be opened or read; carries the OS error.
    Io(io::Error),
    /// The file loaded, but the cache cannot make room: every resident
    /// byte is pinned.
    OverCapacity,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cache load failed: {}", e),
            Self::OverCapacity => write!(f, "cache full of pinned entries"),
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::OverCapacity => None,
        }
    }
}

/// A cached file: interned name, immutable contents, pin count.
pub struct CacheNode {
    name: Arc<str>,
    buf: Buffer,
    pins: AtomicU32,
}

/// RAII pin on a cache entry. Exposes the cached bytes; dropping unpins.
pub struct CacheHandle {
    node: Arc<CacheNode>,
}

impl CacheHandle {
    /// The cached file contents.
    pub fn buffer(&self) -> &Buffer {
        &self.node.buf
    }

    /// The interned file name.
    pub fn name(&self) -> &str {
        &self.node.name
    }
}

impl Drop for CacheHandle {
    fn drop(&mut self) {
        let previous = self.node.pins.fetch_sub(1, Ordering::AcqRel);
        // A handle IS a pin; hitting zero here means the accounting is
        // broken somewhere, which we refuse to run past.
        if previous == 0 {
            log::error!("[CACHE] unpin of {} below zero", self.node.name);
            panic!("cache pin count underflow");
        }
    }
}

/// The cache proper.
pub struct FileCache {
    max_size: usize,
    map: RwLock<HashMap<Arc<str>, Arc<CacheNode>>>,
    bytes_used: AtomicUsize,
    num_pins: AtomicU64,
    num_hits: AtomicU64,
    num_failed: AtomicU64,
}

impl FileCache {
    /// Cache bounded to `max_size` bytes of file contents.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            map: RwLock::new(HashMap::new()),
            bytes_used: AtomicUsize::new(0),
            num_pins: AtomicU64::new(0),
            num_hits: AtomicU64::new(0),
            num_failed: AtomicU64::new(0),
        }
    }

    /// Pin `file_name`, loading it on a miss. The returned handle keeps
    /// the entry resident until dropped.
    pub fn pin(&self, file_name: &str) -> Result<CacheHandle, CacheError> {
        self.num_pins.fetch_add(1, Ordering::AcqRel);

        // Fast path: read lock + atomic pin bump.
        {
            let map = self.map.read();
            if let Some(node) = map.get(file_name) {
                self.num_hits.fetch_add(1, Ordering::AcqRel);
                node.pins.fetch_add(1, Ordering::AcqRel);
                return Ok(CacheHandle { node: node.clone() });
            }
        }

        // Miss: load with no cache lock held.
        let buf = match load_file(file_name) {
            Ok(buf) => buf,
            Err(e) => {
                log::warn!("[CACHE] could not load {}: {}", file_name, e);
                return Err(CacheError::Io(e));
            }
        };
        let file_size = buf.read_size();

        let mut map = self.map.write();

        // Raced another loader? Adopt the winner's node; our buffer is
        // discarded on return.
        if let Some(node) = map.get(file_name) {
            self.num_hits.fetch_add(1, Ordering::AcqRel);
            node.pins.fetch_add(1, Ordering::AcqRel);
            return Ok(CacheHandle { node: node.clone() });
        }

        // Evict unpinned entries in map order until the new buffer fits
        // or nothing evictable remains.
        while self.bytes_used.load(Ordering::Acquire) + file_size > self.max_size {
            let victim = map
                .iter()
                .find(|(_, node)| node.pins.load(Ordering::Acquire) == 0)
                .map(|(name, _)| name.clone());
            match victim {
                Some(name) => {
                    if let Some(node) = map.remove(&name) {
                        self.bytes_used
                            .fetch_sub(node.buf.read_size(), Ordering::AcqRel);
                        log::debug!("[CACHE] evicted {} ({} bytes)", name, node.buf.read_size());
                    }
                }
                None => break,
            }
        }

        if self.bytes_used.load(Ordering::Acquire) + file_size > self.max_size {
            self.num_failed.fetch_add(1, Ordering::AcqRel);
            log::debug!(
                "[CACHE] no unpinned space for {} ({} bytes)",
                file_name,
                file_size
            );
            return Err(CacheError::OverCapacity);
        }

        let name: Arc<str> = Arc::from(file_name);
        let node = Arc::new(CacheNode {
            name: name.clone(),
            buf,
            pins: AtomicU32::new(1),
        });
        map.insert(name, node.clone());
        self.bytes_used.fetch_add(file_size, Ordering::AcqRel);
        Ok(CacheHandle { node })
    }

    // accessors

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes_used.load(Ordering::Acquire)
    }

    pub fn pins(&self) -> u64 {
        self.num_pins.load(Ordering::Acquire)
    }

    pub fn hits(&self) -> u64 {
        self.num_hits.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u64 {
        self.num_failed.load(Ordering::Acquire)
    }

    /// True if `file_name` is resident (tests).
    pub fn contains(&self, file_name: &str) -> bool {
        self.map.read().contains_key(file_name)
    }
}

/// Read a whole file into a fresh buffer.
fn load_file(file_name: &str) -> io::Result<Buffer> {
    let mut file = File::open(file_name)?;
    let expected = file.metadata()?.len() as usize;
    let mut buf = Buffer::new();
    let mut total = 0usize;
    loop {
        let region = buf.write_region(crate::config::READ_CHUNK);
        let n = file.read(region)?;
        buf.advance_write(crate::config::READ_CHUNK, n);
        if n == 0 {
            break;
        }
        total += n;
    }
    if total != expected {
        log::warn!(
            "[CACHE] {} changed while reading ({} vs {} bytes)",
            file_name,
            total,
            expected
        );
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_file(dir: &tempfile::TempDir, name: &str, len: usize) -> String {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![b'x'; len]).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_hit_after_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir, "a.html", 100);
        let cache = FileCache::new(1024);

        let h1 = cache.pin(&path).unwrap();
        assert_eq!(h1.buffer().read_size(), 100);
        assert_eq!(cache.hits(), 0);

        let h2 = cache.pin(&path).unwrap();
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.pins(), 2);
        assert_eq!(cache.bytes_used(), 100);
        drop(h1);
        drop(h2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let cache = FileCache::new(1024);
        match cache.pin("/definitely/not/here.html") {
            Err(CacheError::Io(e)) => assert!(e.raw_os_error().is_some()),
            other => panic!("expected Io error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_eviction_frees_unpinned() {
        let dir = tempfile::tempdir().unwrap();
        let a = temp_file(&dir, "a", 400);
        let b = temp_file(&dir, "b", 400);
        let c = temp_file(&dir, "c", 400);
        let cache = FileCache::new(800);

        drop(cache.pin(&a).unwrap());
        drop(cache.pin(&b).unwrap());
        assert_eq!(cache.bytes_used(), 800);

        // Everything unpinned: c displaces someone.
        let hc = cache.pin(&c).unwrap();
        assert!(cache.bytes_used() <= cache.max_size());
        assert!(cache.contains(&c));
        drop(hc);
    }

    #[test]
    fn test_pinned_never_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let a = temp_file(&dir, "a", 400);
        let b = temp_file(&dir, "b", 400);
        let c = temp_file(&dir, "c", 400);
        let cache = FileCache::new(800);

        let ha = cache.pin(&a).unwrap();
        drop(cache.pin(&b).unwrap());

        match cache.pin(&c) {
            Ok(hc) => {
                // b was the only evictable entry.
                assert!(cache.contains(&a));
                assert!(!cache.contains(&b));
                drop(hc);
            }
            Err(CacheError::OverCapacity) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert!(cache.contains(&a));
        assert_eq!(ha.buffer().read_size(), 400);
        assert!(cache.bytes_used() <= cache.max_size());
        drop(ha);
    }

    #[test]
    fn test_over_capacity_when_all_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let a = temp_file(&dir, "a", 600);
        let b = temp_file(&dir, "b", 600);
        let cache = FileCache::new(1000);

        let ha = cache.pin(&a).unwrap();
        match cache.pin(&b) {
            Err(CacheError::OverCapacity) => {}
            other => panic!("expected OverCapacity, got {:?}", other.map(|_| ())),
        }
        assert_eq!(cache.failed(), 1);
        drop(ha);
    }
}
