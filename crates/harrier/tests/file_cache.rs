// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! File-cache bound, pinning, and failure-mode scenarios.

use harrier::cache::{CacheError, FileCache};
use std::fs::File;
use std::io::Write as _;
use std::sync::Arc;

fn temp_file(dir: &tempfile::TempDir, name: &str, len: usize) -> String {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    f.write_all(&vec![b'a'; len]).unwrap();
    path.to_str().unwrap().to_string()
}

/// Cache sized for exactly two of three files; X stays pinned.
#[test]
fn pinned_file_survives_eviction_pressure() {
    let dir = tempfile::tempdir().unwrap();
    let x = temp_file(&dir, "x.html", 500);
    let y = temp_file(&dir, "y.html", 500);
    let z = temp_file(&dir, "z.html", 500);
    let cache = FileCache::new(1000);

    let hx = cache.pin(&x).unwrap();
    let hy = cache.pin(&y).unwrap();
    drop(hy); // Y resident but unpinned

    match cache.pin(&z) {
        // Either Z succeeds by evicting Y...
        Ok(hz) => {
            assert!(cache.contains(&z));
            assert!(!cache.contains(&y));
            drop(hz);
        }
        // ...or it fails with the no-space error. Never both ways out.
        Err(CacheError::OverCapacity) => {
            assert!(cache.contains(&y));
        }
        Err(e) => panic!("unexpected error: {}", e),
    }

    // X was pinned throughout: never evicted, contents intact.
    assert!(cache.contains(&x));
    assert_eq!(hx.buffer().read_size(), 500);
    assert!(cache.bytes_used() <= cache.max_size());
    drop(hx);
}

#[test]
fn bytes_used_never_exceeds_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FileCache::new(2048);
    let paths: Vec<String> = (0..16)
        .map(|i| temp_file(&dir, &format!("f{}.html", i), 300))
        .collect();

    for path in &paths {
        match cache.pin(path) {
            Ok(handle) => {
                assert!(cache.bytes_used() <= cache.max_size());
                drop(handle);
            }
            Err(CacheError::OverCapacity) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert!(cache.bytes_used() <= cache.max_size());
    }
}

#[test]
fn counters_track_hits_and_failures() {
    let dir = tempfile::tempdir().unwrap();
    let a = temp_file(&dir, "a.html", 100);
    let cache = FileCache::new(150);

    let h1 = cache.pin(&a).unwrap();
    let h2 = cache.pin(&a).unwrap();
    assert_eq!(cache.pins(), 2);
    assert_eq!(cache.hits(), 1);

    // Too big while `a` is pinned.
    let b = temp_file(&dir, "b.html", 100);
    assert!(matches!(cache.pin(&b), Err(CacheError::OverCapacity)));
    assert_eq!(cache.failed(), 1);

    // Missing file carries the OS error, not a capacity failure.
    match cache.pin(dir.path().join("missing.html").to_str().unwrap()) {
        Err(CacheError::Io(e)) => assert!(e.raw_os_error().is_some()),
        other => panic!("expected Io error, got {:?}", other.map(|_| ())),
    }

    drop(h1);
    drop(h2);
}

/// Racing loaders of the same uncached file: losers adopt the winner's
/// buffer, the entry is loaded once, and every caller gets a valid pin.
#[test]
fn racing_loaders_converge_on_one_entry() {
    const THREADS: usize = 8;
    let dir = tempfile::tempdir().unwrap();
    let path = temp_file(&dir, "hot.html", 4096);
    let cache = Arc::new(FileCache::new(1 << 20));

    let barrier = Arc::new(std::sync::Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = cache.clone();
            let path = path.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let handle = cache.pin(&path).unwrap();
                assert_eq!(handle.buffer().read_size(), 4096);
                drop(handle);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // One resident copy, accounted once.
    assert_eq!(cache.bytes_used(), 4096);
    assert_eq!(cache.pins(), THREADS as u64);
}

#[test]
fn repinning_evicted_file_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let a = temp_file(&dir, "a.html", 600);
    let b = temp_file(&dir, "b.html", 600);
    let cache = FileCache::new(1000);

    drop(cache.pin(&a).unwrap());
    drop(cache.pin(&b).unwrap()); // evicts a
    assert!(!cache.contains(&a));

    let ha = cache.pin(&a).unwrap(); // miss path again
    assert_eq!(ha.buffer().read_size(), 600);
    assert!(cache.bytes_used() <= cache.max_size());
    drop(ha);
}
