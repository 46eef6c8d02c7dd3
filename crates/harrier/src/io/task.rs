// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schedulable callbacks with once/many semantics.
//!
//! Every asynchronous continuation in the serving core is a `Task`. A
//! `Once` task owns its closure and consumes it on the single invocation;
//! a `Many` task shares its closure behind an `Arc`, so the registrar can
//! keep a clone and re-enqueue it (the accept path and benchmark-style
//! request loops do this).

use std::sync::Arc;

pub enum Task {
    /// Self-owning, runs exactly once.
    Once(Box<dyn FnOnce() + Send + 'static>),
    /// Caller-owned, reusable until the last clone is dropped.
    Many(Arc<dyn Fn() + Send + Sync + 'static>),
}

impl Task {
    pub fn once(f: impl FnOnce() + Send + 'static) -> Self {
        Self::Once(Box::new(f))
    }

    pub fn many(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Many(Arc::new(f))
    }

    /// Invoke. Consumes this handle either way; a `Many` task stays
    /// callable through its other clones.
    pub fn run(self) {
        match self {
            Self::Once(f) => f(),
            Self::Many(f) => f(),
        }
    }

    /// A re-enqueueable copy, if this is a `Many` task.
    pub fn try_clone(&self) -> Option<Task> {
        match self {
            Self::Once(_) => None,
            Self::Many(f) => Some(Self::Many(f.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_once_runs() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        Task::once(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .run();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_many_reruns_through_clones() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let task = Task::many(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let again = task.try_clone().unwrap();
        task.run();
        again.run();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_not_cloneable() {
        assert!(Task::once(|| {}).try_clone().is_none());
    }
}
