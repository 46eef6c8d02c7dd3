// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Console logger backing the `log` facade.
//!
//! The library itself only emits through `log` macros and never installs a
//! logger; the server binary (and tests that want output) install this one.
//! Messages go to stderr with a level prefix and the worker thread's name.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};

/// Minimal stderr logger with a static level filter.
pub struct ConsoleLogger {
    filter: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(filter: LevelFilter) -> Self {
        Self { filter }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("?");
        // A failed write to stderr leaves nowhere to report it.
        let _ = writeln!(
            io::stderr(),
            "{} [{}] {}",
            level_tag(record.level()),
            name,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// Install the console logger. Subsequent calls are ignored, which lets
/// every test call this without coordination.
pub fn init(filter: LevelFilter) {
    let logger = Box::new(ConsoleLogger::new(filter));
    if log::set_boxed_logger(logger).is_ok() {
        log::set_max_level(filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init(LevelFilter::Warn);
        init(LevelFilter::Debug);
        log::warn!("[TEST] logger installed");
    }

    #[test]
    fn test_level_tags() {
        assert_eq!(level_tag(Level::Error), "ERROR");
        assert_eq!(level_tag(Level::Trace), "TRACE");
    }
}
