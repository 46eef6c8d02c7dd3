// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The protocols served on top of the service manager: an HTTP file
//! service backed by the pinning cache, a KV service backed by the
//! split-ordered table, and the client facility both share.
//!
//! Both services understand two special documents: `GET /quit` requests a
//! service-wide stop (the response may never make it out), and
//! `GET /stats` answers with the number of requests completed in the
//! trailing second.

pub mod client;
pub mod http;
pub mod kv;

pub use client::{ClientConnection, ConnectCallback, ResponseCallback};
pub use http::HttpService;
pub use kv::KvService;

use crate::buffer::Buffer;
use crate::config::SERVER_NAME;
use crate::http::date::http_date;
use std::time::SystemTime;

/// Write a response head: status line plus the standard header set
/// (`Date`, `Server`, `Accept-Ranges`, `Content-Length`, `Content-Type`)
/// and the blank line. The caller appends exactly `content_length` body
/// bytes after this (the KV miss path deliberately appends a trailing
/// explanatory line on top of a zero-length body).
pub(crate) fn write_response_head(
    out: &mut Buffer,
    status: u16,
    reason: &str,
    content_length: usize,
) {
    out.write_str(&format!("HTTP/1.1 {} {}\r\n", status, reason));
    out.write_str(&format!("Date: {}\r\n", http_date(SystemTime::now())));
    out.write_str(&format!("Server: {}\r\n", SERVER_NAME));
    out.write_str("Accept-Ranges: bytes\r\n");
    out.write_str(&format!("Content-Length: {}\r\n", content_length));
    out.write_str("Content-Type: text/html\r\n");
    out.write_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_head_shape() {
        let mut out = Buffer::new();
        write_response_head(&mut out, 200, "OK", 3);
        let text = String::from_utf8(out.readable().to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("\r\nDate: "));
        assert!(text.contains("\r\nServer: "));
        assert!(text.contains("\r\nAccept-Ranges: bytes\r\n"));
        assert!(text.contains("\r\nContent-Length: 3\r\n"));
        assert!(text.contains("\r\nContent-Type: text/html\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
