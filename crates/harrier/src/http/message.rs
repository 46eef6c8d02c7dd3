// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request and response messages.

use crate::buffer::Buffer;

/// A parsed request. `address` is the path with the leading slash
/// stripped, so routing compares against bare names ("stats", "quit",
/// "index.html", a decimal key).
#[derive(Debug, Default, Clone)]
pub struct Request {
    pub method: String,
    pub address: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// A GET for `address` (one leading slash is stripped, mirroring the
    /// parser).
    pub fn get(address: &str) -> Self {
        Self {
            method: "GET".to_string(),
            address: address.strip_prefix('/').unwrap_or(address).to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.method.clear();
        self.address.clear();
        self.version.clear();
        self.headers.clear();
        self.body.clear();
    }

    /// Serialize onto the wire. The request line re-adds the leading
    /// slash the parser strips.
    pub fn to_buffer(&self, out: &mut Buffer) {
        out.write_str(&self.method);
        out.write(b" /");
        out.write_str(&self.address);
        out.write(b" ");
        out.write_str(&self.version);
        out.write(b"\r\n");
        for (name, value) in &self.headers {
            out.write_str(name);
            out.write(b": ");
            out.write_str(value);
            out.write(b"\r\n");
        }
        out.write(b"\r\n");
        out.write(&self.body);
    }
}

/// A parsed response.
#[derive(Debug, Default, Clone)]
pub struct Response {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// First header value with the given name, ASCII case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_to_buffer() {
        let mut req = Request::get("/stats");
        req.headers
            .push(("Host".to_string(), "localhost".to_string()));
        let mut out = Buffer::new();
        req.to_buffer(&mut out);
        assert_eq!(
            out.readable(),
            b"GET /stats HTTP/1.1\r\nHost: localhost\r\n\r\n" as &[u8]
        );
    }

    #[test]
    fn test_get_strips_leading_slash() {
        assert_eq!(Request::get("/index.html").address, "index.html");
        assert_eq!(Request::get("quit").address, "quit");
        assert_eq!(Request::get("/").address, "");
    }

    #[test]
    fn test_response_header_lookup() {
        let mut resp = Response::new();
        resp.headers
            .push(("Content-Length".to_string(), "3".to_string()));
        assert_eq!(resp.header("content-length"), Some("3"));
        assert_eq!(resp.header("server"), None);
    }
}
