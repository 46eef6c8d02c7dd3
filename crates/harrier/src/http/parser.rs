// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fragment-tolerant parser for the HTTP-shaped protocol.
//!
//! Both entry points work off a [`Cursor`] and report one of three
//! outcomes: `Ok(Complete)` with the cursor left just past one full
//! message, `Ok(Incomplete)` when more bytes are needed (the caller keeps
//! the buffered bytes and retries after the next read), or
//! `Err(ParseError)` for input that can never become a valid message.
//!
//! Requests are header-only (GET-shaped; a `Content-Length` body is
//! accepted and skipped). Responses carry bodies sized by
//! `Content-Length`, defaulting to zero.

use crate::buffer::Cursor;
use crate::http::{Request, Response};
use std::fmt;

/// Outcome of a parse attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// One complete message was consumed; `cursor.bytes_read()` bytes of
    /// input are used up.
    Complete,
    /// The buffered bytes are a valid prefix; read more and retry.
    Incomplete,
}

/// Input that can never become a valid message.
#[derive(Debug)]
pub enum ParseError {
    /// Request or status line is not three space-separated fields, or the
    /// status code is not numeric.
    BadStartLine(String),
    /// A header line has no colon.
    BadHeader(String),
    /// `Content-Length` is not a number.
    BadContentLength(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStartLine(line) => write!(f, "malformed start line: {:?}", line),
            Self::BadHeader(line) => write!(f, "malformed header: {:?}", line),
            Self::BadContentLength(v) => write!(f, "bad Content-Length: {:?}", v),
        }
    }
}

impl std::error::Error for ParseError {}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse headers up to and including the blank line. Returns the body
/// length from `Content-Length` (0 if absent), or `Ok(None)` when the
/// blank line is not buffered yet.
fn parse_headers(
    cur: &mut Cursor<'_>,
    headers: &mut Vec<(String, String)>,
) -> Result<Option<usize>, ParseError> {
    let mut content_length = 0usize;
    loop {
        let line = match cur.read_line() {
            Some(line) => line,
            None => return Ok(None),
        };
        if line.is_empty() {
            return Ok(Some(content_length));
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| ParseError::BadHeader(latin1(line)))?;
        let name = latin1(&line[..colon]);
        let value = latin1(&line[colon + 1..]).trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .parse::<usize>()
                .map_err(|_| ParseError::BadContentLength(value.clone()))?;
        }
        headers.push((name, value));
    }
}

/// Parse one request from `cur` into `req`.
pub fn parse_request(cur: &mut Cursor<'_>, req: &mut Request) -> Result<ParseStatus, ParseError> {
    let start = match cur.read_line() {
        Some(line) => line,
        None => return Ok(ParseStatus::Incomplete),
    };
    let text = latin1(start);
    let fields: Vec<&str> = text.split_whitespace().collect();
    let (method, target, version) = match fields.as_slice() {
        [m, t, v] => (*m, *t, *v),
        _ => return Err(ParseError::BadStartLine(text.clone())),
    };
    req.method = method.to_string();
    // Strip one leading slash only: "//etc/x" addresses the absolute
    // path "/etc/x".
    req.address = target.strip_prefix('/').unwrap_or(target).to_string();
    req.version = version.to_string();

    let body_len = match parse_headers(cur, &mut req.headers)? {
        Some(n) => n,
        None => return Ok(ParseStatus::Incomplete),
    };
    match cur.read_exact(body_len) {
        Some(body) => {
            req.body = body.to_vec();
            Ok(ParseStatus::Complete)
        }
        None => Ok(ParseStatus::Incomplete),
    }
}

/// Parse one response from `cur` into `resp`.
pub fn parse_response(cur: &mut Cursor<'_>, resp: &mut Response) -> Result<ParseStatus, ParseError> {
    let start = match cur.read_line() {
        Some(line) => line,
        None => return Ok(ParseStatus::Incomplete),
    };
    let text = latin1(start);
    let mut fields = text.splitn(3, ' ');
    let (version, code) = match (fields.next(), fields.next()) {
        (Some(v), Some(c)) if !v.is_empty() && !c.is_empty() => (v, c),
        _ => return Err(ParseError::BadStartLine(text.clone())),
    };
    resp.version = version.to_string();
    resp.status = code
        .parse::<u16>()
        .map_err(|_| ParseError::BadStartLine(text.clone()))?;
    resp.reason = fields.next().unwrap_or("").to_string();

    let body_len = match parse_headers(cur, &mut resp.headers)? {
        Some(n) => n,
        None => return Ok(ParseStatus::Incomplete),
    };
    match cur.read_exact(body_len) {
        Some(body) => {
            resp.body = body.to_vec();
            Ok(ParseStatus::Complete)
        }
        None => Ok(ParseStatus::Incomplete),
    }
}
