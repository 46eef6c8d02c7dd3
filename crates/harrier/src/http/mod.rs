// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP-shaped wire protocol: message model, fragment-tolerant parser,
//! and date-header rendering.
//!
//! The protocol is HTTP/1.1-shaped but deliberately small: no chunked
//! transfer, no keep-alive negotiation; a connection carries serially
//! pipelined messages until either side closes.

pub mod date;
pub mod message;
pub mod parser;

pub use message::{Request, Response};
pub use parser::{parse_request, parse_response, ParseError, ParseStatus};
