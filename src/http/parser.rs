//! Parsing of HTTP/1.1 requests and responses out of a byte buffer.
//!
//! The input is whatever one non-blocking read produced; a conforming
//! message fits in it entirely (see the reactor's read-buffer contract).
//! The parser is tolerant the same way the wire tends to be: header lines
//! without a colon are skipped, header bytes are decoded lossily, and a
//! `Content-Length` that does not parse is treated as absent.

use thiserror::Error;

use crate::http::headers::Headers;
use crate::http::request::Request;
use crate::http::response::Response;

/// Errors from parsing a request or response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The request or status line does not have three tokens.
    #[error("malformed start line")]
    Malformed,
    /// The response status code is not an integer.
    #[error("invalid status code")]
    InvalidStatus,
    /// The buffered input is shorter than the declared Content-Length.
    #[error("body shorter than declared Content-Length")]
    Truncated,
}

/// Parses one HTTP request.
///
/// The request line must split on spaces into exactly `method`, `path`, and
/// `protocol`. Headers run until an empty line (or the end of the input).
/// The body is `Content-Length` bytes when that header is present and
/// parses; otherwise it is empty. `raw` is a copy of the input.
pub fn parse_request(data: &[u8]) -> Result<Request, ParseError> {
    let (head, body_region) = split_head(data);
    let head = String::from_utf8_lossy(head);
    let mut lines = head.split("\r\n");

    let start_line = lines.next().unwrap_or_default();
    let mut parts = start_line.splitn(3, ' ');
    let (method, path, protocol) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(protocol)) => (method, path, protocol),
        _ => return Err(ParseError::Malformed),
    };

    let headers = parse_header_lines(lines);
    let body = sized_body(&headers, body_region)?.unwrap_or_default();

    Ok(Request {
        method: method.to_string(),
        path: path.to_string(),
        protocol: protocol.to_string(),
        headers,
        body,
        raw: data.to_vec(),
    })
}

/// Parses one HTTP response.
///
/// The status line must split into `protocol`, `status_code`, and `reason`;
/// the reason is not retained. With a `Content-Length` header the body is
/// exactly that many bytes; without one it is the remainder of the input.
pub fn parse_response(data: &[u8]) -> Result<Response, ParseError> {
    let (head, body_region) = split_head(data);
    let head = String::from_utf8_lossy(head);
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let (_protocol, code, _reason) = match (parts.next(), parts.next(), parts.next()) {
        (Some(protocol), Some(code), Some(reason)) => (protocol, code, reason),
        _ => return Err(ParseError::Malformed),
    };

    let status_code: u16 = code.parse().map_err(|_| ParseError::InvalidStatus)?;

    let headers = parse_header_lines(lines);
    let body = match sized_body(&headers, body_region)? {
        Some(body) => body,
        None => body_region.to_vec(),
    };

    Ok(Response {
        status_code,
        headers,
        body,
        raw: data.to_vec(),
    })
}

/// Splits the buffer at the header/body separator. Input without a blank
/// line is treated as all head with an empty body region.
fn split_head(data: &[u8]) -> (&[u8], &[u8]) {
    match data.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => (&data[..pos], &data[pos + 4..]),
        None => (data, &[]),
    }
}

/// Parses header lines until an empty line. Lines without a colon are
/// silently skipped; names and values are whitespace-trimmed.
fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Headers {
    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        headers.set(name.trim(), value.trim());
    }
    headers
}

/// The body dictated by Content-Length, if that header is present and
/// parses as a non-negative integer. `Truncated` when the buffered input
/// holds fewer bytes than declared.
fn sized_body(headers: &Headers, body_region: &[u8]) -> Result<Option<Vec<u8>>, ParseError> {
    let Some(value) = headers.get("Content-Length") else {
        return Ok(None);
    };
    let Ok(length) = value.trim().parse::<usize>() else {
        // An unparseable length is treated as no declared body.
        return Ok(Some(Vec::new()));
    };
    if body_region.len() < length {
        return Err(ParseError::Truncated);
    }
    Ok(Some(body_region[..length].to_vec()))
}
