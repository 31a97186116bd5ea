//! Fully buffered HTTP responses and their HTTP/1.x wire encoding.
//!
//! Request caching persists the complete response (status line, headers,
//! body) so a hit can be reconstructed exactly. The body is always buffered,
//! so `Transfer-Encoding` is dropped and `Content-Length` reflects the
//! buffered body.

use crate::error::{CacheError, Result};
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Version};
use serde::de::DeserializeOwned;

/// An HTTP response whose body has been read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl CachedResponse {
    /// Build an HTTP/1.1 response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self::with_version(status, Version::HTTP_11, headers, body)
    }

    pub fn with_version(
        status: StatusCode,
        version: Version,
        mut headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        Self {
            status,
            version,
            headers,
            body,
        }
    }

    /// Read a live response to completion. The body is released afterwards.
    pub async fn from_response(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(Self::with_version(status, version, headers, body))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// `Content-Type` lowercased with parameters stripped, e.g. `application/json`.
    pub fn media_type(&self) -> Option<String> {
        let value = self.headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let media_type = value.split(';').next().unwrap_or_default().trim();
        Some(media_type.to_ascii_lowercase())
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Encode as an HTTP/1.x response message.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        out.extend_from_slice(version_str(self.version).as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.as_str().as_bytes());
        if let Some(reason) = self.status.canonical_reason() {
            out.push(b' ');
            out.extend_from_slice(reason.as_bytes());
        }
        out.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
                continue;
            }
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("content-length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Decode a message produced by [`to_wire`](Self::to_wire) (or any
    /// HTTP/1.x response with an identity-encoded body).
    pub fn from_wire(data: &[u8]) -> Result<Self> {
        let head_end = find(data, b"\r\n\r\n").ok_or_else(|| malformed("missing end of headers"))?;
        let head = &data[..head_end];
        let rest = &data[head_end + 4..];

        let mut lines = head.split(|&b| b == b'\n').map(trim_cr);
        let status_line = lines.next().ok_or_else(|| malformed("missing status line"))?;
        let (version, status) = parse_status_line(status_line)?;

        let mut headers = HeaderMap::new();
        for line in lines {
            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or_else(|| malformed("header line without ':'"))?;
            let name = HeaderName::from_bytes(trim(&line[..colon]))
                .map_err(|e| malformed(&format!("bad header name: {}", e)))?;
            let value = HeaderValue::from_bytes(trim(&line[colon + 1..]))
                .map_err(|e| malformed(&format!("bad header value: {}", e)))?;
            headers.append(name, value);
        }

        if headers.contains_key(header::TRANSFER_ENCODING) {
            return Err(malformed("transfer-encoded bodies are not supported"));
        }
        let body = match headers.get(header::CONTENT_LENGTH) {
            Some(value) => {
                let len: usize = value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .ok_or_else(|| malformed("bad content-length"))?;
                if rest.len() < len {
                    return Err(malformed(&format!(
                        "body truncated: expected {} bytes, found {}",
                        len,
                        rest.len()
                    )));
                }
                &rest[..len]
            }
            None => rest,
        };

        Ok(Self::with_version(
            status,
            version,
            headers,
            Bytes::copy_from_slice(body),
        ))
    }
}

fn malformed(message: &str) -> CacheError {
    CacheError::MalformedResponse {
        message: message.to_string(),
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

fn parse_status_line(line: &[u8]) -> Result<(Version, StatusCode)> {
    let line = std::str::from_utf8(line).map_err(|_| malformed("status line is not UTF-8"))?;
    let mut parts = line.splitn(3, ' ');
    let version = match parts.next() {
        Some("HTTP/0.9") => Version::HTTP_09,
        Some("HTTP/1.0") => Version::HTTP_10,
        Some("HTTP/1.1") => Version::HTTP_11,
        Some("HTTP/2") | Some("HTTP/2.0") => Version::HTTP_2,
        Some("HTTP/3") | Some("HTTP/3.0") => Version::HTTP_3,
        other => return Err(malformed(&format!("unknown protocol {:?}", other))),
    };
    let status = parts
        .next()
        .and_then(|code| StatusCode::from_bytes(code.as_bytes()).ok())
        .ok_or_else(|| malformed("bad status code"))?;
    Ok((version, status))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
