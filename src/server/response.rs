use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::request::HeaderVec;
use crate::error::ApiError;

/// Callback run once when the response is finalized.
pub type FinishHook = Box<dyn FnOnce(&ResponseWriter) + Send>;

/// Buffered response for one request.
///
/// The first terminal write (`json`, `empty`) marks the response as sent;
/// later writes are dropped and logged so a response is never written
/// twice. Headers may only change before the response is sent.
pub struct ResponseWriter {
    status: u16,
    headers: HeaderVec,
    body: Vec<u8>,
    sent: bool,
    writes: usize,
    dropped_writes: usize,
    hooks: Vec<FinishHook>,
    finished: bool,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Vec::new(),
            sent: false,
            writes: 0,
            dropped_writes: 0,
            hooks: Vec::new(),
            finished: false,
        }
    }

    /// `true` once a terminal write happened.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body parsed as JSON, `None` when empty or not JSON.
    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Number of terminal writes that reached the client buffer (0 or 1).
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Number of terminal writes dropped because the response was sent.
    #[must_use]
    pub fn dropped_writes(&self) -> usize {
        self.dropped_writes
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Get a header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header. Ignored once the response is sent.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        if self.sent {
            warn!(header = %name, "Header set after response was sent - ignored");
            return;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }

    /// Write a JSON body with `status`. Returns `false` if the response had
    /// already been sent and nothing was written.
    pub fn json(&mut self, status: u16, body: &Value) -> bool {
        self.write(status, "application/json", body.to_string().into_bytes())
    }

    /// Serialize `body` and write it as JSON.
    ///
    /// # Errors
    ///
    /// `500` when `body` cannot be serialized; nothing is written then.
    pub fn json_serialize<T: Serialize>(&mut self, status: u16, body: &T) -> Result<bool, ApiError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ApiError::internal("Response serialization failed").with_error(e.to_string()))?;
        Ok(self.write(status, "application/json", bytes))
    }

    /// Write a response with no body (e.g. `204`).
    pub fn empty(&mut self, status: u16) -> bool {
        if !self.claim(status) {
            return false;
        }
        self.body.clear();
        true
    }

    fn write(&mut self, status: u16, content_type: &str, bytes: Vec<u8>) -> bool {
        if !self.claim(status) {
            return false;
        }
        self.headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
        self.headers
            .push((Arc::from("Content-Type"), content_type.to_string()));
        self.body = bytes;
        true
    }

    fn claim(&mut self, status: u16) -> bool {
        if self.sent {
            self.dropped_writes += 1;
            warn!(
                first_status = self.status,
                dropped_status = status,
                "Response already sent - dropping second write"
            );
            return false;
        }
        self.sent = true;
        self.writes += 1;
        self.status = status;
        true
    }

    /// Register a hook to run when the response is finalized.
    pub fn on_finish(&mut self, hook: impl FnOnce(&ResponseWriter) + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Run completion hooks. Subsequent calls do nothing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let hooks = std::mem::take(&mut self.hooks);
        for hook in hooks {
            hook(self);
        }
    }

    /// Encode the response onto `out`: status line, headers, framing and
    /// body. `close` adds `Connection: close`.
    ///
    /// Header lines containing CR or LF are skipped. `1xx`, `204` and `304`
    /// responses carry no body and no `Content-Length`.
    pub fn write_to(&self, out: &mut BytesMut, close: bool) {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, status_reason(self.status));
        for (name, value) in &self.headers {
            if is_framing_header(name) {
                continue;
            }
            if has_line_break(name) || has_line_break(value) {
                warn!(header = %name, "Header with line break dropped");
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        let bodyless = self.status < 200 || self.status == 204 || self.status == 304;
        if !bodyless {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        if close {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");

        out.extend_from_slice(head.as_bytes());
        if !bodyless {
            out.extend_from_slice(&self.body);
        }
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains('\r') || s.contains('\n')
}

/// Headers the connection owns; values set by steps or handlers are ignored.
fn is_framing_header(name: &str) -> bool {
    ["content-length", "connection", "transfer-encoding"]
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &String::from_utf8_lossy(&self.body))
            .field("sent", &self.sent)
            .finish()
    }
}

pub(crate) fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}
