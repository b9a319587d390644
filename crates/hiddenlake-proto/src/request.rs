//! Length-prefixed request codec.
//!
//! A request names a service behind a remote node (`host`), an HTTP method
//! and path on that service, a header map and a body. It travels inside a
//! payload body, so the total encoded size is bounded by the network's
//! payload limit — the per-field prefixes below exist to bound parsing, not
//! to express large messages.
//!
//! ```text
//! [len u8][method] [len u16][host] [len u16][path]
//! [count u16] { [len u16][key] [len u16][value] }*
//! [len u32][body]
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{
    codec::{Reader, check_width},
    errors::Result,
};

/// A service request carried over the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method forwarded to the local service.
    pub method: String,
    /// Logical service name, resolved by the receiving node.
    pub host: String,
    /// Path on the resolved service.
    pub path: String,
    /// Header map. Ordered so encoding is deterministic.
    pub head: BTreeMap<String, String>,
    /// Request body.
    pub body: Bytes,
}

impl Request {
    /// Create a request with an empty header map and body.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        host: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            host: host.into(),
            path: path.into(),
            head: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_head(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.insert(key.into(), value.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Encode to wire bytes.
    ///
    /// # Errors
    ///
    /// `FieldTooLarge` if any field exceeds its length prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        check_width("method", self.method.len(), u8::MAX as usize)?;
        check_width("host", self.host.len(), u16::MAX as usize)?;
        check_width("path", self.path.len(), u16::MAX as usize)?;
        check_width("head", self.head.len(), u16::MAX as usize)?;
        check_width("body", self.body.len(), u32::MAX as usize)?;

        let mut buf = Vec::with_capacity(
            1 + self.method.len() + 4 + self.host.len() + self.path.len() + 6 + self.body.len(),
        );
        buf.push(self.method.len() as u8);
        buf.extend_from_slice(self.method.as_bytes());
        buf.extend_from_slice(&(self.host.len() as u16).to_be_bytes());
        buf.extend_from_slice(self.host.as_bytes());
        buf.extend_from_slice(&(self.path.len() as u16).to_be_bytes());
        buf.extend_from_slice(self.path.as_bytes());

        buf.extend_from_slice(&(self.head.len() as u16).to_be_bytes());
        for (key, value) in &self.head {
            check_width("header key", key.len(), u16::MAX as usize)?;
            check_width("header value", value.len(), u16::MAX as usize)?;
            buf.extend_from_slice(&(key.len() as u16).to_be_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
            buf.extend_from_slice(value.as_bytes());
        }

        buf.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }

    /// Decode from wire bytes.
    ///
    /// Every length prefix is bounds-checked; hostile prefixes fail with
    /// `Truncated` instead of over-reading.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let method = reader.read_str8("method")?;
        let host = reader.read_str16("host")?;
        let path = reader.read_str16("path")?;

        let count = reader.read_u16()?;
        let mut head = BTreeMap::new();
        for _ in 0..count {
            let key = reader.read_str16("header key")?;
            let value = reader.read_str16("header value")?;
            head.insert(key, value);
        }

        let body_len = reader.read_u32()? as usize;
        let body = Bytes::copy_from_slice(reader.take(body_len)?);

        Ok(Self { method, host, path, head, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProtocolError;

    #[test]
    fn round_trip() {
        let request = Request::new("POST", "hidden-echo", "/echo")
            .with_head("Accept", "application/json")
            .with_head("X-Trace", "abc")
            .with_body(&b"ping"[..]);

        let wire = request.to_bytes().unwrap();
        assert_eq!(Request::from_bytes(&wire).unwrap(), request);
    }

    #[test]
    fn empty_fields_round_trip() {
        let request = Request::new("GET", "svc", "/");
        let wire = request.to_bytes().unwrap();
        assert_eq!(Request::from_bytes(&wire).unwrap(), request);
    }

    #[test]
    fn truncated_body_rejected() {
        let wire = Request::new("GET", "svc", "/").with_body(&b"data"[..]).to_bytes().unwrap();
        assert!(matches!(
            Request::from_bytes(&wire[..wire.len() - 1]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn oversized_method_rejected() {
        let request = Request::new("M".repeat(300), "svc", "/");
        assert!(matches!(request.to_bytes(), Err(ProtocolError::FieldTooLarge { .. })));
    }
}
