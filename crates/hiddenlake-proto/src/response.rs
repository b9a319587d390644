//! Length-prefixed response codec.
//!
//! The response half of a fetch round-trip: a status code, a header map and
//! a body, framed exactly like [`crate::Request`] fields.
//!
//! ```text
//! [code u16] [count u16] { [len u16][key] [len u16][value] }* [len u32][body]
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{
    codec::{Reader, check_width},
    errors::Result,
};

/// A service response carried back over the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code from the local service.
    pub code: u16,
    /// Header map, minus the receiving node's skip-set.
    pub head: BTreeMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Create a response with an empty header map and body.
    #[must_use]
    pub fn new(code: u16) -> Self {
        Self { code, head: BTreeMap::new(), body: Bytes::new() }
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
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        check_width("head", self.head.len(), u16::MAX as usize)?;
        check_width("body", self.body.len(), u32::MAX as usize)?;

        let mut buf = Vec::with_capacity(8 + self.body.len());
        buf.extend_from_slice(&self.code.to_be_bytes());

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
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let code = reader.read_u16()?;

        let count = reader.read_u16()?;
        let mut head = BTreeMap::new();
        for _ in 0..count {
            let key = reader.read_str16("header key")?;
            let value = reader.read_str16("header value")?;
            head.insert(key, value);
        }

        let body_len = reader.read_u32()? as usize;
        let body = Bytes::copy_from_slice(reader.take(body_len)?);

        Ok(Self { code, head, body })
    }
}
