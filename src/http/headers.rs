//! Ordered request header list.
//!
//! Keeps every header line the client sent, in order and with duplicates,
//! so the ones the proxy does not own can be forwarded byte-for-byte.
//! Lines are kept as raw bytes; values need not be UTF-8.

use bytes::Bytes;

/// Headers the proxy always writes itself.
pub const RESERVED_HEADERS: [&str; 4] = ["host", "user-agent", "connection", "proxy-connection"];

/// One `Name: value` line as received, without its line ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    raw: Bytes,
    name_len: usize,
}

impl HeaderField {
    /// Parse a header line. Returns `None` when there is no `:`.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let raw = trim_line_ending(line);
        let name_len = raw.iter().position(|byte| *byte == b':')?;
        Some(Self {
            raw: Bytes::copy_from_slice(raw),
            name_len,
        })
    }

    pub fn name(&self) -> &[u8] {
        &self.raw[..self.name_len]
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_reserved(&self) -> bool {
        RESERVED_HEADERS
            .iter()
            .any(|reserved| self.name().eq_ignore_ascii_case(reserved.as_bytes()))
    }
}

fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = line {
        line = rest;
    }
    line
}

/// Header lines in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    fields: Vec<HeaderField>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: HeaderField) {
        self.fields.push(field);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }

    /// Drop `Host`, `User-Agent`, `Connection` and `Proxy-Connection`.
    pub fn remove_reserved(&mut self) {
        self.fields.retain(|field| !field.is_reserved());
    }
}
