//! HTTP request line parsing.
//!
//! Splits `METHOD target HTTP/x.y` into its parts and resolves absolute
//! `http://` targets into the origin host, port and path used both for
//! forwarding and as the cache key.

use std::fmt;
use thiserror::Error;

/// Port used when an absolute URI does not name one.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Request line parsing errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("request line is not valid UTF-8")]
    InvalidEncoding,
    #[error("request line must have exactly three parts")]
    MalformedRequestLine,
    #[error("invalid method '{0}'")]
    InvalidMethod(String),
    #[error("invalid protocol version '{0}'")]
    InvalidVersion(String),
    #[error("unsupported request target '{0}'")]
    InvalidTarget(String),
    #[error("request target has no host")]
    MissingHost,
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// The origin a request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub host: String,
    pub port: u16,
    /// Path plus query, always starting with `/`
    pub path: String,
}

impl Origin {
    /// Canonical `host:port/path` identity used as the cache key.
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.authority(), self.path)
    }

    /// Value for the injected `Host` header.
    pub fn authority(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parsed request target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `http://host[:port][/path]`
    Absolute(Origin),
    /// `/path`, with no origin of its own
    OriginForm(String),
}

/// Parsed HTTP request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    /// Version number without the `HTTP/` prefix, e.g. `1.1`
    pub version: String,
    pub target: Target,
}

impl RequestLine {
    /// Parse a raw request line (trailing CRLF optional).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split_ascii_whitespace();

        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::MalformedRequestLine);
        };

        if !method.bytes().all(is_token_byte) {
            return Err(ParseError::InvalidMethod(method.to_string()));
        }

        let version = version
            .strip_prefix("HTTP/")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParseError::InvalidVersion(version.to_string()))?;

        Ok(RequestLine {
            method: method.to_string(),
            version: version.to_string(),
            target: parse_target(target)?,
        })
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Only HTTP/1.0 and HTTP/1.1 clients are served.
    pub fn is_supported_version(&self) -> bool {
        self.version == "1.0" || self.version == "1.1"
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn parse_target(target: &str) -> Result<Target, ParseError> {
    if target.starts_with('/') {
        return Ok(Target::OriginForm(target.to_string()));
    }

    let rest = strip_prefix_ignore_case(target, "http://")
        .ok_or_else(|| ParseError::InvalidTarget(target.to_string()))?;

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    let (host, port) = split_authority(authority)?;

    Ok(Target::Absolute(Origin {
        host: host.to_string(),
        port,
        path: path.to_string(),
    }))
}

fn split_authority(authority: &str) -> Result<(&str, u16), ParseError> {
    // Bracketed IPv6 literal: [::1]:8080
    let (host, port) = if let Some(stripped) = authority.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or_else(|| ParseError::InvalidTarget(authority.to_string()))?;
        let host = &stripped[..end];
        match &stripped[end + 1..] {
            "" => (host, None),
            tail => match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None => return Err(ParseError::InvalidTarget(authority.to_string())),
            },
        }
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(ParseError::MissingHost);
    }

    let port = match port {
        None | Some("") => DEFAULT_HTTP_PORT,
        Some(port) => port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ParseError::InvalidPort(port.to_string()))?,
    };

    Ok((host, port))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
