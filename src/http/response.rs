//! Error responses synthesized by the proxy.

use bytes::Bytes;

/// An HTML error page sent in place of an origin response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u16,
    pub reason: &'static str,
    message: String,
    cause: String,
}

impl ErrorResponse {
    pub fn new(status: u16, reason: &'static str, message: impl Into<String>, cause: &str) -> Self {
        Self {
            status,
            reason,
            message: message.into(),
            cause: cause.trim_end_matches(['\r', '\n']).to_string(),
        }
    }

    /// `400 Bad Request` for the offending request line.
    pub fn bad_request(message: impl Into<String>, cause: &str) -> Self {
        Self::new(400, "Bad Request", message, cause)
    }

    /// `501 Not implemented` for methods other than GET.
    pub fn not_implemented(cause: &str) -> Self {
        Self::new(
            501,
            "Not implemented",
            "cache-proxy does not implement this method",
            cause,
        )
    }

    pub fn body(&self) -> Bytes {
        Bytes::from(format!(
            "<html>\r\n\
             <head><title>Proxy Error</title></head>\r\n\
             <body bgcolor=\"ffffff\">\r\n\
             <h1>{}: {}</h1>\r\n\
             <p>{}: {}</p>\r\n\
             <hr><em>cache-proxy</em>\r\n\
             </body></html>\r\n",
            self.status,
            self.reason,
            escape_html(&self.message),
            escape_html(&self.cause),
        ))
    }

    /// Status line and headers for a body of `body_len` bytes.
    pub fn head(&self, body_len: usize) -> Bytes {
        Bytes::from(format!(
            "HTTP/1.0 {} {}\r\n\
             Content-Type: text/html\r\n\
             Content-Length: {}\r\n\r\n",
            self.status, self.reason, body_len
        ))
    }

    /// Head and body, ready to be written in that order.
    pub fn encode(&self) -> (Bytes, Bytes) {
        let body = self.body();
        (self.head(body.len()), body)
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
