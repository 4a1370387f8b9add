//! Outbound request reconstruction.

use super::headers::HeaderList;
use super::request::Origin;
use bytes::{Bytes, BytesMut};

/// Build the HTTP/1.0 request sent to the origin.
///
/// The proxy owns the request line and the `Host`, `User-Agent`,
/// `Connection` and `Proxy-Connection` headers. `headers` must already have
/// those removed (see [`HeaderList::remove_reserved`]); each line is written
/// back byte-for-byte in its original order.
pub fn build_forward_request(origin: &Origin, headers: &HeaderList, user_agent: &str) -> Bytes {
    let mut request = BytesMut::with_capacity(256);

    request.extend_from_slice(format!("GET {} HTTP/1.0\r\n", origin.path).as_bytes());
    request.extend_from_slice(format!("Host: {}\r\n", origin.authority()).as_bytes());
    request.extend_from_slice(format!("User-Agent: {user_agent}\r\n").as_bytes());
    request.extend_from_slice(b"Connection: close\r\n");
    request.extend_from_slice(b"Proxy-Connection: close\r\n");

    for field in headers.iter() {
        request.extend_from_slice(field.raw());
        request.extend_from_slice(b"\r\n");
    }

    request.extend_from_slice(b"\r\n");
    request.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::headers::HeaderField;

    fn origin() -> Origin {
        Origin {
            host: "example.com".to_string(),
            port: 80,
            path: "/index.html".to_string(),
        }
    }

    #[test]
    fn test_canonical_request_without_extra_headers() {
        let request = build_forward_request(&origin(), &HeaderList::new(), "test-agent");
        assert_eq!(
            &request[..],
            b"GET /index.html HTTP/1.0\r\n\
              Host: example.com:80\r\n\
              User-Agent: test-agent\r\n\
              Connection: close\r\n\
              Proxy-Connection: close\r\n\
              \r\n"
        );
    }

    #[test]
    fn test_extra_headers_follow_in_order() {
        let mut headers = HeaderList::new();
        for line in [
            &b"Accept: text/html\r\n"[..],
            &b"X-Name: caf\xe9\r\n"[..],
            &b"X-Trace:abc\r\n"[..],
        ] {
            headers.push(HeaderField::parse(line).unwrap());
        }

        let request = build_forward_request(&origin(), &headers, "test-agent");

        assert!(request.starts_with(b"GET /index.html HTTP/1.0\r\nHost: example.com:80\r\n"));
        assert!(request.ends_with(
            b"Proxy-Connection: close\r\n\
              Accept: text/html\r\n\
              X-Name: caf\xe9\r\n\
              X-Trace:abc\r\n\r\n"
        ));
    }
}
