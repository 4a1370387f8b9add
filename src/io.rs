//! Socket I/O helpers: bounded line reads and streamed response relay.

use crate::error::ProxyError;
use bytes::{Bytes, BytesMut};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
};

/// Read one line, including its `\n`, into `buf`.
///
/// Returns the number of bytes read; 0 means the peer closed before sending
/// anything. A final line without `\n` is returned as-is.
pub async fn read_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> Result<usize, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();

    loop {
        let available = reader.fill_buf().await.map_err(ProxyError::ClientRead)?;
        if available.is_empty() {
            return Ok(buf.len());
        }

        let newline_pos = available.iter().position(|byte| *byte == b'\n');
        let consume = newline_pos.map(|idx| idx + 1).unwrap_or(available.len());

        if buf.len() + consume > max_len {
            return Err(ProxyError::LineTooLong { limit: max_len });
        }

        buf.extend_from_slice(&available[..consume]);
        reader.consume(consume);

        if newline_pos.is_some() {
            return Ok(buf.len());
        }
    }
}

/// Result of relaying an origin response.
#[derive(Debug)]
pub struct Relayed {
    /// Bytes written to the client
    pub total: u64,
    /// The full response, if it stayed within the capture limit
    pub captured: Option<Bytes>,
}

/// Copy `origin` to `client` until EOF, one chunk at a time, keeping a copy
/// of the bytes as long as they fit in `capture_limit`.
pub async fn relay<O, C>(
    origin: &mut O,
    client: &mut C,
    chunk_size: usize,
    capture_limit: usize,
) -> Result<Relayed, ProxyError>
where
    O: AsyncRead + Unpin,
    C: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; chunk_size];
    let mut captured = Some(BytesMut::new());
    let mut total: u64 = 0;

    loop {
        let n = origin.read(&mut chunk).await.map_err(ProxyError::OriginRead)?;
        if n == 0 {
            break;
        }

        client
            .write_all(&chunk[..n])
            .await
            .map_err(ProxyError::ClientWrite)?;
        total += n as u64;

        if let Some(buf) = captured.as_mut() {
            if buf.len() + n <= capture_limit {
                buf.extend_from_slice(&chunk[..n]);
            } else {
                captured = None;
            }
        }
    }

    client.flush().await.map_err(ProxyError::ClientWrite)?;

    Ok(Relayed {
        total,
        captured: captured.map(BytesMut::freeze),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_line_splits_on_newline() {
        let mut reader = BufReader::new(&b"GET / HTTP/1.0\r\nHost: x\r\n\r\n"[..]);
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut reader, &mut buf, 64).await.unwrap(), 16);
        assert_eq!(buf, b"GET / HTTP/1.0\r\n");
        read_line(&mut reader, &mut buf, 64).await.unwrap();
        assert_eq!(buf, b"Host: x\r\n");
        read_line(&mut reader, &mut buf, 64).await.unwrap();
        assert_eq!(buf, b"\r\n");
        assert_eq!(read_line(&mut reader, &mut buf, 64).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_line_returns_unterminated_tail() {
        let mut reader = BufReader::new(&b"partial"[..]);
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut reader, &mut buf, 64).await.unwrap(), 7);
        assert_eq!(buf, b"partial");
    }

    #[tokio::test]
    async fn test_read_line_enforces_limit() {
        let mut reader = BufReader::with_capacity(4, &b"0123456789\n"[..]);
        let mut buf = Vec::new();

        let err = read_line(&mut reader, &mut buf, 8).await.unwrap_err();
        assert!(matches!(err, ProxyError::LineTooLong { limit: 8 }));
    }

    #[tokio::test]
    async fn test_relay_captures_small_response() {
        let response = b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let mut origin = &response[..];
        let mut client = Vec::new();

        let relayed = relay(&mut origin, &mut client, 8, 1024).await.unwrap();
        assert_eq!(client, response);
        assert_eq!(relayed.total, response.len() as u64);
        assert_eq!(relayed.captured.as_deref(), Some(&response[..]));
    }

    #[tokio::test]
    async fn test_relay_drops_capture_past_limit() {
        let response = vec![b'x'; 100];
        let mut origin = &response[..];
        let mut client = Vec::new();

        let relayed = relay(&mut origin, &mut client, 16, 50).await.unwrap();
        assert_eq!(client, response);
        assert_eq!(relayed.total, 100);
        assert!(relayed.captured.is_none());
    }

    #[tokio::test]
    async fn test_relay_capture_limit_is_inclusive() {
        let response = vec![b'x'; 64];
        let mut origin = &response[..];
        let mut client = Vec::new();

        let relayed = relay(&mut origin, &mut client, 16, 64).await.unwrap();
        assert_eq!(relayed.captured.map(|b| b.len()), Some(64));
    }
}
