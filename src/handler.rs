//! Per-connection request handling.
//!
//! Reads one request, answers it from the cache or from the origin, and
//! returns. The caller owns the client stream and closes it afterwards.

use crate::cache::{InsertOutcome, ObjectCache};
use crate::config::Config;
use crate::error::ProxyError;
use crate::http::{
    build_forward_request, ErrorResponse, HeaderField, HeaderList, ParseError, RequestLine,
    Target,
};
use crate::io::{read_line, relay};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// How a request finished
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The client closed without sending a request line
    ClientClosed,
    /// The proxy answered with an error page
    Rejected { status: u16 },
    /// Served from the cache without contacting the origin
    CacheHit { uri: String, bytes: usize },
    /// Relayed from the origin
    Fetched { uri: String, bytes: u64, cached: bool },
}

/// Shared state and settings every connection worker needs.
#[derive(Debug, Clone)]
pub struct Handler {
    cache: Arc<ObjectCache>,
    user_agent: Arc<str>,
    relay_chunk_size: usize,
    max_line_length: usize,
}

impl Handler {
    pub fn new(config: &Config, cache: Arc<ObjectCache>) -> Self {
        Self {
            cache,
            user_agent: Arc::from(config.user_agent.as_str()),
            relay_chunk_size: config.relay_chunk_size,
            max_line_length: config.max_line_length,
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// Serve a single request read from `stream`.
    pub async fn handle<S>(
        &self,
        stream: &mut S,
        peer: SocketAddr,
    ) -> Result<RequestOutcome, ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut client = BufReader::with_capacity(self.max_line_length, stream);
        let mut line = Vec::with_capacity(128);

        match read_line(&mut client, &mut line, self.max_line_length).await {
            Ok(0) => {
                trace!(%peer, "Client closed before sending a request");
                return Ok(RequestOutcome::ClientClosed);
            }
            Ok(_) => {}
            Err(ProxyError::LineTooLong { limit }) => {
                debug!(%peer, limit, "Request line too long");
                let response = ErrorResponse::bad_request(
                    "cache-proxy could not handle this request",
                    &format!("request line longer than {limit} bytes"),
                );
                return Ok(send_error(&mut client, response, peer).await);
            }
            Err(e) => return Err(e),
        }
        let request_line = String::from_utf8_lossy(&line).into_owned();

        let request = match std::str::from_utf8(&line)
            .map_err(|_| ParseError::InvalidEncoding)
            .and_then(RequestLine::parse)
        {
            Ok(request) => request,
            Err(e) => {
                debug!(%peer, error = %e, "Unparseable request line");
                let response = ErrorResponse::bad_request(
                    "cache-proxy could not handle this request",
                    &request_line,
                );
                return Ok(send_error(&mut client, response, peer).await);
            }
        };

        if !request.is_get() {
            debug!(%peer, method = %request.method, "Unsupported method");
            let response = ErrorResponse::not_implemented(&request_line);
            return Ok(send_error(&mut client, response, peer).await);
        }

        if !request.is_supported_version() {
            debug!(%peer, version = %request.version, "Unsupported HTTP version");
            let response = ErrorResponse::bad_request(
                "cache-proxy could not handle this HTTP version",
                &request_line,
            );
            return Ok(send_error(&mut client, response, peer).await);
        }

        let origin = match request.target {
            Target::Absolute(origin) => origin,
            Target::OriginForm(path) => {
                debug!(%peer, %path, "Request target has no origin");
                let response = ErrorResponse::bad_request(
                    "cache-proxy requires an absolute http:// URI",
                    &request_line,
                );
                return Ok(send_error(&mut client, response, peer).await);
            }
        };
        let uri = origin.cache_key();

        if let Some(body) = self.cache.lookup(&uri) {
            // Consume the rest of the request so closing does not reset the reply
            self.read_headers(&mut client, peer).await?;
            client.write_all(&body).await.map_err(ProxyError::ClientWrite)?;
            client.flush().await.map_err(ProxyError::ClientWrite)?;
            return Ok(RequestOutcome::CacheHit {
                uri,
                bytes: body.len(),
            });
        }

        let mut headers = self.read_headers(&mut client, peer).await?;
        headers.remove_reserved();
        let forward = build_forward_request(&origin, &headers, &self.user_agent);
        trace!(%peer, extra_headers = headers.len(), "Forward request built");

        let mut upstream = TcpStream::connect((origin.host.as_str(), origin.port))
            .await
            .map_err(|source| ProxyError::OriginConnect {
                origin: origin.to_string(),
                source,
            })?;
        debug!(%peer, %origin, "Connected to origin");

        upstream
            .write_all(&forward)
            .await
            .map_err(ProxyError::OriginWrite)?;

        let relayed = relay(
            &mut upstream,
            &mut client,
            self.relay_chunk_size,
            self.cache.max_object_size(),
        )
        .await?;

        let cached = match relayed.captured {
            Some(body) => match self.cache.insert(&uri, body) {
                InsertOutcome::Stored { evicted } => {
                    let stats = self.cache.stats();
                    debug!(
                        %uri,
                        evicted,
                        entries = stats.entries,
                        bytes_used = stats.bytes_used,
                        max_cache_size = stats.max_cache_size,
                        hits = stats.hits,
                        misses = stats.misses,
                        "Response cached"
                    );
                    true
                }
                InsertOutcome::TooLarge => false,
            },
            None => {
                debug!(%uri, bytes = relayed.total, "Response too large to cache");
                false
            }
        };

        if let Err(e) = upstream.shutdown().await {
            debug!(%origin, error = %e, "Failed to shut down origin connection");
        }

        Ok(RequestOutcome::Fetched {
            uri,
            bytes: relayed.total,
            cached,
        })
    }

    /// Read header lines up to the blank line (or EOF).
    async fn read_headers<R>(
        &self,
        client: &mut BufReader<R>,
        peer: SocketAddr,
    ) -> Result<HeaderList, ProxyError>
    where
        R: AsyncRead + Unpin,
    {
        let mut headers = HeaderList::new();
        let mut line = Vec::with_capacity(128);

        loop {
            if read_line(client, &mut line, self.max_line_length).await? == 0 {
                break;
            }
            if line == b"\r\n" || line == b"\n" {
                break;
            }
            match HeaderField::parse(&line) {
                Some(field) => headers.push(field),
                None => {
                    let raw = String::from_utf8_lossy(&line);
                    debug!(%peer, line = %raw.trim_end(), "Dropping header line without ':'");
                }
            }
        }

        Ok(headers)
    }
}

/// Write an error page, headers then body. Write failures are logged only.
async fn send_error<W>(client: &mut W, response: ErrorResponse, peer: SocketAddr) -> RequestOutcome
where
    W: AsyncWrite + Unpin,
{
    let (head, body) = response.encode();

    if let Err(e) = client.write_all(&head).await {
        warn!(%peer, error = %e, "Failed to write error response headers");
    } else if let Err(e) = client.write_all(&body).await {
        warn!(%peer, error = %e, "Failed to write error response body");
    } else if let Err(e) = client.flush().await {
        warn!(%peer, error = %e, "Failed to flush error response");
    }

    RequestOutcome::Rejected {
        status: response.status,
    }
}
