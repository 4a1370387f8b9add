//! TCP server for the forwarding proxy.
//!
//! Accepts incoming connections and hands each one to its own task running
//! the request handler. The accept loop never waits on a handler.

use crate::cache::ObjectCache;
use crate::config::Config;
use crate::handler::{Handler, RequestOutcome};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Pending connection queue length
const LISTEN_BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Handler,
}

impl Server {
    /// Bind the listening socket and create the shared cache.
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let cache = Arc::new(ObjectCache::new(
            config.max_cache_size,
            config.max_object_size,
        ));
        Self::bind_with_cache(config, cache).await
    }

    /// Bind the listening socket, serving from an existing cache.
    pub async fn bind_with_cache(config: &Config, cache: Arc<ObjectCache>) -> io::Result<Self> {
        let addr = tokio::net::lookup_host(config.listen_addr())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address found for {}", config.listen_addr()),
                )
            })?;

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "Proxy listening");

        Ok(Server {
            listener,
            local_addr,
            handler: Handler::new(config, cache),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever. Accept errors are logged and skipped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "Accepted connection");
                    let handler = self.handler.clone();
                    tokio::spawn(serve_connection(handler, stream, peer));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Get a reference to the cache for testing
    #[cfg(test)]
    pub fn cache(&self) -> &Arc<ObjectCache> {
        self.handler.cache()
    }
}

/// Run one request on its own task, then close the client connection.
async fn serve_connection(handler: Handler, mut stream: TcpStream, peer: SocketAddr) {
    match handler.handle(&mut stream, peer).await {
        Ok(RequestOutcome::ClientClosed) => {
            debug!(%peer, "Connection closed without a request");
        }
        Ok(RequestOutcome::Rejected { status }) => {
            info!(%peer, status, "Request rejected");
        }
        Ok(RequestOutcome::CacheHit { uri, bytes }) => {
            info!(%peer, %uri, bytes, "Served from cache");
        }
        Ok(RequestOutcome::Fetched { uri, bytes, cached }) => {
            info!(%peer, %uri, bytes, cached, "Fetched from origin");
        }
        Err(e) => {
            warn!(%peer, error = %e, "Request abandoned");
        }
    }

    let _ = stream.shutdown().await;
}

/// Create a listening TCP socket with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
