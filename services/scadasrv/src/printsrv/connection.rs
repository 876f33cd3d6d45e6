//! TCP connection to PrintSrv
//!
//! One socket wrapped in the frame codec. Requests and responses are
//! strictly alternating; the caller must read the response to a request
//! before sending the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use common::logging::body_preview;

use super::codec::FrameCodec;
use super::pool::{ConnectionFactory, PooledConnection};
use crate::error::{Result, ScadaError};

/// Characters of a request/response body shown in debug logs
const LOG_PREVIEW_CHARS: usize = 200;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A single PrintSrv socket
pub struct PrintSrvConnection {
    id: String,
    framed: Framed<TcpStream, FrameCodec>,
    closed: bool,
}

impl PrintSrvConnection {
    /// Connect to `host:port`, failing after `connect_timeout`
    pub async fn connect(
        host: &str,
        port: u16,
        codec: FrameCodec,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                ScadaError::connection(format!(
                    "connect to {}:{} timed out after {:?}",
                    host, port, connect_timeout
                ))
            })?
            .map_err(|e| ScadaError::connection(format!("connect to {}:{} failed: {}", host, port, e)))?;

        // Small request/response frames; don't batch them
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        Ok(Self::from_stream(stream, codec))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, codec: FrameCodec) -> Self {
        let id = format!("{:x}", NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            framed: Framed::new(stream, codec),
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(ScadaError::io(format!("con={} socket is closed", self.id)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PooledConnection for PrintSrvConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_valid(&self) -> bool {
        !self.closed && self.framed.get_ref().peer_addr().is_ok()
    }

    async fn send_request(&mut self, body: &str) -> Result<()> {
        self.ensure_open()?;
        debug!(
            "con={} >>> {}",
            self.id,
            body_preview(body, LOG_PREVIEW_CHARS)
        );
        // Framed::send flushes after the frame
        self.framed.send(body).await
    }

    async fn receive_response(&mut self) -> Result<String> {
        self.ensure_open()?;
        match self.framed.next().await {
            Some(Ok(body)) => {
                debug!(
                    "con={} <<< {}",
                    self.id,
                    body_preview(&body, LOG_PREVIEW_CHARS)
                );
                Ok(body)
            },
            Some(Err(e)) => Err(e),
            None => Err(ScadaError::framing(
                format!("con={} closed by PrintSrv before a frame header", self.id),
                &[],
            )),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.framed.get_mut().shutdown().await {
            debug!("con={} shutdown error ignored: {}", self.id, e);
        }
        debug!("con={} closed", self.id);
    }
}

/// Opens TCP connections to one PrintSrv endpoint
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    host: String,
    port: u16,
    codec: FrameCodec,
    connect_timeout: Duration,
}

impl TcpConnectionFactory {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        codec: FrameCodec,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            codec,
            connect_timeout,
        }
    }
}

#[async_trait]
impl ConnectionFactory for TcpConnectionFactory {
    type Connection = PrintSrvConnection;

    async fn create(&self) -> Result<PrintSrvConnection> {
        PrintSrvConnection::connect(&self.host, self.port, self.codec, self.connect_timeout).await
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is acceptable in tests
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_request_response_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, FrameCodec::default());
            let request = framed.next().await.unwrap().unwrap();
            framed.send("{\"ok\":true}").await.unwrap();
            request
        });

        let mut conn = PrintSrvConnection::connect(
            "127.0.0.1",
            port,
            FrameCodec::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert!(conn.is_valid());

        conn.send_request("{\"Command\":\"QueryAll\"}").await.unwrap();
        assert_eq!(conn.receive_response().await.unwrap(), "{\"ok\":true}");
        assert_eq!(server.await.unwrap(), "{\"Command\":\"QueryAll\"}");
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_io() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut conn = PrintSrvConnection::connect(
            "127.0.0.1",
            port,
            FrameCodec::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        let _peer = accept.await.unwrap();

        conn.close().await;
        assert!(!conn.is_valid());
        assert!(matches!(
            conn.send_request("{}").await,
            Err(ScadaError::Io(_))
        ));
        // Second close is a no-op
        conn.close().await;
    }

    #[tokio::test]
    async fn test_peer_closing_mid_header_is_framing_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
            stream.write_all(b"P00").await.unwrap();
        });

        let mut conn = PrintSrvConnection::connect(
            "127.0.0.1",
            port,
            FrameCodec::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        conn.send_request("{}").await.unwrap();
        assert!(matches!(
            conn.receive_response().await,
            Err(ScadaError::Framing { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let factory = TcpConnectionFactory::new(
            "127.0.0.1",
            port,
            FrameCodec::default(),
            Duration::from_secs(1),
        );
        assert_eq!(factory.endpoint(), format!("127.0.0.1:{}", port));
        assert!(matches!(
            factory.create().await,
            Err(ScadaError::Connection(_))
        ));
    }
}
