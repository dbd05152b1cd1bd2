//! Byte transport to a plug.
//! One TCP session is opened per exchange and closed when the exchange ends.

use crate::error::{Result, ShpError};
use crate::protocol::{self, DEFAULT_PORT};
use futures_util::future::BoxFuture;
use log::{debug, info};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};

pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Moves one request payload to the device and its reply back.
///
/// Implementations handle framing and obfuscation; callers see plaintext
/// JSON in both directions.
pub trait Transport: Send + Sync {
    /// Sends `payload` and, when `expect_reply` is set, returns the decrypted
    /// reply payload.
    fn exchange(&self, payload: Vec<u8>, expect_reply: bool) -> BoxFuture<'_, Result<Option<Vec<u8>>>>;
}

/// The TCP transport used by real devices.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    address: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new<A: Into<String>>(address: A) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<TcpStream> {
        info!("Connecting to plug at {}:{}", self.address, self.port);
        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((self.address.as_str(), self.port)),
        )
        .await
        .map_err(|_| ShpError::Timeout)?
        .map_err(|e| ShpError::ConnectionFailed(e.to_string()))?;

        // Requests are single small frames.
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    async fn send_and_receive(&self, payload: Vec<u8>, expect_reply: bool) -> Result<Option<Vec<u8>>> {
        let mut stream = self.connect().await?;
        protocol::write_frame(&mut stream, &payload).await?;

        if !expect_reply {
            debug!("No reply expected from {}", self.address);
            return Ok(None);
        }
        let reply = protocol::read_frame(&mut stream).await?;
        debug!(
            "Reply from {}: {}",
            self.address,
            String::from_utf8_lossy(&reply)
        );
        Ok(Some(reply))
    }
}

impl Transport for TcpTransport {
    fn exchange(&self, payload: Vec<u8>, expect_reply: bool) -> BoxFuture<'_, Result<Option<Vec<u8>>>> {
        Box::pin(self.send_and_receive(payload, expect_reply))
    }
}
