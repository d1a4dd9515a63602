//! HTTP/1.1 client over an embassy-net TCP socket
//!
//! One connection per request (`Connection: close`). Only the status line of
//! the response is read; the body is ignored.

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_time::{with_timeout, Duration};
use embedded_io_async::{Read, Write};
use log::{debug, warn};

use crate::http::{parse_status_line, HttpRequest, HttpResponse, HttpTransport, NetworkError, ServerUrl};

const RX_BUFFER_SIZE: usize = 1024;
const TX_BUFFER_SIZE: usize = 1024;
/// Longest status line we accept
const STATUS_LINE_MAX: usize = 64;

/// [`HttpTransport`] over an embassy-net stack
pub struct TcpTransport<'a> {
    stack: Stack<'a>,
    rx_buffer: [u8; RX_BUFFER_SIZE],
    tx_buffer: [u8; TX_BUFFER_SIZE],
}

impl<'a> TcpTransport<'a> {
    pub fn new(stack: Stack<'a>) -> Self {
        Self {
            stack,
            rx_buffer: [0; RX_BUFFER_SIZE],
            tx_buffer: [0; TX_BUFFER_SIZE],
        }
    }

    async fn resolve(&self, server: &ServerUrl) -> Result<IpAddress, NetworkError> {
        if let Some(ip) = server.ipv4() {
            return Ok(IpAddress::Ipv4(ip));
        }

        let addresses = self
            .stack
            .dns_query(server.host(), DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("[HTTP] DNS lookup of {} failed: {:?}", server.host(), e);
                NetworkError::Dns
            })?;
        addresses.first().copied().ok_or(NetworkError::Dns)
    }

    async fn exchange(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, NetworkError> {
        if !self.stack.is_config_up() {
            return Err(NetworkError::ConnectionFailed);
        }

        let address = self.resolve(request.server).await?;
        let mut socket = TcpSocket::new(self.stack, &mut self.rx_buffer, &mut self.tx_buffer);

        socket.connect((address, request.server.port())).await.map_err(|e| {
            warn!("[HTTP] Connect to {}:{} failed: {:?}", address, request.server.port(), e);
            NetworkError::ConnectionFailed
        })?;

        socket
            .write_all(&request.encode())
            .await
            .map_err(|_| NetworkError::ConnectionFailed)?;
        socket.flush().await.map_err(|_| NetworkError::ConnectionFailed)?;

        let mut head = [0u8; STATUS_LINE_MAX];
        let mut len = 0;
        let status = loop {
            if len == head.len() {
                return Err(NetworkError::MalformedResponse);
            }
            let n = socket
                .read(&mut head[len..])
                .await
                .map_err(|_| NetworkError::ConnectionFailed)?;
            if n == 0 {
                // closed before a full status line arrived
                return Err(NetworkError::MalformedResponse);
            }
            len += n;
            if let Some(status) = parse_status_line(&head[..len])? {
                break status;
            }
        };

        socket.close();
        debug!("[HTTP] POST {} -> {}", request.path, status);
        Ok(HttpResponse { status })
    }
}

impl HttpTransport for TcpTransport<'_> {
    async fn send(&mut self, request: &HttpRequest<'_>, timeout: Duration) -> Result<HttpResponse, NetworkError> {
        with_timeout(timeout, self.exchange(request))
            .await
            .map_err(|_| NetworkError::Timeout)?
    }
}
