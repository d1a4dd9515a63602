//! HTTP plumbing for the report pipeline
//!
//! The transport itself is a collaborator behind [`HttpTransport`]. This
//! module owns what every transport shares: the server URL, the request
//! shape, HTTP/1.1 encoding and status-line parsing.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::net::Ipv4Addr;

use embassy_time::Duration;

use crate::config::ConfigError;

/// Transport failures. All of them are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// No complete response within the configured timeout
    Timeout,
    /// TCP connect, write or read failed
    ConnectionFailed,
    /// Host name could not be resolved
    Dns,
    /// Response did not start with a valid HTTP status line
    MalformedResponse,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Timeout => write!(f, "request timed out"),
            NetworkError::ConnectionFailed => write!(f, "connection failed"),
            NetworkError::Dns => write!(f, "host lookup failed"),
            NetworkError::MalformedResponse => write!(f, "malformed HTTP response"),
        }
    }
}

/// Parsed `http://host[:port][/path]` base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUrl {
    host: String,
    port: u16,
    base_path: String,
}

impl ServerUrl {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let rest = url
            .trim()
            .strip_prefix("http://")
            .ok_or(ConfigError::InvalidServerUrl)?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| ConfigError::InvalidServerUrl)?),
            None => (authority, 80),
        };

        if host.is_empty() || port == 0 || host.contains(|c: char| c.is_whitespace() || c == '@') {
            return Err(ConfigError::InvalidServerUrl);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            base_path: path.trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Host as an IPv4 literal, if it is one
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.host.parse().ok()
    }

    /// Request target for an endpoint path such as `/api/system/status`
    pub fn path_for(&self, endpoint: &str) -> String {
        let mut path = String::with_capacity(self.base_path.len() + endpoint.len());
        path.push_str(&self.base_path);
        path.push_str(endpoint);
        path
    }
}

impl fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.base_path)
    }
}

/// A JSON POST request
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub server: &'a ServerUrl,
    /// Full request target, see [`ServerUrl::path_for`]
    pub path: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
}

impl HttpRequest<'_> {
    /// Serialize as an HTTP/1.1 request with `Connection: close`
    pub fn encode(&self) -> Vec<u8> {
        use core::fmt::Write;

        let mut head = String::with_capacity(128 + self.path.len());
        // Writing into a String cannot fail
        let _ = write!(
            head,
            "POST {} HTTP/1.1\r\nHost: {}:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.path,
            self.server.host,
            self.server.port,
            self.body.len()
        );
        for (name, value) in self.headers {
            let _ = write!(head, "{}: {}\r\n", name, value);
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body);
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Parse the status code out of the first response line.
///
/// Returns `Ok(None)` while the line is still incomplete.
pub fn parse_status_line(buf: &[u8]) -> Result<Option<u16>, NetworkError> {
    let Some(end) = buf.windows(2).position(|w| w == b"\r\n") else {
        return Ok(None);
    };
    let line = core::str::from_utf8(&buf[..end]).map_err(|_| NetworkError::MalformedResponse)?;

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") || code.len() != 3 {
        return Err(NetworkError::MalformedResponse);
    }

    code.parse::<u16>()
        .map(Some)
        .map_err(|_| NetworkError::MalformedResponse)
}

/// Sends requests to the report server
#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    /// Send one request. Implementations must give up after `timeout`.
    async fn send(&mut self, request: &HttpRequest<'_>, timeout: Duration) -> Result<HttpResponse, NetworkError>;
}
