use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TransportError;
use crate::proxy::Proxy;

const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Opens a TCP stream to `host:port` through an HTTP `CONNECT` proxy.
pub async fn open(proxy: &Proxy, host: &str, port: u16) -> Result<TcpStream, TransportError> {
    let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|source| TransportError::ProxyConnect {
            proxy: proxy.to_string(),
            source,
        })?;
    let _ = stream.set_nodelay(true);

    stream
        .write_all(connect_request(proxy, host, port).as_bytes())
        .await?;
    let head = read_response_head(&mut stream)
        .await?
        .ok_or_else(|| TransportError::ProxyProtocol {
            proxy: proxy.to_string(),
        })?;
    let status_line = head.lines().next().unwrap_or_default().trim().to_string();
    match status_code(&status_line) {
        Some(200) => {
            debug!(proxy = %proxy, target = %format!("{host}:{port}"), "proxy tunnel established");
            Ok(stream)
        }
        Some(_) => Err(TransportError::ProxyRefused {
            proxy: proxy.to_string(),
            status: status_line,
        }),
        None => Err(TransportError::ProxyProtocol {
            proxy: proxy.to_string(),
        }),
    }
}

fn connect_request(proxy: &Proxy, host: &str, port: u16) -> String {
    let authority = format!("{host}:{port}");
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(credentials) = proxy.authorization() {
        request.push_str("Proxy-Authorization: ");
        request.push_str(&credentials);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    request
}

/// Reads up to and including the blank line ending the response head.
/// Reads byte by byte so nothing after the head is consumed. Returns `None`
/// on EOF or an oversized head.
async fn read_response_head<R>(reader: &mut R) -> Result<Option<String>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Ok(None);
        }
        if reader.read(&mut byte).await? == 0 {
            return Ok(None);
        }
        head.push(byte[0]);
    }
    Ok(Some(String::from_utf8_lossy(&head).into_owned()))
}

fn status_code(status_line: &str) -> Option<u16> {
    let mut parts = status_line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
