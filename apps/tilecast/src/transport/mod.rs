//! Websocket connections to the canvas service, direct or tunnelled through
//! an HTTP proxy.

pub mod tunnel;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{client_async_tls, connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::error::TransportError;
use crate::proxy::Proxy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One open connection a worker writes frames to.
#[async_trait]
pub trait CanvasConnection: Send {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Sends a close frame and releases the connection. Closing an already
    /// closed connection is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens connections; swapped out in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Box<dyn CanvasConnection>, TransportError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        url: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Box<dyn CanvasConnection>, TransportError> {
        Ok(Box::new(connect(url, proxy).await?))
    }
}

/// Write half of a websocket. Incoming messages are drained by a background
/// task so the peer never stalls on a full receive window.
pub struct WebSocketConnection {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

impl WebSocketConnection {
    fn new(stream: WsStream) -> Self {
        let (sink, mut incoming) = stream.split();
        let reader = tokio::spawn(async move {
            while let Some(message) = incoming.next().await {
                match message {
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "server closed websocket");
                        break;
                    }
                    Ok(other) => trace!(len = other.len(), "ignoring inbound message"),
                    Err(err) => {
                        debug!(error = %err, "websocket read ended");
                        break;
                    }
                }
            }
        });
        Self { sink, reader }
    }
}

#[async_trait]
impl CanvasConnection for WebSocketConnection {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.to_owned()))
            .await
            .map_err(TransportError::Send)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let result = match self.sink.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(TransportError::Close(err)),
        };
        self.reader.abort();
        result
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Connects to `url`, tunnelling through `proxy` when one is given.
pub async fn connect(url: &str, proxy: Option<&Proxy>) -> Result<WebSocketConnection, TransportError> {
    let stream = match proxy {
        None => {
            let (stream, _response) = connect_async(url)
                .await
                .map_err(TransportError::Handshake)?;
            stream
        }
        Some(proxy) => {
            let (host, port) = target_of(url)?;
            let tcp = tunnel::open(proxy, &host, port).await?;
            let (stream, _response) = client_async_tls(url, tcp)
                .await
                .map_err(TransportError::Handshake)?;
            stream
        }
    };
    debug!(url, proxy = ?proxy.map(|p| p.to_string()), "websocket connected");
    Ok(WebSocketConnection::new(stream))
}

fn target_of(url: &str) -> Result<(String, u16), TransportError> {
    let invalid = || TransportError::InvalidUrl(url.to_string());
    let parsed = Url::parse(url).map_err(|_| invalid())?;
    let host = parsed.host_str().ok_or_else(invalid)?.to_string();
    let port = parsed.port_or_known_default().ok_or_else(invalid)?;
    Ok((host, port))
}
