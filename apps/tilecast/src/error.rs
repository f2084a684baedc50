use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tile_proto::WireError;

use crate::config::Mode;
use crate::proxy::ProxyParseError;

/// Problems detected before any connection is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source file does not exist: {0}")]
    MissingSource(PathBuf),
    #[error("{mode} mode requires a proxy list file")]
    MissingProxyList { mode: Mode },
    #[error("proxy list file does not exist: {0}")]
    ProxyListNotFound(PathBuf),
    #[error("failed to read proxy list {path:?}: {source}")]
    ProxyListRead { path: PathBuf, source: io::Error },
    #[error("proxy list {0:?} contains no usable proxies")]
    EmptyProxyList(PathBuf),
    #[error("invalid proxy '{entry}': {source}")]
    InvalidProxy {
        entry: String,
        source: ProxyParseError,
    },
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk size must be a whole number, got '{0}'")]
    InvalidChunkSize(String),
    #[error("repeat must be a positive integer or 'inf', got '{0}'")]
    InvalidRepeat(String),
    #[error("delay must be a finite, non-negative number of seconds, got '{0}'")]
    InvalidDelay(String),
    #[error("invalid server url '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },
}

/// Failures loading the drawing source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to decode image {path:?}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Per-connection failures. A worker that hits one of these stops and closes
/// its connection; sibling workers keep running.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid websocket url '{0}'")]
    InvalidUrl(String),
    #[error("failed to reach proxy {proxy}: {source}")]
    ProxyConnect { proxy: String, source: io::Error },
    #[error("proxy {proxy} refused tunnel: {status}")]
    ProxyRefused { proxy: String, status: String },
    #[error("proxy {proxy} sent a malformed response")]
    ProxyProtocol { proxy: String },
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("send failed: {0}")]
    Send(#[source] tokio_tungstenite::tungstenite::Error),
    #[error("close failed: {0}")]
    Close(#[source] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("a run is already in progress")]
    AlreadyRunning,
}
