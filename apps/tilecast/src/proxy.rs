use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::warn;

const SCHEME_PREFIXES: &[&str] = &["http://", "socks5://", "socks4://"];

/// HTTP proxy used to tunnel one shard's websocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Proxy {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Value for a `Proxy-Authorization` header, when credentials are set.
    pub fn authorization(&self) -> Option<String> {
        self.auth.as_ref().map(|auth| {
            let raw = format!("{}:{}", auth.username, auth.password);
            format!("Basic {}", STANDARD.encode(raw))
        })
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProxyParseError {
    #[error("expected host:port[:user:pass]")]
    Format,
    #[error("empty host")]
    EmptyHost,
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

impl FromStr for Proxy {
    type Err = ProxyParseError;

    /// Parses `[scheme://]host:port[:user:pass]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entry = s.trim();
        for prefix in SCHEME_PREFIXES {
            if let Some(rest) = entry.strip_prefix(prefix) {
                entry = rest;
                break;
            }
        }

        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        if parts.len() < 2 {
            return Err(ProxyParseError::Format);
        }
        let host = parts[0];
        if host.is_empty() {
            return Err(ProxyParseError::EmptyHost);
        }
        let port = parts[1]
            .parse::<u16>()
            .map_err(|_| ProxyParseError::InvalidPort(parts[1].to_string()))?;

        let proxy = Proxy::new(host, port);
        Ok(match parts.as_slice() {
            [_, _, user, pass, ..] => proxy.with_auth(*user, *pass),
            _ => proxy,
        })
    }
}

/// A proxy-list line that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    pub line: usize,
    pub text: String,
    pub error: ProxyParseError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyList {
    pub proxies: Vec<Proxy>,
    pub rejected: Vec<RejectedLine>,
}

/// Parses a line-delimited proxy list. Blank lines and `#` comments are
/// ignored; malformed lines are logged and collected in `rejected`.
pub fn parse_proxy_list(contents: &str) -> ProxyList {
    let mut list = ProxyList::default();
    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<Proxy>() {
            Ok(proxy) => list.proxies.push(proxy),
            Err(error) => {
                warn!(line = index + 1, entry = line, %error, "skipping proxy entry");
                list.rejected.push(RejectedLine {
                    line: index + 1,
                    text: line.to_string(),
                    error,
                });
            }
        }
    }
    list
}

pub fn load_proxy_list(path: &Path) -> std::io::Result<ProxyList> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_proxy_list(&contents))
}
