//! In-memory connector for exercising streaming and dispatch without sockets.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::proxy::Proxy;
use crate::transport::{CanvasConnection, Connector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub proxy: Option<String>,
    pub text: String,
}

#[derive(Debug, Default)]
struct Shared {
    frames: Vec<SentFrame>,
    connects: Vec<Option<String>>,
    closes: usize,
}

/// Records every frame; optionally fails sends after a budget or refuses
/// particular proxies.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    shared: Arc<Mutex<Shared>>,
    fail_after: Option<usize>,
    refuse: Vec<String>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each connection fails its send after `sends` successful ones.
    pub fn failing_after(mut self, sends: usize) -> Self {
        self.fail_after = Some(sends);
        self
    }

    pub fn refusing(mut self, proxy: impl Into<String>) -> Self {
        self.refuse.push(proxy.into());
        self
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.shared.lock().frames.clone()
    }

    pub fn frames_via(&self, proxy: Option<&str>) -> Vec<String> {
        self.shared
            .lock()
            .frames
            .iter()
            .filter(|frame| frame.proxy.as_deref() == proxy)
            .map(|frame| frame.text.clone())
            .collect()
    }

    pub fn connects(&self) -> Vec<Option<String>> {
        self.shared.lock().connects.clone()
    }

    pub fn closes(&self) -> usize {
        self.shared.lock().closes
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(
        &self,
        _url: &str,
        proxy: Option<&Proxy>,
    ) -> Result<Box<dyn CanvasConnection>, TransportError> {
        let label = proxy.map(ToString::to_string);
        self.shared.lock().connects.push(label.clone());
        if let Some(name) = &label {
            if self.refuse.contains(name) {
                return Err(TransportError::ProxyRefused {
                    proxy: name.clone(),
                    status: "HTTP/1.1 403 Forbidden".into(),
                });
            }
        }
        Ok(Box::new(RecordingConnection {
            shared: Arc::clone(&self.shared),
            proxy: label,
            remaining: self.fail_after,
        }))
    }
}

struct RecordingConnection {
    shared: Arc<Mutex<Shared>>,
    proxy: Option<String>,
    remaining: Option<usize>,
}

#[async_trait]
impl CanvasConnection for RecordingConnection {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "recording connection closed",
                )));
            }
            *remaining -= 1;
        }
        self.shared.lock().frames.push(SentFrame {
            proxy: self.proxy.clone(),
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.shared.lock().closes += 1;
        Ok(())
    }
}
