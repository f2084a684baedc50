#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tile_proto::{Edit, decode_write_frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Websocket endpoint that records every text frame it receives.
#[derive(Clone)]
pub struct CanvasServer {
    pub url: String,
    frames: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl CanvasServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind canvas");
        let addr = listener.local_addr().expect("canvas addr");
        let server = CanvasServer {
            url: format!("ws://{addr}/ws/"),
            frames: Arc::default(),
            accepted: Arc::default(),
            closed: Arc::default(),
        };
        let state = server.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = state.clone();
                tokio::spawn(async move { state.serve(stream).await });
            }
        });
        server
    }

    async fn serve(&self, stream: TcpStream) {
        let Ok(mut socket) = accept_async(stream).await else {
            return;
        };
        self.accepted.fetch_add(1, Ordering::SeqCst);
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Text(text)) => self.frames.lock().push(text),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.frames()
            .iter()
            .flat_map(|text| decode_write_frame(text).expect("frame").edits().to_vec())
            .collect()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn wait_for_frames(&self, count: usize) {
        while self.frames.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    pub async fn wait_for_closed(&self, count: usize) {
        while self.closed() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

/// Minimal HTTP CONNECT proxy that splices the tunnel to its target.
#[derive(Clone)]
pub struct ConnectProxy {
    pub port: u16,
    tunnels: Arc<AtomicUsize>,
    last_request: Arc<Mutex<String>>,
}

impl ConnectProxy {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind proxy");
        let proxy = ConnectProxy {
            port: listener.local_addr().expect("proxy addr").port(),
            tunnels: Arc::default(),
            last_request: Arc::default(),
        };
        let state = proxy.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = state.clone();
                tokio::spawn(async move { state.serve(stream).await });
            }
        });
        proxy
    }

    async fn serve(&self, mut client: TcpStream) {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match client.read(&mut byte).await {
                Ok(1) => head.push(byte[0]),
                _ => return,
            }
        }
        let head = String::from_utf8_lossy(&head).into_owned();
        *self.last_request.lock() = head.clone();
        let Some(target) = head
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("CONNECT "))
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
        else {
            let _ = client.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            return;
        };
        let Ok(mut upstream) = TcpStream::connect(&target).await else {
            let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
            return;
        };
        if client
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await
            .is_err()
        {
            return;
        }
        self.tunnels.fetch_add(1, Ordering::SeqCst);
        let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
    }

    pub fn entry(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn tunnels(&self) -> usize {
        self.tunnels.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> String {
        self.last_request.lock().clone()
    }
}

/// A file under the system temp dir, removed on drop.
pub struct TempFile {
    pub path: PathBuf,
}

impl TempFile {
    pub fn with_contents(name: &str, contents: impl AsRef<[u8]>) -> Self {
        let path = std::env::temp_dir().join(format!("tilecast-{}-{name}", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).expect("write temp file");
        TempFile { path }
    }

    pub fn png(name: &str, width: u32, height: u32, color: [u8; 3]) -> Self {
        let path = std::env::temp_dir().join(format!("tilecast-{}-{name}", uuid::Uuid::new_v4()));
        image::RgbImage::from_pixel(width, height, image::Rgb(color))
            .save(&path)
            .expect("write png");
        TempFile { path }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
