use std::fmt;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Repeat;

/// Identifies one worker in progress output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLabel {
    pub index: usize,
    pub proxy: Option<String>,
}

impl ShardLabel {
    pub fn new(index: usize, proxy: Option<String>) -> Self {
        Self { index, proxy }
    }

    /// `"[host:port] "` for proxied shards, empty otherwise.
    pub fn prefix(&self) -> String {
        match &self.proxy {
            Some(proxy) => format!("[{proxy}] "),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Stopped,
    Failed,
}

/// Observable progress of a run, in the order a front-end should show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    RunStarted,
    Setting(String),
    Notice(String),
    Connected {
        shard: ShardLabel,
    },
    Repetition {
        shard: ShardLabel,
        pass: u64,
        repeat: Repeat,
    },
    ChunkSent {
        shard: ShardLabel,
        chunk: u64,
    },
    ConnectionClosed {
        shard: ShardLabel,
    },
    ShardFailed {
        shard: ShardLabel,
        error: String,
    },
    AllShardsFinished,
    RunFinished {
        status: RunStatus,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::RunStarted => f.write_str("[INFO] Starting task..."),
            ProgressEvent::Setting(line) => write!(f, "[INFO] {line}"),
            ProgressEvent::Notice(line) => write!(f, "[!] {line}"),
            ProgressEvent::Connected { shard } => write!(f, "{}Connected.", shard.prefix()),
            ProgressEvent::Repetition {
                shard,
                pass,
                repeat,
            } => match repeat {
                Repeat::Finite(total) => {
                    write!(f, "{}[!] Repetition {pass}/{total}", shard.prefix())
                }
                Repeat::Unbounded => write!(
                    f,
                    "{}[!] Repetition {pass} (infinite mode)",
                    shard.prefix()
                ),
            },
            ProgressEvent::ChunkSent { shard, chunk } => {
                write!(f, "{}Sent chunk {chunk}", shard.prefix())
            }
            ProgressEvent::ConnectionClosed { shard } => {
                write!(f, "{}Connection closed.", shard.prefix())
            }
            ProgressEvent::ShardFailed { shard, error } => {
                write!(f, "{}[ERROR] {error}", shard.prefix())
            }
            ProgressEvent::AllShardsFinished => f.write_str("[!] All proxies finished sending."),
            ProgressEvent::RunFinished { status } => match status {
                RunStatus::Completed => f.write_str("[SUCCESS] Task completed successfully"),
                RunStatus::Stopped => f.write_str("[INFO] Task aborted by user"),
                RunStatus::Failed => f.write_str("[ERROR] Task failed"),
            },
        }
    }
}

/// Tracing target every progress line is logged under.
pub const PROGRESS_TARGET: &str = "tilecast::progress";

/// Fans progress out to tracing and, optionally, a front-end channel.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    sink: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Reporter {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sink: Some(tx) }, rx)
    }

    pub fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::ShardFailed { .. } => warn!(target: PROGRESS_TARGET, "{event}"),
            ProgressEvent::RunFinished {
                status: RunStatus::Failed,
            } => warn!(target: PROGRESS_TARGET, "{event}"),
            _ => info!(target: PROGRESS_TARGET, "{event}"),
        }
        if let Some(sink) = &self.sink {
            // receiver gone means nobody is watching; the run carries on
            let _ = sink.send(event);
        }
    }
}
