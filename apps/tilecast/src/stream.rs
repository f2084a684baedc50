use std::num::NonZeroUsize;
use std::time::Duration;

use tile_proto::{encode_write_frame, Edit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{Repeat, RunConfig};
use crate::error::TransportError;
use crate::progress::{ProgressEvent, Reporter, ShardLabel};
use crate::proxy::Proxy;
use crate::transport::{CanvasConnection, Connector};

/// Lifecycle of one worker's connection. `Aborted` marks a cancellation and
/// is always followed by `Closing` and `Closed`; every run ends in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Streaming,
    Closing,
    Closed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub chunk_size: NonZeroUsize,
    pub delay: Duration,
    pub repeat: Repeat,
}

impl StreamSettings {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            delay: config.delay,
            repeat: config.repeat,
        }
    }
}

#[derive(Debug)]
pub enum StreamOutcome {
    Completed { chunks_sent: u64 },
    Aborted { chunks_sent: u64 },
    Failed { chunks_sent: u64, error: TransportError },
}

impl StreamOutcome {
    pub fn chunks_sent(&self) -> u64 {
        match self {
            StreamOutcome::Completed { chunks_sent }
            | StreamOutcome::Aborted { chunks_sent }
            | StreamOutcome::Failed { chunks_sent, .. } => *chunks_sent,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }
}

/// Encodes `edits` into one wire frame per chunk.
pub fn encode_frames(edits: &[Edit], chunk_size: NonZeroUsize) -> Result<Vec<String>, TransportError> {
    edits
        .chunks(chunk_size.get())
        .map(|chunk| encode_write_frame(chunk).map_err(TransportError::from))
        .collect()
}

/// Streams one shard's edits over one connection.
pub struct BatchStreamer {
    settings: StreamSettings,
    shard: ShardLabel,
    reporter: Reporter,
    state: StreamState,
}

impl BatchStreamer {
    pub fn new(settings: StreamSettings, shard: ShardLabel, reporter: Reporter) -> Self {
        Self {
            settings,
            shard,
            reporter,
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    fn transition(&mut self, next: StreamState) {
        debug!(shard = self.shard.index, from = ?self.state, to = ?next, "stream state");
        self.state = next;
    }

    /// Connects, streams every pass, then closes. The connection is closed
    /// however streaming ends; an empty edit list never connects.
    pub async fn run(
        &mut self,
        connector: &dyn Connector,
        url: &str,
        proxy: Option<&Proxy>,
        edits: &[Edit],
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        if edits.is_empty() {
            debug!(shard = self.shard.index, "no edits for shard");
            self.transition(StreamState::Closed);
            return StreamOutcome::Completed { chunks_sent: 0 };
        }

        self.transition(StreamState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.transition(StreamState::Aborted);
                self.transition(StreamState::Closed);
                return StreamOutcome::Aborted { chunks_sent: 0 };
            }
            result = connector.connect(url, proxy) => result,
        };
        let mut connection = match connected {
            Ok(connection) => connection,
            Err(error) => {
                self.transition(StreamState::Closed);
                return StreamOutcome::Failed {
                    chunks_sent: 0,
                    error,
                };
            }
        };
        self.transition(StreamState::Open);
        self.reporter.emit(ProgressEvent::Connected {
            shard: self.shard.clone(),
        });

        let outcome = self.stream(connection.as_mut(), edits, cancel).await;

        self.transition(StreamState::Closing);
        if let Err(err) = connection.close().await {
            debug!(shard = self.shard.index, error = %err, "close failed");
        }
        self.transition(StreamState::Closed);
        self.reporter.emit(ProgressEvent::ConnectionClosed {
            shard: self.shard.clone(),
        });
        outcome
    }

    /// Sends every chunk of `edits` once per pass on an already open
    /// connection. Cancellation is checked before each pass and each chunk,
    /// and interrupts an in-flight send or delay.
    pub async fn stream(
        &mut self,
        connection: &mut dyn CanvasConnection,
        edits: &[Edit],
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let mut chunks_sent = 0u64;
        let frames = match encode_frames(edits, self.settings.chunk_size) {
            Ok(frames) => frames,
            Err(error) => return StreamOutcome::Failed { chunks_sent, error },
        };
        if frames.is_empty() {
            return StreamOutcome::Completed { chunks_sent };
        }

        self.transition(StreamState::Streaming);
        let mut passes = 0u64;
        while self.settings.repeat.allows(passes) {
            if cancel.is_cancelled() {
                return self.aborted(chunks_sent);
            }
            passes += 1;
            self.reporter.emit(ProgressEvent::Repetition {
                shard: self.shard.clone(),
                pass: passes,
                repeat: self.settings.repeat,
            });

            for (index, frame) in frames.iter().enumerate() {
                if cancel.is_cancelled() {
                    return self.aborted(chunks_sent);
                }
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.aborted(chunks_sent),
                    sent = connection.send_text(frame) => sent,
                };
                if let Err(error) = sent {
                    warn!(
                        shard = self.shard.index,
                        proxy = ?self.shard.proxy,
                        repetition = passes,
                        chunk = index + 1,
                        error = %error,
                        "send failed"
                    );
                    return StreamOutcome::Failed { chunks_sent, error };
                }
                chunks_sent += 1;
                self.reporter.emit(ProgressEvent::ChunkSent {
                    shard: self.shard.clone(),
                    chunk: index as u64 + 1,
                });

                if !self.settings.delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.aborted(chunks_sent),
                        _ = tokio::time::sleep(self.settings.delay) => {}
                    }
                }
            }
        }
        StreamOutcome::Completed { chunks_sent }
    }

    fn aborted(&mut self, chunks_sent: u64) -> StreamOutcome {
        self.transition(StreamState::Aborted);
        StreamOutcome::Aborted { chunks_sent }
    }
}
