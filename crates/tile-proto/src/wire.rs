use serde::{Deserialize, Serialize};

use crate::edit::Edit;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode write frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode write frame: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Frames a client sends to the canvas service. Serialized as
/// `{"kind": "write", "edits": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteFrame {
    Write { edits: Vec<Edit> },
}

impl WriteFrame {
    pub fn edits(&self) -> &[Edit] {
        match self {
            WriteFrame::Write { edits } => edits,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WriteFrameRef<'a> {
    Write { edits: &'a [Edit] },
}

/// Encodes one chunk of edits as a single text message.
pub fn encode_write_frame(edits: &[Edit]) -> Result<String, WireError> {
    serde_json::to_string(&WriteFrameRef::Write { edits }).map_err(WireError::Encode)
}

pub fn decode_write_frame(text: &str) -> Result<WriteFrame, WireError> {
    serde_json::from_str(text).map_err(WireError::Decode)
}
