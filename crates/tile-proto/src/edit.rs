use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::color::Rgb;
use crate::coords::TileCoord;

/// One content + colour write to a single canvas cell.
///
/// On the wire an edit is a positional array:
/// `[block_row, block_col, sub_row, sub_col, timestamp, content, sequence_index, fg, bg?]`.
/// The background slot is only present when the edit carries a background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub coord: TileCoord,
    pub timestamp: i64,
    pub content: char,
    pub sequence_index: u64,
    pub foreground: Rgb,
    pub background: Option<Rgb>,
}

impl Edit {
    /// Copy of this edit with the wall-clock field cleared, for comparisons
    /// across encoding passes.
    pub fn without_timestamp(&self) -> Edit {
        Edit {
            timestamp: 0,
            ..self.clone()
        }
    }
}

impl Serialize for Edit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.background.is_some() { 9 } else { 8 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.coord.block_row)?;
        seq.serialize_element(&self.coord.block_col)?;
        seq.serialize_element(&self.coord.sub_row)?;
        seq.serialize_element(&self.coord.sub_col)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.content)?;
        seq.serialize_element(&self.sequence_index)?;
        seq.serialize_element(&self.foreground.packed())?;
        if let Some(background) = self.background {
            seq.serialize_element(&background.packed())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Edit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(EditVisitor)
    }
}

struct EditVisitor;

impl<'de> Visitor<'de> for EditVisitor {
    type Value = Edit;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an edit array of 8 or 9 elements")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Edit, A::Error> {
        fn next<'de, T: Deserialize<'de>, A: SeqAccess<'de>>(
            seq: &mut A,
            index: usize,
        ) -> Result<T, A::Error> {
            seq.next_element()?
                .ok_or_else(|| de::Error::invalid_length(index, &EditVisitor))
        }

        let block_row = next(&mut seq, 0)?;
        let block_col = next(&mut seq, 1)?;
        let sub_row = next(&mut seq, 2)?;
        let sub_col = next(&mut seq, 3)?;
        let timestamp = next(&mut seq, 4)?;
        let content = next(&mut seq, 5)?;
        let sequence_index = next(&mut seq, 6)?;
        let foreground: u32 = next(&mut seq, 7)?;
        let background: Option<u32> = seq.next_element()?;
        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(10, &self));
        }
        Ok(Edit {
            coord: TileCoord {
                block_row,
                block_col,
                sub_row,
                sub_col,
            },
            timestamp,
            content,
            sequence_index,
            foreground: Rgb::from_packed(foreground),
            background: background.map(Rgb::from_packed),
        })
    }
}
