//! Frame accumulation for receive sessions

use std::collections::BTreeMap;

use crate::codec::{DataSetId, Frame};

/// Result of offering a frame to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// Stored at its index
    Stored {
        /// Distinct indices held for the tracked data set
        frames_read: usize,
        /// Whether this frame started a new data set
        reset: bool,
    },
    /// Index outside the tracked frame count; dropped
    OutOfRange,
}

/// Buffer of chunks for the data set currently being received.
///
/// Tracks one data set at a time, keyed by data-set id and frame count. A
/// frame with a different key discards everything held so far and switches
/// tracking. The id depends only on the payload, so a sender restarting the
/// same payload with another chunk size shows up as a count change.
#[derive(Debug, Default, Clone)]
pub struct FrameAccumulator {
    data_set_id: Option<DataSetId>,
    frame_count: usize,
    chunks: BTreeMap<usize, String>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame. Re-inserting an index overwrites it.
    pub fn insert(&mut self, frame: &Frame) -> Insert {
        if frame.frame_index >= frame.frame_count {
            return Insert::OutOfRange;
        }

        let reset = self.data_set_id != Some(frame.data_set_id)
            || self.frame_count != frame.frame_count;
        if reset {
            self.data_set_id = Some(frame.data_set_id);
            self.frame_count = frame.frame_count;
            self.chunks.clear();
        }

        self.chunks.insert(frame.frame_index, frame.chunk.clone());
        Insert::Stored { frames_read: self.chunks.len(), reset }
    }

    pub fn data_set_id(&self) -> Option<DataSetId> {
        self.data_set_id
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn frames_read(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_complete(&self) -> bool {
        self.data_set_id.is_some() && self.chunks.len() == self.frame_count
    }

    /// Join all chunks in index order once every index has arrived.
    ///
    /// Padding on the final chunk is kept.
    pub fn assemble(&self) -> Option<String> {
        self.is_complete().then(|| self.chunks.values().map(String::as_str).collect())
    }
}
