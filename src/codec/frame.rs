//! Frame type and wire rendering

use std::fmt;

use super::DataSetId;

/// One wire-format unit carried by a single optical code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol revision the frame was encoded with
    pub version: u32,

    /// Fingerprint of the data set this frame belongs to
    pub data_set_id: DataSetId,

    /// Zero-based position within the data set
    pub frame_index: usize,

    /// Total number of frames in the data set
    pub frame_count: usize,

    /// Payload substring, space-padded to the chunk size
    pub chunk: String,
}

impl Frame {
    /// Render the `:V:D:I:C:T` wire string.
    pub fn wire(&self) -> String {
        self.to_string()
    }

    /// Whether this is the last frame of its data set.
    pub fn is_last(&self) -> bool {
        self.frame_index + 1 == self.frame_count
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = digit_width(self.frame_count);
        write!(
            f,
            ":{}:{}:{:0width$}:{}:{}",
            self.version,
            self.data_set_id,
            self.frame_index,
            self.frame_count,
            self.chunk,
            width = width
        )
    }
}

/// Number of decimal digits needed to print `n`.
pub(crate) fn digit_width(n: usize) -> usize {
    n.checked_ilog10().map_or(1, |log| log as usize + 1)
}
