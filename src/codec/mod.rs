//! Frame codec: payload strings to ordered wire strings and back.
//!
//! A payload is split into fixed-size character chunks. Each chunk becomes
//! one frame whose wire form is
//!
//! ```text
//! :V:D:I:C:T
//! ```
//!
//! - `V` protocol version ([`PROTOCOL_VERSION`])
//! - `D` five hex digit [`DataSetId`]
//! - `I` frame index, zero-padded to the digit width of `C`
//! - `C` frame count
//! - `T` chunk text, space-padded to the chunk size; may contain `:`
//!
//! Decoding never fails loudly. Scanners see plenty of codes that are not
//! ours, so anything that does not parse is reported as [`Unrecognized`] and
//! the caller treats it as noise.
//!
//! ```rust
//! use qrsync::codec;
//!
//! let wires = codec::encode("The quick brown fox", 10);
//! assert_eq!(wires.len(), 2);
//!
//! let frame = codec::decode(&wires[1]).unwrap();
//! assert_eq!(frame.frame_index, 1);
//! assert_eq!(frame.chunk, "brown fox ");
//! ```

mod data_set;
mod frame;

pub use data_set::{DATA_SET_ID_LEN, DataSetId, InvalidDataSetId};
pub use frame::Frame;

use thiserror::Error;

/// The only frame encoding revision this crate reads and writes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Smallest chunk size a session will use.
pub const MIN_CHUNK_SIZE: usize = 25;

/// Largest chunk size a session will use.
pub const MAX_CHUNK_SIZE: usize = 150;

/// Chunk size used when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Clamp a requested chunk size into the supported range.
pub fn clamp_chunk_size(chunk_size: usize) -> usize {
    chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

/// Why a scanned string was not accepted as a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unrecognized {
    #[error("not a frame")]
    Malformed,

    #[error("unsupported frame version {found}")]
    UnsupportedVersion { found: u32 },
}

/// A payload split into frames that share one data-set id.
#[derive(Debug, Clone)]
pub struct EncodedDataSet {
    pub data_set_id: DataSetId,
    pub frames: Vec<Frame>,
}

impl EncodedDataSet {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Wire strings in frame order.
    pub fn wires(&self) -> Vec<String> {
        self.frames.iter().map(Frame::wire).collect()
    }
}

/// Split `payload` into chunks of `chunk_size` characters.
///
/// Splits on `char` boundaries; the last chunk may be shorter. An empty
/// payload yields no chunks.
pub fn split_chunks(payload: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(payload.len().div_ceil(chunk_size));
    let mut chars = payload.chars().peekable();
    while chars.peek().is_some() {
        chunks.push(chars.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Encode a serialized payload into typed frames.
///
/// `chunk_size` is used as given; sessions clamp it with
/// [`clamp_chunk_size`] before calling.
pub fn encode_frames(payload: &str, chunk_size: usize) -> EncodedDataSet {
    let chunk_size = chunk_size.max(1);
    let data_set_id = DataSetId::for_payload(payload);
    let chunks = split_chunks(payload, chunk_size);
    let frame_count = chunks.len();

    let frames = chunks
        .into_iter()
        .enumerate()
        .map(|(frame_index, chunk)| Frame {
            version: PROTOCOL_VERSION,
            data_set_id,
            frame_index,
            frame_count,
            chunk: pad_chunk(chunk, chunk_size),
        })
        .collect();

    EncodedDataSet { data_set_id, frames }
}

/// Encode a serialized payload into ordered wire strings.
pub fn encode(payload: &str, chunk_size: usize) -> Vec<String> {
    encode_frames(payload, chunk_size).wires()
}

/// Parse one scanned string.
pub fn decode(wire: &str) -> Result<Frame, Unrecognized> {
    let rest = wire.strip_prefix(':').ok_or(Unrecognized::Malformed)?;
    let mut fields = rest.splitn(5, ':');

    let version = fields.next().and_then(parse_decimal).ok_or(Unrecognized::Malformed)?;
    if version != PROTOCOL_VERSION {
        return Err(Unrecognized::UnsupportedVersion { found: version });
    }

    let data_set_id: DataSetId = fields
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or(Unrecognized::Malformed)?;
    let frame_index = fields.next().and_then(parse_decimal).ok_or(Unrecognized::Malformed)?;
    let frame_count = fields.next().and_then(parse_decimal).ok_or(Unrecognized::Malformed)?;
    let chunk = fields.next().filter(|text| !text.is_empty()).ok_or(Unrecognized::Malformed)?;

    if frame_index >= frame_count {
        return Err(Unrecognized::Malformed);
    }

    Ok(Frame { version, data_set_id, frame_index, frame_count, chunk: chunk.to_string() })
}

fn parse_decimal<T: std::str::FromStr>(field: &str) -> Option<T> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn pad_chunk(mut chunk: String, chunk_size: usize) -> String {
    let len = chunk.chars().count();
    if len < chunk_size {
        chunk.extend(std::iter::repeat_n(' ', chunk_size - len));
    }
    chunk
}
