//! Inbound framing for worker connections.
//!
//! The worker moves opaque bytes; by default every chunk read from the socket
//! becomes one inbound message ([`Framing::Raw`]). Callers that know their
//! peer's message layout can ask the worker to split the stream itself:
//!
//! - [`Framing::Fixed`] — every message is exactly `length` bytes.
//! - [`Framing::LengthHeader`] — a big-endian header of `header_size` bytes
//!   holds the total message length, header included. The delivered message
//!   keeps its header.
//!
//! [`FrameCodec`] is the [`Decoder`] driven by the service loop through
//! [`tokio_util::codec::FramedRead`].

use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tokio_util::codec::{BytesCodec, Decoder, LengthDelimitedCodec};

use crate::{AppError, Result};

/// Largest header width a length header can use.
pub const MAX_HEADER_BYTES: usize = 8;

/// How the inbound byte stream is split into messages.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Framing {
    /// Each chunk read from the socket is one message.
    #[default]
    Raw,
    /// Messages have a fixed size in bytes.
    Fixed {
        /// Exact message length.
        length: usize,
    },
    /// Messages start with a big-endian total-length header.
    LengthHeader {
        /// Header width in bytes (1..=8).
        header_size: usize,
    },
}

impl Framing {
    /// Check the framing parameters against the frame size limit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a size is zero, a header is wider than
    /// [`MAX_HEADER_BYTES`], or a fixed length exceeds `max_frame_bytes`.
    pub fn validate(self, max_frame_bytes: usize) -> Result<()> {
        match self {
            Self::Raw => Ok(()),
            Self::Fixed { length } if length == 0 => Err(AppError::Config(
                "fixed framing length must be greater than zero".into(),
            )),
            Self::Fixed { length } if length > max_frame_bytes => Err(AppError::Config(format!(
                "fixed framing length {length} exceeds max_frame_bytes {max_frame_bytes}"
            ))),
            Self::Fixed { .. } => Ok(()),
            Self::LengthHeader { header_size }
                if header_size == 0 || header_size > MAX_HEADER_BYTES =>
            {
                Err(AppError::Config(format!(
                    "length header size must be between 1 and {MAX_HEADER_BYTES}, got {header_size}"
                )))
            }
            Self::LengthHeader { .. } => Ok(()),
        }
    }
}

/// Inbound decoder selected by [`Framing`].
#[derive(Debug)]
pub enum FrameCodec {
    /// Pass-through chunks.
    Raw(BytesCodec),
    /// Fixed-size messages.
    Fixed {
        /// Exact message length.
        length: usize,
    },
    /// Total-length header messages.
    LengthHeader {
        /// Header width in bytes.
        header_size: usize,
        /// Frame splitter; the header value counts itself.
        inner: LengthDelimitedCodec,
    },
}

impl FrameCodec {
    /// Build the decoder for `framing`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the framing parameters are invalid.
    pub fn new(framing: Framing, max_frame_bytes: usize) -> Result<Self> {
        framing.validate(max_frame_bytes)?;

        let codec = match framing {
            Framing::Raw => Self::Raw(BytesCodec::new()),
            Framing::Fixed { length } => Self::Fixed { length },
            Framing::LengthHeader { header_size } => Self::LengthHeader {
                header_size,
                inner: LengthDelimitedCodec::builder()
                    .length_field_offset(0)
                    .length_field_length(header_size)
                    .length_adjustment(0)
                    .num_skip(0)
                    .max_frame_length(max_frame_bytes)
                    .big_endian()
                    .new_codec(),
            },
        };

        Ok(codec)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self {
            Self::Raw(inner) => inner
                .decode(src)
                .map(|chunk| chunk.map(BytesMut::freeze))
                .map_err(map_io_error),
            Self::Fixed { length } => {
                if src.len() < *length {
                    src.reserve(*length - src.len());
                    return Ok(None);
                }
                Ok(Some(src.split_to(*length).freeze()))
            }
            Self::LengthHeader { header_size, inner } => {
                // The header is never skipped, so `src` always starts with the
                // current frame's header.
                if src.len() >= *header_size {
                    let total = src[..*header_size]
                        .iter()
                        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
                    if usize::try_from(total).is_ok_and(|total| total < *header_size) {
                        return Err(AppError::Read(format!(
                            "framing error: length header value {total} is smaller than the {header_size}-byte header"
                        )));
                    }
                }
                inner
                    .decode(src)
                    .map(|frame| frame.map(BytesMut::freeze))
                    .map_err(map_io_error)
            }
        }
    }
}

fn map_io_error(err: std::io::Error) -> AppError {
    AppError::Read(format!("framing error: {err}"))
}
