//! Binary framing for greeting traffic.
//!
//! Greeting commands and responses travel over symmetric duplex
//! channels, so every frame opens with a four byte header: two
//! magic bytes, the wire version and a direction marker. The
//! marker distinguishes command frames from response frames; an
//! endpoint that reads traffic going the wrong way fails at the
//! header instead of misinterpreting the body.

mod v1;
pub use v1::VERSION;

use binary_stream::{
    futures::{Decodable, Encodable},
    Endian, Options,
};

use crate::{Error, Result};

/// Magic bytes opening every frame.
const MAGIC: [u8; 2] = [0xC7, 0x1A];

/// Bytes in a frame header.
const HEADER_LEN: usize = 4;

/// Direction marker for command frames.
const FRAME_COMMAND: u8 = 1;

/// Direction marker for response frames.
const FRAME_RESPONSE: u8 = 2;

/// Upper bound on a frame and on any length-prefixed block
/// inside one.
///
/// Notarize frames carry enveloped credential messages, so the
/// bound is generous relative to a single credential.
pub(crate) const FRAME_LIMIT: usize = 256 * 1024;

/// Frames use network byte order.
fn wire_options() -> Options {
    Options {
        endian: Endian::Big,
        max_buffer_size: Some(FRAME_LIMIT),
    }
}

/// Adapter for domain errors raised inside the stream codec.
pub(crate) fn invalid_data(
    error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, error)
}

/// A message that may travel on the greeting wire.
pub trait Frame: Encodable + Decodable + Default {
    /// Direction marker stamped into the frame header.
    const KIND: u8;
}

impl Frame for crate::Command {
    const KIND: u8 = FRAME_COMMAND;
}

impl Frame for crate::CommandResponse {
    const KIND: u8 = FRAME_RESPONSE;
}

/// Encode a frame, prepending its header.
pub async fn encode<T: Frame>(frame: &T) -> Result<Vec<u8>> {
    let body =
        binary_stream::futures::encode(frame, wire_options())
            .await?;
    let mut framed = Vec::with_capacity(HEADER_LEN + body.len());
    framed.extend_from_slice(&MAGIC);
    framed.push(VERSION);
    framed.push(T::KIND);
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Validate a frame header and decode the body.
pub async fn decode<T: Frame>(
    buffer: impl AsRef<[u8]>,
) -> Result<T> {
    let buffer = buffer.as_ref();
    if buffer.len() < HEADER_LEN {
        return Err(Error::FrameTooShort(buffer.len()));
    }
    let (header, body) = buffer.split_at(HEADER_LEN);
    if header[..2] != MAGIC {
        return Err(Error::BadFrameMagic);
    }
    if header[2] != VERSION {
        return Err(Error::FrameVersion(VERSION, header[2]));
    }
    if header[3] != T::KIND {
        return Err(Error::FrameKind {
            expected: T::KIND,
            actual: header[3],
        });
    }
    Ok(binary_stream::futures::decode(body, wire_options())
        .await?)
}

pub(crate) mod types {
    pub const NOOP: u8 = 0;

    pub const COMMAND_BEGIN: u8 = 1;
    pub const COMMAND_HANDSHAKE: u8 = 2;
    pub const COMMAND_NOTARIZE: u8 = 3;
    pub const COMMAND_FINISH: u8 = 4;
    pub const COMMAND_CLAIM: u8 = 5;

    pub const RESPONSE_BEGAN: u8 = 1;
    pub const RESPONSE_HANDSHOOK: u8 = 2;
    pub const RESPONSE_NOTARIZED: u8 = 3;
    pub const RESPONSE_CLAIMED: u8 = 4;
    pub const RESPONSE_REJECTED: u8 = 255;
}
