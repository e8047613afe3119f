//! Codec trait and implementations for turning frames into bytes and back.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The connection and dispatcher don't care HOW frames are serialized:
//! they hold an `Arc<dyn Codec>` and call `encode`/`decode`. The name a
//! codec reports is what the client announces in its handshake, so the
//! hub can pick the matching decoder.
//!
//! - [`BinaryCodec`]: a frame-type byte followed by a MessagePack body
//!   (the default on the wire).
//! - [`JsonCodec`]: human-readable, handy when inspecting traffic.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{DecodeError, Frame, FrameType, Message, ProtocolError};
#[cfg(feature = "json")]
use crate::{Completion, DataMap, Scalar};

/// A codec that can encode frames to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → one codec instance is shared by the connection's
///   reader task and every caller task that sends.
/// - `'static` → it owns everything it needs.
///
/// The methods are not generic, so the trait is object safe and the
/// codec can be chosen at runtime.
pub trait Codec: Send + Sync + 'static {
    /// The protocol name announced in the handshake.
    fn name(&self) -> &'static str;

    /// Serializes a frame into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError`] if a value can't be represented in this
    /// format (e.g. an infinite float in JSON).
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes one complete frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError`] if the bytes are malformed, truncated,
    /// or followed by leftovers. Never panics, whatever the input.
    fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError>;
}

// ---------------------------------------------------------------------------
// BinaryCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] using MessagePack (via `rmp-serde`).
///
/// Each frame is one [`FrameType`] byte followed by the frame's fields as
/// a MessagePack array; `Ping` is the bare byte. Structs are written with
/// field names (`to_vec_named`), so a hub in any language with a
/// MessagePack library can read them.
///
/// ```text
/// ┌──────┬──────────────────────────────────────────────┐
/// │ 0x03 │ [invocation_id, target, {type, data}]        │  Invocation
/// └──────┴──────────────────────────────────────────────┘
/// ```
///
/// ## Example
///
/// ```rust
/// use movehub_protocol::{BinaryCodec, Codec, Frame, Message};
///
/// let codec = BinaryCodec;
/// let frame = Frame::Invocation {
///     invocation_id: Some(7),
///     target: "SendMessage".into(),
///     arguments: Message::Text("Hello World!".into()),
/// };
///
/// let bytes = codec.encode(&frame).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), frame);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![frame.frame_type() as u8];
        match frame {
            Frame::Handshake { protocol, version } => write_body(&mut buf, &(protocol, version))?,
            Frame::HandshakeAck { error } => write_body(&mut buf, error)?,
            Frame::Invocation {
                invocation_id,
                target,
                arguments,
            } => write_body(&mut buf, &(invocation_id, target, arguments))?,
            Frame::Completion {
                invocation_id,
                result,
            } => write_body(&mut buf, &(invocation_id, result))?,
            Frame::Ping => {}
            Frame::Close {
                error,
                allow_reconnect,
            } => write_body(&mut buf, &(error, allow_reconnect))?,
        }
        Ok(buf)
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError> {
        let (&first, body) = data.split_first().ok_or(DecodeError::Truncated)?;
        let frame_type = FrameType::from_u8(first).ok_or(DecodeError::UnknownFrameType(first))?;

        let frame = match frame_type {
            FrameType::Handshake => {
                let (protocol, version) = read_body(body)?;
                Frame::Handshake { protocol, version }
            }
            FrameType::HandshakeAck => Frame::HandshakeAck {
                error: read_body(body)?,
            },
            FrameType::Invocation => {
                let (invocation_id, target, arguments) = read_body(body)?;
                Frame::Invocation {
                    invocation_id,
                    target,
                    arguments,
                }
            }
            FrameType::Completion => {
                let (invocation_id, result) = read_body(body)?;
                Frame::Completion {
                    invocation_id,
                    result,
                }
            }
            FrameType::Ping if body.is_empty() => Frame::Ping,
            FrameType::Ping => return Err(DecodeError::TrailingBytes(body.len()).into()),
            FrameType::Close => {
                let (error, allow_reconnect) = read_body(body)?;
                Frame::Close {
                    error,
                    allow_reconnect,
                }
            }
        };
        Ok(frame)
    }
}

fn write_body<T: Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) -> Result<(), ProtocolError> {
    let body = rmp_serde::to_vec_named(value).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    buf.extend_from_slice(&body);
    Ok(())
}

/// Reads exactly one MessagePack value; anything left over is an error.
fn read_body<T: DeserializeOwned>(mut body: &[u8]) -> Result<T, DecodeError> {
    let value = {
        let mut de = rmp_serde::Deserializer::new(&mut body);
        T::deserialize(&mut de)?
    };
    if !body.is_empty() {
        return Err(DecodeError::TrailingBytes(body.len()));
    }
    Ok(value)
}

/// Encodes a bare [`Message`] as MessagePack.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    rmp_serde::to_vec_named(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a bare [`Message`]. All-or-nothing: trailing bytes are an error.
pub fn decode_message(data: &[u8]) -> Result<Message, DecodeError> {
    read_body(data)
}

/// Reads the frame discriminator of a binary frame without decoding it.
///
/// Returns `None` for empty input or an unknown discriminator.
pub fn peek_frame_type(data: &[u8]) -> Option<FrameType> {
    data.first().copied().and_then(FrameType::from_u8)
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is larger than the binary layout but readable in any WebSocket
/// inspector. This is behind the `json` feature flag (enabled by default).
///
/// JSON has no NaN or infinity, so `encode` refuses frames carrying a
/// non-finite [`Scalar::Float`] instead of writing `null`.
///
/// Note: [`peek_frame_type`] only understands the binary layout. With
/// this codec every frame reaches the full decoder.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        if let Some(key) = frame_payload(frame).and_then(non_finite_key) {
            return Err(ProtocolError::Encode(format!(
                "data value {key:?} is not a finite number"
            )));
        }
        serde_json::to_vec(frame).map_err(ProtocolError::JsonEncode)
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::JsonDecode)
    }
}

#[cfg(feature = "json")]
fn frame_payload(frame: &Frame) -> Option<&Message> {
    match frame {
        Frame::Invocation { arguments, .. } => Some(arguments),
        Frame::Completion {
            result: Completion::Value(msg),
            ..
        } => Some(msg),
        _ => None,
    }
}

/// Returns the key of the first NaN or infinite float in the message.
#[cfg(feature = "json")]
fn non_finite_key(msg: &Message) -> Option<&str> {
    fn in_map(data: &DataMap) -> Option<&str> {
        data.iter()
            .find(|(_, value)| matches!(value, Scalar::Float(x) if !x.is_finite()))
            .map(|(key, _)| key.as_str())
    }

    match msg {
        Message::Text(_) => None,
        Message::KeyValue { data, .. } => in_map(data),
        Message::Move(mv) => in_map(&mv.data),
        Message::MoveList(moves) => moves.iter().find_map(|mv| in_map(&mv.data)),
    }
}

// =========================================================================
// Tests
// =========================================================================
