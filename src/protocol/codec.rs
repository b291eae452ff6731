use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{
    DecodeError, Error, GroupId, MessageType, BODY_LEN, SENDER_ID_LEN, WIRE_SIZE,
};
use crate::util::truncate_utf8;
use super::message::Message;

/// Fixed-size frame codec
///
/// Layout, little-endian, no padding:
///
/// ```text
/// sender_id[20] | body[180] | message_type[1] | group_id[1] | sequence_number[4] | timestamp[8]
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new frame codec
    pub fn new() -> Self {
        FrameCodec
    }

    /// Encodes a message into exactly [`WIRE_SIZE`] bytes
    pub fn encode(message: &Message) -> Bytes {
        let mut dst = BytesMut::with_capacity(WIRE_SIZE);
        Self::encode_into(message, &mut dst);
        dst.freeze()
    }

    /// Decodes the first [`WIRE_SIZE`] bytes of `src`; anything after is ignored
    pub fn decode(src: &[u8]) -> Result<Message, DecodeError> {
        if src.len() < WIRE_SIZE {
            return Err(DecodeError::TooShort {
                expected: WIRE_SIZE,
                actual: src.len(),
            });
        }

        let mut buf = &src[..WIRE_SIZE];
        let sender_id = get_fixed_str(&mut buf, SENDER_ID_LEN);
        let body = get_fixed_str(&mut buf, BODY_LEN);
        let message_type = MessageType::from(buf.get_u8());
        let group_id = GroupId(buf.get_u8());
        let sequence_number = buf.get_u32_le();
        let timestamp = buf.get_u64_le();

        Ok(Message {
            sender_id,
            body,
            message_type,
            group_id,
            sequence_number,
            timestamp,
        })
    }

    fn encode_into(message: &Message, dst: &mut BytesMut) {
        dst.reserve(WIRE_SIZE);
        put_fixed_str(dst, &message.sender_id, SENDER_ID_LEN);
        put_fixed_str(dst, &message.body, BODY_LEN);
        dst.put_u8(message.message_type.into());
        dst.put_u8(message.group_id.0);
        dst.put_u32_le(message.sequence_number);
        dst.put_u64_le(message.timestamp);
    }
}

/// Writes `text` into a NUL-padded field of `capacity` bytes, keeping the last byte NUL
fn put_fixed_str(dst: &mut BytesMut, text: &str, capacity: usize) {
    let text = truncate_utf8(text, capacity - 1);
    dst.put_slice(text.as_bytes());
    dst.put_bytes(0, capacity - text.len());
}

/// Reads a field of `capacity` bytes, forcing a terminator into the last byte
fn get_fixed_str(src: &mut &[u8], capacity: usize) -> String {
    let mut field = src[..capacity].to_vec();
    src.advance(capacity);
    field[capacity - 1] = 0;
    let end = field.iter().position(|&b| b == 0).unwrap_or(capacity - 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Stream framing: frames are laid back to back with no delimiter
impl Decoder for FrameCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < WIRE_SIZE {
            // Need more data for a full frame
            src.reserve(WIRE_SIZE - src.len());
            return Ok(None);
        }

        let frame = src.split_to(WIRE_SIZE);
        Ok(Some(FrameCodec::decode(&frame)?))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        FrameCodec::encode_into(&item, dst);
        Ok(())
    }
}

impl<'a> Encoder<&'a Message> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: &'a Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        FrameCodec::encode_into(item, dst);
        Ok(())
    }
}
