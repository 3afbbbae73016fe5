//! Game-message framing.
//!
//! Every frame is `opcode [length] payload`. The opcode byte is offset by the
//! next value of a per-direction keystream; the length is absent, one byte,
//! or a big-endian short depending on the packet. Inbound lengths come from a
//! fixed table indexed by the de-obfuscated opcode.
//!
//! Decoding is sans-IO: feed bytes into a `BytesMut` and pull frames out with
//! [`FrameDecoder::decode`].

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::cursor::WriteCursor;

/// Outbound opcodes.
pub mod outbound {
    pub const MOB_UPDATE: u8 = 65;
    pub const SIDEBAR_WIDGET: u8 = 71;
    pub const CONSTRUCT_REGION: u8 = 73;
    pub const PLAYER_UPDATE: u8 = 81;
    pub const CLIENT_CONFIG: u8 = 36;
    pub const ITEM_INTERFACE: u8 = 53;
    pub const LOGOUT: u8 = 109;
    pub const RUN_ENERGY: u8 = 110;
    pub const INTERFACE_TEXT: u8 = 126;
    pub const SKILL: u8 = 134;
    pub const ITEM_ON_INTERFACE: u8 = 246;
    pub const LOGIN_DETAILS: u8 = 249;
    pub const CHATBOX_MESSAGE: u8 = 253;
}

/// Inbound opcodes with handlers.
pub mod inbound {
    pub const CHAT: u8 = 4;
    pub const EQUIP_ITEM: u8 = 41;
    pub const ATTACK_MOB: u8 = 72;
    pub const WALK_TO: u8 = 98;
    pub const COMMAND: u8 = 103;
    pub const UNEQUIP_ITEM: u8 = 145;
    pub const FIRST_CLICK_MOB: u8 = 155;
    pub const STANDARD_WALK: u8 = 164;
    pub const ACTION_BUTTON: u8 = 185;
    pub const MAP_WALK: u8 = 248;
}

/// Inbound payload sizes by opcode. `-1` means a length byte follows.
#[rustfmt::skip]
pub const PACKET_SIZES: [i8; 256] = [
    0,  0,  0,  1, -1,  0,  0,  0,  0,  0,  0,  0,  0,  0,  8,  0,
    6,  2,  2,  0,  0,  2,  0,  6,  0, 12,  0,  0,  0,  0,  0,  0,
    0,  0,  0,  8,  4,  0,  0,  2,  2,  6,  0,  6,  0, -1,  0,  0,
    0,  0,  0,  0,  0, 12,  0,  0,  0,  0,  8,  0,  0,  8,  0,  0,
    0,  0,  0,  0,  0,  0,  6,  0,  2,  2,  8,  6,  0, -1,  0,  6,
    0,  0,  0,  0,  0,  1,  4,  6,  0,  0,  0,  0,  0,  0,  0,  3,
    0,  0, -1,  0,  0, 13,  0, -1,  0,  0,  0,  0,  0,  0,  0,  0,
    0,  0,  0,  0,  0,  6,  0,  0,  1,  0,  6,  0,  0,  0, -1,  0,
    2,  6,  0,  4,  6,  8,  0,  6,  0,  0,  0,  2,  0,  0,  0,  0,
    0,  6,  0,  0,  0,  0,  0,  0,  1,  2,  0,  2,  6,  0,  0,  0,
    0,  0,  0,  0, -1, -1,  0,  0,  0,  0,  0,  0,  0,  0,  0,  0,
    0,  0,  0,  0,  0,  8,  0,  3,  0,  2,  0,  0,  8,  1,  0,  0,
   12,  0,  0,  0,  0,  0,  0,  0,  2,  0,  0,  0,  0,  0,  0,  0,
    4,  0,  4,  0,  0,  0,  7,  8,  0,  0, 10,  0,  0,  0,  0,  0,
    0,  0, -1,  0,  6,  0,  1,  0,  0,  0,  6,  0,  6,  8,  1,  0,
    0,  4,  0,  0,  0,  0, -1,  0, -1,  4,  0,  0,  6,  6,  0,  0,
];

/// How an inbound opcode's payload length is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    Fixed(usize),
    VariableByte,
    /// The stream can no longer be trusted.
    Malformed,
}

pub fn frame_size(opcode: u8) -> FrameSize {
    match PACKET_SIZES[opcode as usize] {
        n if n >= 0 => FrameSize::Fixed(n as usize),
        -1 => FrameSize::VariableByte,
        _ => FrameSize::Malformed,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("opcode {opcode} marks the stream as malformed")]
    Malformed { opcode: u8 },
    #[error("connection closed inside frame {opcode}")]
    Truncated { opcode: u8 },
    #[error("payload of {len} bytes does not fit a {header:?} header")]
    Oversized { len: usize, header: PacketHeader },
}

/// Opcode obfuscation stream. One value is consumed per frame.
pub trait Keystream: Send {
    fn next_value(&mut self) -> u32;
}

/// Builds keystreams from the four login seeds.
pub trait KeystreamFactory: Send + Sync {
    fn create(&self, seeds: [u32; 4]) -> Box<dyn Keystream>;
}

/// Keystream that never offsets anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughKeystream;

impl Keystream for PassthroughKeystream {
    fn next_value(&mut self) -> u32 {
        0
    }
}

impl KeystreamFactory for PassthroughKeystream {
    fn create(&self, _seeds: [u32; 4]) -> Box<dyn Keystream> {
        Box::new(PassthroughKeystream)
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn new_unique() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Length prefix style of an outbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeader {
    Fixed,
    VariableByte,
    VariableShort,
}

/// A built outbound packet, not yet framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: u8,
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(opcode: u8, header: PacketHeader, payload: WriteCursor) -> Self {
        Self {
            opcode,
            header,
            payload: payload.freeze(),
        }
    }

    pub fn fixed(opcode: u8, payload: WriteCursor) -> Self {
        Self::new(opcode, PacketHeader::Fixed, payload)
    }

    pub fn empty(opcode: u8) -> Self {
        Self::new(opcode, PacketHeader::Fixed, WriteCursor::new())
    }

    /// Writes the framed packet, consuming one keystream value.
    pub fn encode(&self, keystream: &mut dyn Keystream, out: &mut BytesMut) -> Result<(), FrameError> {
        let len = self.payload.len();
        let fits = match self.header {
            PacketHeader::Fixed => true,
            PacketHeader::VariableByte => len <= u8::MAX as usize,
            PacketHeader::VariableShort => len <= u16::MAX as usize,
        };
        if !fits {
            return Err(FrameError::Oversized {
                len,
                header: self.header,
            });
        }

        out.reserve(3 + len);
        out.put_u8(self.opcode.wrapping_add(keystream.next_value() as u8));
        match self.header {
            PacketHeader::Fixed => {}
            PacketHeader::VariableByte => out.put_u8(len as u8),
            PacketHeader::VariableShort => out.put_u16(len as u16),
        }
        out.extend_from_slice(&self.payload);
        Ok(())
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub opcode: u8,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Opcode,
    Length { opcode: u8 },
    Payload { opcode: u8, len: usize },
}

/// Incremental inbound frame decoder.
///
/// A partially received frame is remembered, so the keystream advances
/// exactly once per frame no matter how the bytes arrive.
pub struct FrameDecoder {
    keystream: Box<dyn Keystream>,
    state: DecodeState,
}

impl FrameDecoder {
    pub fn new(keystream: Box<dyn Keystream>) -> Self {
        Self {
            keystream,
            state: DecodeState::Opcode,
        }
    }

    /// Pulls the next complete frame out of `buf`, if there is one.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<InboundMessage>, FrameError> {
        loop {
            match self.state {
                DecodeState::Opcode => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let raw = buf.get_u8();
                    let opcode = raw.wrapping_sub(self.keystream.next_value() as u8);
                    self.state = match frame_size(opcode) {
                        FrameSize::Fixed(len) => DecodeState::Payload { opcode, len },
                        FrameSize::VariableByte => DecodeState::Length { opcode },
                        FrameSize::Malformed => return Err(FrameError::Malformed { opcode }),
                    };
                }
                DecodeState::Length { opcode } => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let len = buf.get_u8() as usize;
                    self.state = DecodeState::Payload { opcode, len };
                }
                DecodeState::Payload { opcode, len } => {
                    if buf.len() < len {
                        return Ok(None);
                    }
                    let payload = buf.split_to(len).freeze();
                    self.state = DecodeState::Opcode;
                    return Ok(Some(InboundMessage { opcode, payload }));
                }
            }
        }
    }

    /// Like [`decode`](Self::decode), for when the peer has closed. Leftover
    /// bytes or a half-read frame are an error.
    pub fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<InboundMessage>, FrameError> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }
        match self.state {
            DecodeState::Opcode => Ok(None),
            DecodeState::Length { opcode } | DecodeState::Payload { opcode, .. } => {
                Err(FrameError::Truncated { opcode })
            }
        }
    }
}
