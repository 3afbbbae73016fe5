//! Login negotiation, sans-IO.
//!
//! A fresh connection walks through four stages before it carries game
//! frames:
//!
//! 1. service request: one byte, 14 selects login
//! 2. handshake: one name-hash byte; the server answers with eight zero
//!    bytes, a status byte and its random session key
//! 3. login header: connection type (16 fresh, 18 reconnect) and the length
//!    of the block that follows
//! 4. login block: magic, client release, memory mode, cache CRCs, and the
//!    key block carrying both session keys and the credentials
//!
//! [`LoginDecoder`] consumes bytes from a buffer and reports what the caller
//! should write back or hand to the world.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::cursor::{CursorError, ReadCursor, WriteCursor};

pub const SERVICE_LOGIN: u8 = 14;
pub const CONNECTION_FRESH: u8 = 16;
pub const CONNECTION_RECONNECT: u8 = 18;
pub const LOGIN_MAGIC: u8 = 255;
pub const CLIENT_RELEASE: u16 = 317;
pub const KEY_BLOCK_CHECK: u8 = 10;
pub const CACHE_ARCHIVES: usize = 9;

/// Bytes in the login block that precede the key block: magic, release,
/// memory mode, the CRCs and the key block length itself.
const KEY_BLOCK_OVERHEAD: usize = 1 + 2 + 1 + CACHE_ARCHIVES * 4 + 1;

/// Offset added to every seed for the server-to-client keystream.
pub const ENCRYPTION_SEED_OFFSET: u32 = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("unexpected service request {0}")]
    UnexpectedService(u8),
    #[error("unexpected connection type {0}")]
    UnexpectedConnectionType(u8),
    #[error("bad login magic {0}")]
    BadMagic(u8),
    #[error("client release {0} is not supported")]
    VersionMismatch(u16),
    #[error("memory mode {0} is not 0 or 1")]
    BadMemoryMode(u8),
    #[error("key block length {found}, expected {expected}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("key block check byte {0}")]
    BadKeyCheck(u8),
    #[error("login block too short: {0}")]
    Short(#[from] CursorError),
}

impl LoginError {
    /// Response code to send before closing, if the client is owed one.
    pub fn response(&self) -> Option<LoginResponse> {
        match self {
            LoginError::VersionMismatch(_)
            | LoginError::BadMemoryMode(_)
            | LoginError::LengthMismatch { .. }
            | LoginError::BadKeyCheck(_) => Some(LoginResponse::Rejected),
            _ => None,
        }
    }
}

/// Outcome codes understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResponse {
    Success = 2,
    AlreadyOnline = 5,
    WorldFull = 7,
    Rejected = 11,
}

impl LoginResponse {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Response frame: code, rights level, flagged marker.
    pub fn encode(self, rights: u8) -> Bytes {
        Bytes::copy_from_slice(&[self.code(), rights, 0])
    }
}

/// Everything a client presents in its login block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
    pub uid: u32,
    pub client_key: u64,
    pub server_key: u64,
    pub low_memory: bool,
    pub reconnecting: bool,
    pub crcs: [u32; CACHE_ARCHIVES],
}

impl LoginCredentials {
    /// Seeds for the client-to-server keystream.
    pub fn decryption_seeds(&self) -> [u32; 4] {
        [
            (self.client_key >> 32) as u32,
            self.client_key as u32,
            (self.server_key >> 32) as u32,
            self.server_key as u32,
        ]
    }

    /// Seeds for the server-to-client keystream.
    pub fn encryption_seeds(&self) -> [u32; 4] {
        self.decryption_seeds()
            .map(|seed| seed.wrapping_add(ENCRYPTION_SEED_OFFSET))
    }

    /// Writes the login header and block as a client would.
    pub fn write_login(&self, out: &mut BytesMut) {
        let mut key_block = WriteCursor::new();
        key_block
            .put_u8(KEY_BLOCK_CHECK)
            .put_u64(self.client_key)
            .put_u64(self.server_key)
            .put_u32(self.uid)
            .put_str(&self.username)
            .put_str(&self.password);

        let mut block = WriteCursor::new();
        block
            .put_u8(LOGIN_MAGIC)
            .put_u16(CLIENT_RELEASE)
            .put_u8(self.low_memory as u8);
        for crc in self.crcs {
            block.put_u32(crc);
        }
        block
            .put_u8(key_block.len() as u8)
            .put_slice(key_block.as_slice());

        out.put_u8(if self.reconnecting {
            CONNECTION_RECONNECT
        } else {
            CONNECTION_FRESH
        });
        out.put_u8(block.len() as u8);
        out.extend_from_slice(block.as_slice());
    }
}

/// Something the caller must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    /// Bytes to write back to the client.
    Reply(Bytes),
    /// The login block was accepted; the world decides the rest.
    Credentials(LoginCredentials),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ServiceRequest,
    Handshake,
    Header,
    Block { len: usize, reconnecting: bool },
    Complete,
}

/// Incremental login decoder for one connection.
#[derive(Debug)]
pub struct LoginDecoder {
    stage: Stage,
    server_key: u64,
}

impl LoginDecoder {
    pub fn new(server_key: u64) -> Self {
        Self {
            stage: Stage::ServiceRequest,
            server_key,
        }
    }

    pub fn server_key(&self) -> u64 {
        self.server_key
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    /// Advances as far as the buffered bytes allow. Returns `Ok(None)` when
    /// more input is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<LoginEvent>, LoginError> {
        loop {
            match self.stage {
                Stage::ServiceRequest => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let service = buf.get_u8();
                    if service != SERVICE_LOGIN {
                        return Err(LoginError::UnexpectedService(service));
                    }
                    self.stage = Stage::Handshake;
                }
                Stage::Handshake => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let _name_hash = buf.get_u8();
                    self.stage = Stage::Header;

                    let mut reply = BytesMut::with_capacity(17);
                    reply.put_bytes(0, 8);
                    reply.put_u8(0);
                    reply.put_u64(self.server_key);
                    return Ok(Some(LoginEvent::Reply(reply.freeze())));
                }
                Stage::Header => {
                    if buf.len() < 2 {
                        return Ok(None);
                    }
                    let connection = buf.get_u8();
                    let reconnecting = match connection {
                        CONNECTION_FRESH => false,
                        CONNECTION_RECONNECT => true,
                        other => return Err(LoginError::UnexpectedConnectionType(other)),
                    };
                    let len = buf.get_u8() as usize;
                    self.stage = Stage::Block { len, reconnecting };
                }
                Stage::Block { len, reconnecting } => {
                    if buf.len() < len {
                        return Ok(None);
                    }
                    let block = buf.split_to(len);
                    let credentials = parse_block(&block, len, reconnecting)?;
                    self.stage = Stage::Complete;
                    return Ok(Some(LoginEvent::Credentials(credentials)));
                }
                Stage::Complete => return Ok(None),
            }
        }
    }
}

fn parse_block(block: &[u8], len: usize, reconnecting: bool) -> Result<LoginCredentials, LoginError> {
    let mut cursor = ReadCursor::new(block);

    let magic = cursor.read_u8()?;
    if magic != LOGIN_MAGIC {
        return Err(LoginError::BadMagic(magic));
    }
    let release = cursor.read_u16()?;
    if release != CLIENT_RELEASE {
        return Err(LoginError::VersionMismatch(release));
    }
    let memory = cursor.read_u8()?;
    if memory > 1 {
        return Err(LoginError::BadMemoryMode(memory));
    }
    let mut crcs = [0u32; CACHE_ARCHIVES];
    for crc in crcs.iter_mut() {
        *crc = cursor.read_u32()?;
    }

    let key_block_len = cursor.read_u8()? as usize;
    let expected = len.saturating_sub(KEY_BLOCK_OVERHEAD);
    if key_block_len != expected {
        return Err(LoginError::LengthMismatch {
            expected,
            found: key_block_len,
        });
    }
    let check = cursor.read_u8()?;
    if check != KEY_BLOCK_CHECK {
        return Err(LoginError::BadKeyCheck(check));
    }

    let client_key = cursor.read_u64()?;
    let server_key = cursor.read_u64()?;
    let uid = cursor.read_u32()?;
    let username = cursor.read_string();
    let password = cursor.read_string();

    Ok(LoginCredentials {
        username,
        password,
        uid,
        client_key,
        server_key,
        low_memory: memory == 1,
        reconnecting,
        crcs,
    })
}
