use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub mod checksum;
pub mod compress;
pub mod config;
pub mod error;
pub mod exchange;
pub mod kind;
pub mod model;
pub mod registry;
pub mod verify;

pub use checksum::{Checksum, ChecksumEngine};
pub use config::{Config, ExchangeConfig};
pub use error::{FrameError, RegistryError, TransportError, VerifyError};
pub use exchange::{ChecksumSource, ExchangeServer, RemoteChecksums};
pub use kind::{Builtin, TypeKind};
pub use model::{Enumerator, Member, Operation, Parameter, SourceLocation, TypeDefinition};
pub use registry::Registry;
pub use verify::{verify, verify_peer, Compatibility, Verification, VerifyPolicy};

/// Wire protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Bytes before the payload: version, type, flags, request id, payload length
pub const HEADER_LEN: usize = 12;

/// Message types in the checksum exchange protocol
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgType {
    GetChecksums = 0,
    Checksums = 1,
    Error = 2,
}

impl MsgType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(MsgType::GetChecksums),
            1 => Some(MsgType::Checksums),
            2 => Some(MsgType::Error),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Frame flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        const ZSTD = 1 << 0;
    }
}

/// Frame header structure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub mtype: MsgType,
    pub flags: Flags,
    /// Chosen by the client, echoed by the server
    pub request_id: u32,
}

/// Complete frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub hdr: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(mtype: MsgType, request_id: u32, payload: Vec<u8>) -> Self {
        Frame {
            hdr: FrameHeader {
                version: PROTOCOL_VERSION,
                mtype,
                flags: Flags::empty(),
                request_id,
            },
            payload,
        }
    }

    /// Encode frame to bytes, CRC32 of header and payload appended
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        let len = u32::try_from(self.payload.len()).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("payload of {} bytes does not fit a frame", self.payload.len()),
            )
        })?;
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len() + 4);

        buf.write_u8(self.hdr.version)?;
        buf.write_u8(self.hdr.mtype as u8)?;
        buf.write_u16::<LittleEndian>(self.hdr.flags.bits())?;
        buf.write_u32::<LittleEndian>(self.hdr.request_id)?;
        buf.write_u32::<LittleEndian>(len)?;
        buf.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&buf);
        buf.write_u32::<LittleEndian>(crc)?;

        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.encode()?)?;
        w.flush()
    }

    /// Read one frame from a stream, rejecting payloads above `max_len`
    pub fn read_from<R: Read>(r: &mut R, max_len: u32) -> Result<Self, FrameError> {
        let mut head = [0u8; HEADER_LEN];
        r.read_exact(&mut head)?;
        let mut cursor = &head[..];

        let version = cursor.read_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(FrameError::Version(version));
        }
        let raw_type = cursor.read_u8()?;
        let mtype = MsgType::from_u8(raw_type).ok_or(FrameError::MsgType(raw_type))?;
        let raw_flags = cursor.read_u16::<LittleEndian>()?;
        let flags = Flags::from_bits(raw_flags).ok_or(FrameError::Flags(raw_flags))?;
        let request_id = cursor.read_u32::<LittleEndian>()?;
        let len = cursor.read_u32::<LittleEndian>()?;
        if len > max_len {
            return Err(FrameError::TooLarge { len, max: max_len });
        }

        let mut payload = vec![0u8; len as usize];
        r.read_exact(&mut payload)?;
        let crc32 = r.read_u32::<LittleEndian>()?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&head);
        hasher.update(&payload);
        let computed = hasher.finalize();
        if crc32 != computed {
            return Err(FrameError::Crc {
                expected: crc32,
                actual: computed,
            });
        }

        Ok(Frame {
            hdr: FrameHeader {
                version,
                mtype,
                flags,
                request_id,
            },
            payload,
        })
    }

    /// Decode frame from bytes
    pub fn decode(data: &[u8], max_len: u32) -> Result<Self, FrameError> {
        let mut cursor = data;
        Self::read_from(&mut cursor, max_len)
    }
}
