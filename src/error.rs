use std::io;

use thiserror::Error;

/// Failures while building or querying a [`crate::Registry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two definitions claim the same name. Never resolved by picking one.
    #[error("duplicate type definition: {name}")]
    DuplicateName { name: String },

    #[error("no checksum registered for {name}")]
    NotFound { name: String },

    #[error("failed to read schema: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Wire frame decoding failures.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unsupported frame version {0}")]
    Version(u8),

    #[error("invalid message type {0}")]
    MsgType(u8),

    #[error("invalid flags {0:#x}")]
    Flags(u16),

    #[error("frame payload of {len} bytes exceeds limit of {max}")]
    TooLarge { len: u32, max: u32 },

    #[error("CRC32 mismatch: expected {expected:#x}, got {actual:#x}")]
    Crc { expected: u32, actual: u32 },

    #[error("truncated frame: {0}")]
    Truncated(#[from] io::Error),
}

/// Failure of a remote `getSchemaChecksums` call. Surfaced to the caller as is.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer unreachable: {0}")]
    Io(#[from] io::Error),

    #[error("request to peer timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("peer reported error: {0}")]
    Remote(String),
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Truncated(e) if is_timeout(&e) => TransportError::Timeout,
            other => TransportError::Malformed(other.to_string()),
        }
    }
}

pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Raised by [`crate::VerifyPolicy::enforce`] when a peer is refused.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("incompatible peer: mismatched {mismatched:?}, unknown {unknown:?}")]
    Incompatible {
        mismatched: Vec<String>,
        unknown: Vec<String>,
    },
}
