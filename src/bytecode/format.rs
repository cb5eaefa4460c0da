//! On-disk bytecode: a small header followed by a postcard-encoded [`Chunk`].
//!
//! ```text
//! "TINY" | version: u16 LE | postcard(Chunk)
//! ```

use crate::bytecode::chunk::Chunk;
use std::io::{Read, Write};
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"TINY";

/// Bumped whenever the instruction encoding changes. Version 2 uses 16-bit
/// operands.
pub const FORMAT_VERSION: u16 = 2;

const HEADER_LEN: usize = MAGIC.len() + 2;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("format error: not a tiny bytecode file")]
    BadMagic,

    #[error("format error: unsupported bytecode version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("format error: file is truncated")]
    Truncated,

    #[error("format error: cannot encode chunk: {0}")]
    Encode(String),

    #[error("format error: cannot decode chunk: {0}")]
    Decode(String),

    #[error("format error: {0}")]
    Io(#[from] std::io::Error),
}

impl Chunk {
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let body = postcard::to_allocvec(self).map_err(|e| FormatError::Encode(e.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Chunk, FormatError> {
        if bytes.len() < HEADER_LEN {
            return Err(if bytes.starts_with(&MAGIC[..bytes.len().min(MAGIC.len())]) {
                FormatError::Truncated
            } else {
                FormatError::BadMagic
            });
        }

        let (header, body) = bytes.split_at(HEADER_LEN);
        if header[..MAGIC.len()] != MAGIC {
            return Err(FormatError::BadMagic);
        }

        let found = u16::from_le_bytes([header[4], header[5]]);
        if found != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found,
                expected: FORMAT_VERSION,
            });
        }

        postcard::from_bytes(body).map_err(|e| FormatError::Decode(e.to_string()))
    }

    pub fn write_to(&self, mut writer: impl Write) -> Result<(), FormatError> {
        writer.write_all(&self.to_bytes()?)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from(mut reader: impl Read) -> Result<Chunk, FormatError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Chunk::from_bytes(&bytes)
    }
}
