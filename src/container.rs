//! BNSH container extraction
//!
//! Locates the shader bytecode inside a BNSH container. Blobs that do not
//! start with the BNSH magic are taken to be raw bytecode already.

use crate::error::DecodeErrorKind;

/// BNSH magic: "BNSH" read as a little-endian u32
pub const BNSH_MAGIC: u32 = 0x48534E42;

/// Word marking the start of a bytecode section
pub const BYTECODE_SENTINEL: u32 = 0x12345678;

/// Distance in bytes from the sentinel to the first bytecode byte
pub const BYTECODE_PAYLOAD_OFFSET: usize = 0x30;

/// Shader program code as 8-byte machine words.
///
/// Owned copy of the bytecode region; the container it came from can be
/// dropped once this exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramCode(Vec<u64>);

impl ProgramCode {
    pub fn new(words: Vec<u64>) -> Self {
        Self(words)
    }

    /// Pack little-endian bytes into words, zero-padding a trailing partial word.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word[..chunk.len()].copy_from_slice(chunk);
                u64::from_le_bytes(word)
            })
            .collect();
        Self(words)
    }

    pub fn words(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Size of the code in bytes.
    pub fn byte_len(&self) -> usize {
        self.0.len() * 8
    }
}

/// Where the bytecode of a blob was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytecodeSource {
    /// Blob had no BNSH magic and was used as-is
    Raw,
    /// Bytecode section found in a BNSH container at this byte offset
    Container { offset: usize },
}

/// Check for the BNSH magic at offset 0.
#[inline]
pub fn is_bnsh(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && read_u32_le(bytes, 0) == BNSH_MAGIC
}

/// Extract the program code from a raw blob.
///
/// # Errors
///
/// Returns `DecodeErrorKind::MissingBytecodeSection` if a BNSH container has no
/// sentinel, and `DecodeErrorKind::MultipleSectionsUnsupported` if it has more
/// than one.
pub fn extract_program(bytes: &[u8]) -> Result<ProgramCode, DecodeErrorKind> {
    extract_program_with_source(bytes).map(|(code, _)| code)
}

/// Like [`extract_program`], also reporting where the bytecode came from.
pub fn extract_program_with_source(
    bytes: &[u8],
) -> Result<(ProgramCode, BytecodeSource), DecodeErrorKind> {
    if !is_bnsh(bytes) {
        log::debug!("No BNSH magic, treating {} bytes as raw bytecode", bytes.len());
        return Ok((ProgramCode::from_le_bytes(bytes), BytecodeSource::Raw));
    }

    log::info!("Detected BNSH file");

    let offset = find_bytecode_offset(bytes)?;

    // Payload is addressed in whole 8-byte words
    let start = (offset / 8) * 8;
    let payload = bytes.get(start..).unwrap_or(&[]);

    log::info!("Found BNSH bytecode at 0x{:X}", offset);

    Ok((
        ProgramCode::from_le_bytes(payload),
        BytecodeSource::Container { offset },
    ))
}

/// Scan the container for the single bytecode sentinel and return the payload byte offset.
fn find_bytecode_offset(bytes: &[u8]) -> Result<usize, DecodeErrorKind> {
    let mut sentinel: Option<usize> = None;

    for (index, chunk) in bytes.chunks_exact(4).enumerate() {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if word != BYTECODE_SENTINEL {
            continue;
        }

        if let Some(first) = sentinel {
            return Err(DecodeErrorKind::MultipleSectionsUnsupported {
                first,
                second: index * 4,
            });
        }
        sentinel = Some(index * 4);
    }

    sentinel
        .map(|at| at + BYTECODE_PAYLOAD_OFFSET)
        .ok_or(DecodeErrorKind::MissingBytecodeSection)
}

fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
