//! SPIR-V word stream validation
//!
//! The decompiler is opaque, so its output gets a structural check before it
//! is packaged. This catches engines that hand back garbage with a clearer
//! error than a downstream driver would give.

use crate::error::DecodeErrorKind;

/// SPIR-V magic number
pub const SPIRV_MAGIC: u32 = 0x07230203;

/// Words in the SPIR-V module header
pub const SPIRV_HEADER_WORDS: usize = 5;

/// Validate a SPIR-V word stream header.
///
/// Checks:
/// - At least the 5-word header
/// - Magic number (0x07230203)
/// - Version 1.0 - 1.6
/// - Non-zero id bound
///
/// # Note
///
/// This is NOT a full SPIR-V validator. Use spirv-val for complete validation.
pub fn validate_spirv_words(words: &[u32]) -> Result<(), DecodeErrorKind> {
    if words.len() < SPIRV_HEADER_WORDS {
        return Err(DecodeErrorKind::InvalidSpirv(format!(
            "SPIR-V too small: {} words (minimum {})",
            words.len(),
            SPIRV_HEADER_WORDS
        )));
    }

    let magic = words[0];
    if magic != SPIRV_MAGIC {
        return Err(DecodeErrorKind::InvalidSpirv(format!(
            "Invalid SPIR-V magic: 0x{:08x} (expected 0x{:08x})",
            magic, SPIRV_MAGIC
        )));
    }

    let version = words[1];
    let major = (version >> 16) & 0xFF;
    let minor = (version >> 8) & 0xFF;
    if major != 1 || minor > 6 {
        return Err(DecodeErrorKind::InvalidSpirv(format!(
            "Unsupported SPIR-V version: {}.{} (supported: 1.0-1.6)",
            major, minor
        )));
    }

    // Word 2 is generator magic

    let bound = words[3];
    if bound == 0 {
        return Err(DecodeErrorKind::InvalidSpirv("SPIR-V bound is 0".to_string()));
    }

    log::trace!(
        "SPIR-V validated: version {}.{}, bound {}, {} words",
        major,
        minor,
        bound,
        words.len()
    );

    Ok(())
}
