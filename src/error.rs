//! Error types for the decode pipeline
//!
//! Every failure is a deterministic function of the input, so nothing here is
//! retried. The numeric codes are part of the C surface and must stay stable.

use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds surfaced by extraction, decoding, the engine and the surfaces.
#[derive(Debug, Error)]
pub enum DecodeErrorKind {
    #[error("Failed to open {}: {source}", path.display())]
    FileOpenFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    FileWriteFailure {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unimplemented: multiple BNSH bytecode sections aren't supported (sentinels at 0x{first:X} and 0x{second:X})")]
    MultipleSectionsUnsupported { first: usize, second: usize },

    #[error("Missing BNSH bytecode section")]
    MissingBytecodeSection,

    #[error("Input varyings parse error: {0}")]
    InvalidVaryingSyntax(String),

    #[error("Unknown pipeline stage {0} in shader header")]
    UnknownPipelineStage(u32),

    #[error("Bytecode too short for a shader header: {len} bytes (minimum 8)")]
    TruncatedBytecode { len: usize },

    #[error("Decompiler failed: {0}")]
    DecodeEngineFailure(String),

    #[error("Decompiler produced invalid SPIR-V: {0}")]
    InvalidSpirv(String),

    #[error("Output buffer too small: need {required}, have {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },

    #[error("Failed to encode document: {0}")]
    DocumentEncoding(String),
}

impl DecodeErrorKind {
    /// Status code reported across the C surface. `0` is success.
    pub fn status_code(&self) -> i32 {
        match self {
            DecodeErrorKind::FileOpenFailure { .. } => 1,
            DecodeErrorKind::FileWriteFailure { .. } => 2,
            DecodeErrorKind::MultipleSectionsUnsupported { .. } => 3,
            DecodeErrorKind::MissingBytecodeSection => 4,
            DecodeErrorKind::InvalidVaryingSyntax(_) => 5,
            DecodeErrorKind::UnknownPipelineStage(_) => 6,
            DecodeErrorKind::TruncatedBytecode { .. } => 7,
            DecodeErrorKind::DecodeEngineFailure(_) => 8,
            DecodeErrorKind::InvalidSpirv(_) => 9,
            DecodeErrorKind::BufferTooSmall { .. } => 10,
            DecodeErrorKind::DocumentEncoding(_) => 11,
        }
    }
}

#[cfg(feature = "python")]
impl From<DecodeErrorKind> for pyo3::PyErr {
    fn from(e: DecodeErrorKind) -> Self {
        pyo3::exceptions::PyRuntimeError::new_err(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_distinct() {
        let errors = [
            DecodeErrorKind::FileOpenFailure {
                path: PathBuf::from("a"),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
            DecodeErrorKind::FileWriteFailure {
                path: PathBuf::from("b"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            },
            DecodeErrorKind::MultipleSectionsUnsupported { first: 0x30, second: 0x90 },
            DecodeErrorKind::MissingBytecodeSection,
            DecodeErrorKind::InvalidVaryingSyntax("[0".to_string()),
            DecodeErrorKind::UnknownPipelineStage(9),
            DecodeErrorKind::TruncatedBytecode { len: 3 },
            DecodeErrorKind::DecodeEngineFailure("boom".to_string()),
            DecodeErrorKind::InvalidSpirv("bad magic".to_string()),
            DecodeErrorKind::BufferTooSmall { required: 2, capacity: 1 },
            DecodeErrorKind::DocumentEncoding("interior NUL".to_string()),
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.status_code()).collect();
        assert!(codes.iter().all(|&c| c != 0), "0 is reserved for success");
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_messages_name_offsets() {
        let e = DecodeErrorKind::MultipleSectionsUnsupported { first: 0x30, second: 0x90 };
        let msg = e.to_string();
        assert!(msg.contains("0x30") && msg.contains("0x90"), "got: {}", msg);
    }
}
