//! Shader program header decoding
//!
//! The first 8-byte word of the program code carries the common header word.
//! Only its low 32 bits are used:
//!
//! | bits  | field              |
//! |-------|--------------------|
//! | 0-4   | header kind        |
//! | 5-9   | version            |
//! | 10-13 | pipeline stage     |
//! | 14    | multiple render targets |
//! | 15    | kills pixels       |
//! | 16    | does global store  |
//! | 17-20 | ISA version        |
//! | 21-25 | reserved           |
//! | 26    | does load or store |
//! | 27    | does fp64          |
//! | 28-31 | stream out mask    |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::container::ProgramCode;
use crate::error::DecodeErrorKind;

/// Pipeline stage a program is written for.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Compute = 0,
    Vertex = 1,
    TessellationControl = 2,
    TessellationEvaluation = 3,
    Geometry = 4,
    Fragment = 5,
}

impl TryFrom<u32> for ShaderStage {
    type Error = DecodeErrorKind;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ShaderStage::Compute),
            1 => Ok(ShaderStage::Vertex),
            2 => Ok(ShaderStage::TessellationControl),
            3 => Ok(ShaderStage::TessellationEvaluation),
            4 => Ok(ShaderStage::Geometry),
            5 => Ok(ShaderStage::Fragment),
            _ => Err(DecodeErrorKind::UnknownPipelineStage(code)),
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Compute => "compute",
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessellationControl => "tessellation control",
            ShaderStage::TessellationEvaluation => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
        };
        f.write_str(name)
    }
}

/// What to do with a stage code outside 0-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagePolicy {
    /// Fail with `UnknownPipelineStage`
    #[default]
    Strict,
    /// Fall back to compute
    DefaultToCompute,
}

/// Decoded common header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderHeader {
    pub kind: u32,
    pub version: u32,
    pub stage: ShaderStage,
    pub mrt_enable: bool,
    pub kills_pixels: bool,
    pub does_global_store: bool,
    pub isa_version: u32,
    pub does_load_or_store: bool,
    pub does_fp64: bool,
    pub stream_out_mask: u32,
}

const KIND_SHIFT: u32 = 0;
const VERSION_SHIFT: u32 = 5;
const STAGE_SHIFT: u32 = 10;
const MRT_ENABLE_BIT: u32 = 14;
const KILLS_PIXELS_BIT: u32 = 15;
const GLOBAL_STORE_BIT: u32 = 16;
const ISA_VERSION_SHIFT: u32 = 17;
const LOAD_OR_STORE_BIT: u32 = 26;
const FP64_BIT: u32 = 27;
const STREAM_OUT_SHIFT: u32 = 28;

#[inline]
fn field(word: u64, shift: u32, width: u32) -> u32 {
    ((word >> shift) & ((1u64 << width) - 1)) as u32
}

#[inline]
fn flag(word: u64, bit: u32) -> bool {
    (word >> bit) & 1 != 0
}

impl ShaderHeader {
    /// Decode a header word.
    ///
    /// # Errors
    ///
    /// Returns `DecodeErrorKind::UnknownPipelineStage` for stage codes 6-15
    /// under `StagePolicy::Strict`.
    pub fn decode(word: u64, policy: StagePolicy) -> Result<Self, DecodeErrorKind> {
        let stage_code = field(word, STAGE_SHIFT, 4);
        let stage = match (ShaderStage::try_from(stage_code), policy) {
            (Ok(stage), _) => stage,
            (Err(_), StagePolicy::DefaultToCompute) => {
                log::warn!(
                    "Unknown pipeline stage {} in shader header, defaulting to compute",
                    stage_code
                );
                ShaderStage::Compute
            }
            (Err(e), StagePolicy::Strict) => return Err(e),
        };

        Ok(Self {
            kind: field(word, KIND_SHIFT, 5),
            version: field(word, VERSION_SHIFT, 5),
            stage,
            mrt_enable: flag(word, MRT_ENABLE_BIT),
            kills_pixels: flag(word, KILLS_PIXELS_BIT),
            does_global_store: flag(word, GLOBAL_STORE_BIT),
            isa_version: field(word, ISA_VERSION_SHIFT, 4),
            does_load_or_store: flag(word, LOAD_OR_STORE_BIT),
            does_fp64: flag(word, FP64_BIT),
            stream_out_mask: field(word, STREAM_OUT_SHIFT, 4),
        })
    }

    /// Decode the header at the start of `code`.
    pub fn from_program(code: &ProgramCode, policy: StagePolicy) -> Result<Self, DecodeErrorKind> {
        let word = code
            .words()
            .first()
            .copied()
            .ok_or(DecodeErrorKind::TruncatedBytecode { len: code.byte_len() })?;
        Self::decode(word, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGES: [ShaderStage; 6] = [
        ShaderStage::Compute,
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    #[test]
    fn test_known_stage_codes() {
        for (code, expected) in STAGES.iter().enumerate() {
            let word = (code as u64) << STAGE_SHIFT;
            let header = ShaderHeader::decode(word, StagePolicy::Strict).unwrap();
            assert_eq!(header.stage, *expected);
        }
    }

    #[test]
    fn test_unknown_stage_codes_rejected() {
        for code in 6u64..16 {
            let word = code << STAGE_SHIFT;
            match ShaderHeader::decode(word, StagePolicy::Strict) {
                Err(DecodeErrorKind::UnknownPipelineStage(c)) => assert_eq!(c as u64, code),
                other => panic!("stage {} should be rejected, got {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_lenient_policy_defaults_to_compute() {
        let word = 9u64 << STAGE_SHIFT;
        let header = ShaderHeader::decode(word, StagePolicy::DefaultToCompute).unwrap();
        assert_eq!(header.stage, ShaderStage::Compute);
    }

    #[test]
    fn test_all_fields() {
        let word: u64 = 0x1F                    // kind
            | (0x3 << VERSION_SHIFT)
            | (5 << STAGE_SHIFT)                  // fragment
            | (1 << MRT_ENABLE_BIT)
            | (1 << GLOBAL_STORE_BIT)
            | (0xA << ISA_VERSION_SHIFT)
            | (0x1F << 21)                        // reserved, ignored
            | (1 << FP64_BIT)
            | (0x9 << STREAM_OUT_SHIFT)
            | (0xFFFF_FFFF << 32);                // upper half, ignored

        let header = ShaderHeader::decode(word, StagePolicy::Strict).unwrap();
        assert_eq!(
            header,
            ShaderHeader {
                kind: 0x1F,
                version: 3,
                stage: ShaderStage::Fragment,
                mrt_enable: true,
                kills_pixels: false,
                does_global_store: true,
                isa_version: 0xA,
                does_load_or_store: false,
                does_fp64: true,
                stream_out_mask: 0x9,
            }
        );
    }

    #[test]
    fn test_stage_not_confused_by_neighbours() {
        // Every bit set except the stage field
        let word = !(0xFu64 << STAGE_SHIFT);
        let header = ShaderHeader::decode(word, StagePolicy::Strict).unwrap();
        assert_eq!(header.stage, ShaderStage::Compute);
        assert!(header.mrt_enable && header.kills_pixels && header.does_load_or_store);
        assert_eq!(header.version, 0x1F);
    }

    #[test]
    fn test_empty_program_is_truncated() {
        let result = ShaderHeader::from_program(&ProgramCode::default(), StagePolicy::Strict);
        assert!(matches!(result, Err(DecodeErrorKind::TruncatedBytecode { len: 0 })));
    }
}
