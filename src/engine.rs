//! Decompiler interface
//!
//! The shader IR builder and SPIR-V generator live outside this crate. They are
//! reached through the [`Decompiler`] trait; [`EngineRequest`] and
//! [`EngineReply`] are the JSON messages used when the engine runs out of
//! process or behind a host callback.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{DeviceCapabilities, Specialization};
use crate::container::ProgramCode;
use crate::error::DecodeErrorKind;
use crate::header::ShaderStage;

/// Instructions the IR builder looks at per block scan.
pub const INSTRUCTION_WINDOW: u32 = 10;

/// How far the decompiler goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileDepth {
    BruteForce,
    FlowStack,
    NoFlowStack,
    DecompileBackwards,
    FullDecompile,
}

/// IR construction settings. Symbols are resolved through a registry built for the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileSettings {
    pub instruction_window: u32,
    pub compile_depth: CompileDepth,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            instruction_window: INSTRUCTION_WINDOW,
            compile_depth: CompileDepth::FullDecompile,
        }
    }
}

/// Everything the decompiler gets for one shader.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    pub code: &'a ProgramCode,
    pub stage: ShaderStage,
    pub settings: CompileSettings,
    pub specialization: &'a Specialization,
    pub device: &'a DeviceCapabilities,
}

/// Usage of one constant buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstBufferUsage {
    pub max_offset: u32,
    pub size: u32,
}

/// A sampler as emitted by the decompiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub index: u32,
    pub offset: u32,
    pub is_shadow: bool,
}

/// Constant buffer slot holding a global memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalMemoryBase {
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalMemoryUsage {
    pub is_read: bool,
    pub is_written: bool,
}

/// Decompiler output for one shader.
///
/// Ordered collections keep the decompiler's emission order; keyed ones are
/// iterated in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodeResult {
    pub spirv: Vec<u32>,
    pub constant_buffers: BTreeMap<u32, ConstBufferUsage>,
    pub samplers: Vec<SamplerDescriptor>,
    pub global_memory: BTreeMap<GlobalMemoryBase, GlobalMemoryUsage>,
    pub input_attributes: BTreeSet<u64>,
    pub output_attributes: BTreeSet<u64>,
}

/// Shader decompiler capability.
///
/// Implementations must be deterministic: the same request yields the same
/// result, so callers never retry.
pub trait Decompiler {
    /// Decompile `request.code` into SPIR-V plus resource usage.
    ///
    /// # Errors
    ///
    /// Returns `DecodeErrorKind::DecodeEngineFailure` if the bytecode cannot be
    /// decompiled. No partial result is returned.
    fn decompile(&self, request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind>;
}

impl<D: Decompiler + ?Sized> Decompiler for &D {
    fn decompile(&self, request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind> {
        (**self).decompile(request)
    }
}

impl<D: Decompiler + ?Sized> Decompiler for Box<D> {
    fn decompile(&self, request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind> {
        (**self).decompile(request)
    }
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Request message sent to an out-of-process engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRequest {
    pub stage: ShaderStage,
    pub settings: CompileSettings,
    pub specialization: Specialization,
    pub device: DeviceCapabilities,
    pub program_code: Vec<u64>,
}

impl From<&DecodeRequest<'_>> for EngineRequest {
    fn from(request: &DecodeRequest<'_>) -> Self {
        Self {
            stage: request.stage,
            settings: request.settings,
            specialization: request.specialization.clone(),
            device: *request.device,
            program_code: request.code.words().to_vec(),
        }
    }
}

impl EngineRequest {
    pub fn to_json(&self) -> Result<Vec<u8>, DecodeErrorKind> {
        serde_json::to_vec(self).map_err(|e| {
            DecodeErrorKind::DecodeEngineFailure(format!("failed to encode engine request: {}", e))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConstBuffer {
    pub index: u32,
    pub max_offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSampler {
    pub index: u32,
    pub offset: u32,
    pub is_shadow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGlobalMemory {
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_written: bool,
}

/// Reply message from an out-of-process engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineReply {
    pub spirv: Vec<u32>,
    #[serde(default)]
    pub constant_buffers: Vec<WireConstBuffer>,
    #[serde(default)]
    pub samplers: Vec<WireSampler>,
    #[serde(default)]
    pub global_memory: Vec<WireGlobalMemory>,
    #[serde(default)]
    pub input_attributes: Vec<u64>,
    #[serde(default)]
    pub output_attributes: Vec<u64>,
}

impl EngineReply {
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeErrorKind> {
        serde_json::from_slice(bytes).map_err(|e| {
            DecodeErrorKind::DecodeEngineFailure(format!("malformed engine reply: {}", e))
        })
    }
}

impl TryFrom<EngineReply> for DecodeResult {
    type Error = DecodeErrorKind;

    fn try_from(reply: EngineReply) -> Result<Self, Self::Error> {
        let mut constant_buffers = BTreeMap::new();
        for cb in reply.constant_buffers {
            let usage = ConstBufferUsage {
                max_offset: cb.max_offset,
                size: cb.size,
            };
            if constant_buffers.insert(cb.index, usage).is_some() {
                return Err(DecodeErrorKind::DecodeEngineFailure(format!(
                    "constant buffer {} reported twice",
                    cb.index
                )));
            }
        }

        let mut global_memory = BTreeMap::new();
        for gm in reply.global_memory {
            let base = GlobalMemoryBase {
                cbuf_index: gm.cbuf_index,
                cbuf_offset: gm.cbuf_offset,
            };
            let usage = GlobalMemoryUsage {
                is_read: gm.is_read,
                is_written: gm.is_written,
            };
            if global_memory.insert(base, usage).is_some() {
                return Err(DecodeErrorKind::DecodeEngineFailure(format!(
                    "global memory base {}:{} reported twice",
                    base.cbuf_index, base.cbuf_offset
                )));
            }
        }

        Ok(Self {
            spirv: reply.spirv,
            constant_buffers,
            samplers: reply
                .samplers
                .into_iter()
                .map(|s| SamplerDescriptor {
                    index: s.index,
                    offset: s.offset,
                    is_shadow: s.is_shadow,
                })
                .collect(),
            global_memory,
            input_attributes: reply.input_attributes.into_iter().collect(),
            output_attributes: reply.output_attributes.into_iter().collect(),
        })
    }
}

impl From<&DecodeResult> for EngineReply {
    fn from(result: &DecodeResult) -> Self {
        Self {
            spirv: result.spirv.clone(),
            constant_buffers: result
                .constant_buffers
                .iter()
                .map(|(&index, usage)| WireConstBuffer {
                    index,
                    max_offset: usage.max_offset,
                    size: usage.size,
                })
                .collect(),
            samplers: result
                .samplers
                .iter()
                .map(|s| WireSampler {
                    index: s.index,
                    offset: s.offset,
                    is_shadow: s.is_shadow,
                })
                .collect(),
            global_memory: result
                .global_memory
                .iter()
                .map(|(base, usage)| WireGlobalMemory {
                    cbuf_index: base.cbuf_index,
                    cbuf_offset: base.cbuf_offset,
                    is_read: usage.is_read,
                    is_written: usage.is_written,
                })
                .collect(),
            input_attributes: result.input_attributes.iter().copied().collect(),
            output_attributes: result.output_attributes.iter().copied().collect(),
        }
    }
}
