//! Decode pipeline
//!
//! Runs one request end to end: header decode, configuration, decompiler
//! call, output validation. Nothing is cached between requests.

use crate::config::{DeviceProfile, Specialization};
use crate::container::{self, ProgramCode};
use crate::engine::{CompileSettings, DecodeRequest, DecodeResult, Decompiler};
use crate::error::DecodeErrorKind;
use crate::header::{ShaderHeader, StagePolicy};
use crate::validation;

/// Caller-supplied parameters for one decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub base_binding: u32,
    pub input_varyings: Vec<u8>,
    pub device_profile: DeviceProfile,
    pub stage_policy: StagePolicy,
}

/// A decoded shader along with the header it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedShader {
    pub header: ShaderHeader,
    pub result: DecodeResult,
}

/// Decompile extracted program code.
///
/// # Errors
///
/// Header errors (`TruncatedBytecode`, `UnknownPipelineStage`), any engine
/// failure, and `InvalidSpirv` if the engine output is not a SPIR-V module.
pub fn decode_program<D: Decompiler + ?Sized>(
    engine: &D,
    code: &ProgramCode,
    options: &DecodeOptions,
) -> Result<DecodedShader, DecodeErrorKind> {
    let header = ShaderHeader::from_program(code, options.stage_policy)?;

    let specialization = Specialization::new(options.base_binding, &options.input_varyings);
    let device = options.device_profile.capabilities();

    log::debug!(
        "Decoding {} shader: {} words, base_binding={}, varyings={:?}, profile={:?}",
        header.stage,
        code.len(),
        specialization.base_binding,
        specialization.custom_input_varyings,
        options.device_profile
    );

    let request = DecodeRequest {
        code,
        stage: header.stage,
        settings: CompileSettings::default(),
        specialization: &specialization,
        device: &device,
    };

    let result = engine.decompile(&request)?;
    validation::validate_spirv_words(&result.spirv)?;

    log::info!(
        "Decoded {} shader: {} SPIR-V words, {} constant buffers, {} samplers",
        header.stage,
        result.spirv.len(),
        result.constant_buffers.len(),
        result.samplers.len()
    );

    Ok(DecodedShader { header, result })
}

/// Extract the bytecode from a container or raw blob and decompile it.
pub fn decode_blob<D: Decompiler + ?Sized>(
    engine: &D,
    blob: &[u8],
    options: &DecodeOptions,
) -> Result<DecodedShader, DecodeErrorKind> {
    let code = container::extract_program(blob)?;
    decode_program(engine, &code, options)
}
