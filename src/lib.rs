//! BNSH shader decoder
//!
//! Turns a compiled BNSH shader container (or a bare bytecode blob) into a
//! SPIR-V module plus a JSON description of the resources the shader uses.
//!
//! # Architecture
//!
//! ```text
//! bytes -> container::extract_program -> header::ShaderHeader
//!       -> config (Specialization, DeviceCapabilities)
//!       -> engine::Decompiler -> validation -> serialize
//! ```
//!
//! The decompiler itself (IR construction and SPIR-V emission) is injected
//! through the [`Decompiler`] trait. Three hosts are provided:
//!
//! - `bnsh_cli`, which talks to an external engine process ([`ProcessEngine`])
//! - a C surface in [`ffi`] for embedding, with a host callback as engine
//! - a Python module (feature `python`) with a Python callable as engine
//!
//! # Example
//!
//! ```no_run
//! use bnsh_decoder::{decode_blob, to_document, DecodeOptions, DocumentLayout, ProcessEngine};
//!
//! let blob = std::fs::read("shader.bnsh")?;
//! let engine = ProcessEngine::new("./decompiler");
//! let decoded = decode_blob(&engine, &blob, &DecodeOptions::default())?;
//! println!("{}", to_document(&decoded.result, DocumentLayout::Extended)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod header;
pub mod pipeline;
pub mod process_engine;
pub mod serialize;
pub mod validation;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod test_utils;

pub use config::{DeviceCapabilities, DeviceProfile, Specialization, VertexAttributeType};
pub use container::{extract_program, ProgramCode};
pub use engine::{CompileSettings, DecodeRequest, DecodeResult, Decompiler};
pub use error::DecodeErrorKind;
pub use header::{ShaderHeader, ShaderStage, StagePolicy};
pub use pipeline::{decode_blob, decode_program, DecodeOptions, DecodedShader};
pub use process_engine::ProcessEngine;
pub use serialize::{to_document, DocumentLayout};
