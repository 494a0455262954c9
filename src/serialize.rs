//! Result serialization
//!
//! Two outputs are produced from a [`DecodeResult`]:
//!
//! - a JSON document describing the resources the shader uses, and
//! - the SPIR-V word stream, little-endian, in emission order.
//!
//! The document is compact JSON with keys in a fixed order:
//!
//! ```text
//! {"spirvLength":N,"constantBuffers":[{"index":I,"maxOffset":M,"size":S},...],
//!  "samplers":[{"index":I,"offset":O,"isShadow":0|1},...],"global":[{"index":I,"offset":O},...],
//!  "inputAttributes":[...],"outputAttributes":[...]}
//! ```
//!
//! `spirvLength` and `global` are only present in [`DocumentLayout::Extended`].
//! `isShadow` is written as `0`/`1`, which is what existing consumers parse.

use std::collections::BTreeSet;
use std::io::Write;

use serde::{Serialize, Serializer};

use crate::engine::DecodeResult;
use crate::error::DecodeErrorKind;

/// Which optional fields the document carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DocumentLayout {
    /// constantBuffers, samplers, inputAttributes, outputAttributes
    Basic,
    /// Basic plus a leading spirvLength and a global array after samplers
    #[default]
    Extended,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    spirv_length: Option<usize>,
    constant_buffers: Vec<DocumentConstBuffer>,
    samplers: Vec<DocumentSampler>,
    #[serde(skip_serializing_if = "Option::is_none")]
    global: Option<Vec<DocumentGlobal>>,
    input_attributes: &'a BTreeSet<u64>,
    output_attributes: &'a BTreeSet<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentConstBuffer {
    index: u32,
    max_offset: u32,
    size: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentSampler {
    index: u32,
    offset: u32,
    #[serde(serialize_with = "bool_as_int")]
    is_shadow: bool,
}

#[derive(Serialize)]
struct DocumentGlobal {
    index: u32,
    offset: u32,
}

fn bool_as_int<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

/// Render the JSON document for a result.
///
/// Pure function of `result`: the same input always gives the same bytes.
pub fn to_document(result: &DecodeResult, layout: DocumentLayout) -> Result<String, DecodeErrorKind> {
    let extended = layout == DocumentLayout::Extended;

    let document = Document {
        spirv_length: extended.then(|| result.spirv.len()),
        constant_buffers: result
            .constant_buffers
            .iter()
            .map(|(&index, usage)| DocumentConstBuffer {
                index,
                max_offset: usage.max_offset,
                size: usage.size,
            })
            .collect(),
        samplers: result
            .samplers
            .iter()
            .map(|s| DocumentSampler {
                index: s.index,
                offset: s.offset,
                is_shadow: s.is_shadow,
            })
            .collect(),
        global: extended.then(|| {
            result
                .global_memory
                .keys()
                .map(|base| DocumentGlobal {
                    index: base.cbuf_index,
                    offset: base.cbuf_offset,
                })
                .collect()
        }),
        input_attributes: &result.input_attributes,
        output_attributes: &result.output_attributes,
    };

    serde_json::to_string(&document).map_err(|e| DecodeErrorKind::DocumentEncoding(e.to_string()))
}

/// SPIR-V words as little-endian bytes, no header or padding.
pub fn spirv_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Read a little-endian SPIR-V byte stream back into words.
///
/// # Errors
///
/// Returns `DecodeErrorKind::InvalidSpirv` if the length is not a multiple of 4.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, DecodeErrorKind> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeErrorKind::InvalidSpirv(format!(
            "SPIR-V size ({}) must be multiple of 4",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Write the word stream verbatim.
pub fn write_spirv<W: Write>(mut writer: W, words: &[u32]) -> std::io::Result<()> {
    writer.write_all(&spirv_to_bytes(words))?;
    writer.flush()
}

/// Word stream preceded by its length in words, as handed to embedded hosts.
pub fn length_prefixed(words: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(words.len() + 1);
    out.push(words.len() as u32);
    out.extend_from_slice(words);
    out
}
