//! C surface for embedding hosts
//!
//! The host supplies the decompiler as a callback and gets back an owned
//! [`BnshOutput`] handle. Everything the handle points to stays valid until
//! the host calls [`bnsh_output_free`]. Hosts that want the data in their own
//! buffers query the exact sizes first and then call [`bnsh_output_copy`].
//!
//! ```c
//! int status;
//! BnshOutput* out = bnsh_decode(&engine, data, len, 0, varyings, n, &status);
//! if (!out) { /* status holds the error code */ }
//! size_t words = bnsh_output_required_words(out);
//! size_t text = bnsh_output_required_text(out);
//! /* allocate, then */
//! bnsh_output_copy(out, word_buf, words, text_buf, text);
//! bnsh_output_free(out);
//! ```

use std::ffi::{c_char, c_void};
use std::ptr;

use crate::engine::{DecodeRequest, DecodeResult, Decompiler, EngineReply, EngineRequest};
use crate::error::DecodeErrorKind;
use crate::pipeline::{self, DecodeOptions};
use crate::serialize::{self, DocumentLayout};

/// SPIR-V buffer size, in words, the original web host allocates.
pub const BNSH_DEFAULT_SPIRV_CAPACITY: usize = 0x8000;

/// Document buffer size, in bytes, the original web host allocates.
pub const BNSH_DEFAULT_DOCUMENT_CAPACITY: usize = 0x1000;

/// Reply buffer used when the host leaves `reply_capacity` at 0.
pub const BNSH_DEFAULT_REPLY_CAPACITY: usize = 1 << 20;

pub const BNSH_STATUS_OK: i32 = 0;

/// A null pointer was passed where data was required.
pub const BNSH_STATUS_INVALID_ARGUMENT: i32 = -1;

/// Decompile callback.
///
/// Receives the request JSON and writes the reply JSON into `reply`, storing
/// its length in `reply_len`. If the reply does not fit, the callback stores
/// the needed length and writes nothing; it is then called once more with a
/// buffer of that size. Returns 0 on success.
pub type BnshDecompileFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    request: *const u8,
    request_len: usize,
    reply: *mut u8,
    reply_capacity: usize,
    reply_len: *mut usize,
) -> i32;

/// Host-provided decompiler.
#[repr(C)]
pub struct BnshEngine {
    pub user_data: *mut c_void,
    pub decompile: Option<BnshDecompileFn>,
    /// Initial reply buffer size in bytes, 0 for the default
    pub reply_capacity: usize,
}

struct CallbackEngine<'a> {
    raw: &'a BnshEngine,
}

impl CallbackEngine<'_> {
    /// One callback invocation. Returns the reply length, which may exceed `reply.len()`.
    fn call(
        &self,
        callback: BnshDecompileFn,
        payload: &[u8],
        reply: &mut [u8],
    ) -> Result<usize, DecodeErrorKind> {
        let mut reply_len = 0usize;
        let status = unsafe {
            callback(
                self.raw.user_data,
                payload.as_ptr(),
                payload.len(),
                reply.as_mut_ptr(),
                reply.len(),
                &mut reply_len,
            )
        };

        if status != 0 {
            return Err(DecodeErrorKind::DecodeEngineFailure(format!(
                "decompile callback returned {}",
                status
            )));
        }
        Ok(reply_len)
    }
}

impl Decompiler for CallbackEngine<'_> {
    fn decompile(&self, request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind> {
        let callback = self.raw.decompile.ok_or_else(|| {
            DecodeErrorKind::DecodeEngineFailure("no decompile callback".to_string())
        })?;

        let payload = EngineRequest::from(request).to_json()?;
        let capacity = match self.raw.reply_capacity {
            0 => BNSH_DEFAULT_REPLY_CAPACITY,
            n => n,
        };
        let mut reply = vec![0u8; capacity];
        let mut reply_len = self.call(callback, &payload, &mut reply)?;

        // The callback reported the size it needs; retry once with exactly that
        if reply_len > reply.len() {
            log::debug!(
                "Reply of {} bytes exceeds capacity {}, retrying",
                reply_len,
                reply.len()
            );
            reply = vec![0u8; reply_len];
            reply_len = self.call(callback, &payload, &mut reply)?;
            if reply_len > reply.len() {
                return Err(DecodeErrorKind::DecodeEngineFailure(format!(
                    "reply of {} bytes exceeds reply capacity {}",
                    reply_len,
                    reply.len()
                )));
            }
        }

        reply.truncate(reply_len);
        DecodeResult::try_from(EngineReply::from_json(&reply)?)
    }
}

/// Decoded shader owned by the host until [`bnsh_output_free`].
#[derive(Debug)]
pub struct BnshOutput {
    spirv: Vec<u32>,
    /// JSON document with its NUL terminator
    document: Vec<u8>,
}

impl BnshOutput {
    fn new(result: &DecodeResult) -> Result<Self, DecodeErrorKind> {
        let mut document = serialize::to_document(result, DocumentLayout::Extended)?.into_bytes();
        if document.contains(&0) {
            return Err(DecodeErrorKind::DocumentEncoding(
                "document contains a NUL byte".to_string(),
            ));
        }
        document.push(0);

        Ok(Self {
            spirv: result.spirv.clone(),
            document,
        })
    }

    pub fn spirv(&self) -> &[u32] {
        &self.spirv
    }

    /// Document text without the terminator.
    pub fn document(&self) -> &str {
        std::str::from_utf8(&self.document[..self.document.len() - 1]).unwrap_or_default()
    }

    /// Words needed for the length-prefixed stream.
    pub fn required_words(&self) -> usize {
        self.spirv.len() + 1
    }

    /// Bytes needed for the document including its terminator.
    pub fn required_text(&self) -> usize {
        self.document.len()
    }

    /// Copy the length-prefixed stream and the terminated document into host buffers.
    ///
    /// Nothing is written unless both fit.
    pub fn copy_into(&self, words: &mut [u32], text: &mut [u8]) -> Result<(), DecodeErrorKind> {
        if words.len() < self.required_words() {
            return Err(DecodeErrorKind::BufferTooSmall {
                required: self.required_words(),
                capacity: words.len(),
            });
        }
        if text.len() < self.required_text() {
            return Err(DecodeErrorKind::BufferTooSmall {
                required: self.required_text(),
                capacity: text.len(),
            });
        }

        let prefixed = serialize::length_prefixed(&self.spirv);
        words[..prefixed.len()].copy_from_slice(&prefixed);
        text[..self.document.len()].copy_from_slice(&self.document);
        Ok(())
    }
}

/// Decode a container or raw bytecode with a host engine. Safe core of [`bnsh_decode`].
pub fn decode_with_engine<D: Decompiler + ?Sized>(
    engine: &D,
    data: &[u8],
    base_binding_index: u8,
    varyings: &[u8],
) -> Result<BnshOutput, DecodeErrorKind> {
    let options = DecodeOptions {
        base_binding: u32::from(base_binding_index),
        input_varyings: varyings.to_vec(),
        ..Default::default()
    };
    let decoded = pipeline::decode_blob(engine, data, &options)?;
    BnshOutput::new(&decoded.result)
}

unsafe fn slice_or_empty<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    if len == 0 {
        Some(&[])
    } else if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

unsafe fn set_status(status: *mut i32, code: i32) {
    if !status.is_null() {
        *status = code;
    }
}

/// Decode `data` (BNSH container or raw bytecode).
///
/// Returns null on failure with the error code in `status`.
///
/// # Safety
///
/// `engine` must point to a valid [`BnshEngine`]; `data` and `varyings` must be
/// readable for their lengths (or the length must be 0); `status` may be null.
#[no_mangle]
pub unsafe extern "C" fn bnsh_decode(
    engine: *const BnshEngine,
    data: *const u8,
    data_len: usize,
    base_binding_index: u8,
    varyings: *const u8,
    varyings_len: usize,
    status: *mut i32,
) -> *mut BnshOutput {
    let (Some(engine), Some(data), Some(varyings)) = (
        engine.as_ref(),
        slice_or_empty(data, data_len),
        slice_or_empty(varyings, varyings_len),
    ) else {
        set_status(status, BNSH_STATUS_INVALID_ARGUMENT);
        return ptr::null_mut();
    };

    match decode_with_engine(&CallbackEngine { raw: engine }, data, base_binding_index, varyings) {
        Ok(output) => {
            set_status(status, BNSH_STATUS_OK);
            Box::into_raw(Box::new(output))
        }
        Err(e) => {
            log::error!("bnsh_decode failed: {}", e);
            set_status(status, e.status_code());
            ptr::null_mut()
        }
    }
}

/// # Safety
///
/// `output` must be null or a live handle from [`bnsh_decode`].
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_required_words(output: *const BnshOutput) -> usize {
    output.as_ref().map_or(0, BnshOutput::required_words)
}

/// # Safety
///
/// `output` must be null or a live handle from [`bnsh_decode`].
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_required_text(output: *const BnshOutput) -> usize {
    output.as_ref().map_or(0, BnshOutput::required_text)
}

/// SPIR-V words owned by the handle; the count goes to `len`.
///
/// # Safety
///
/// `output` must be null or a live handle from [`bnsh_decode`]; `len` may be null.
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_spirv(output: *const BnshOutput, len: *mut usize) -> *const u32 {
    let Some(output) = output.as_ref() else {
        if !len.is_null() {
            *len = 0;
        }
        return ptr::null();
    };
    if !len.is_null() {
        *len = output.spirv.len();
    }
    output.spirv.as_ptr()
}

/// # Safety
///
/// `output` must be null or a live handle from [`bnsh_decode`].
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_spirv_len(output: *const BnshOutput) -> usize {
    output.as_ref().map_or(0, |o| o.spirv.len())
}

/// Document length in bytes, terminator excluded.
///
/// # Safety
///
/// `output` must be null or a live handle from [`bnsh_decode`].
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_document_len(output: *const BnshOutput) -> usize {
    output.as_ref().map_or(0, |o| o.document.len() - 1)
}

/// NUL-terminated JSON document owned by the handle.
///
/// # Safety
///
/// `output` must be null or a live handle from [`bnsh_decode`].
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_document(output: *const BnshOutput) -> *const c_char {
    output
        .as_ref()
        .map_or(ptr::null(), |o| o.document.as_ptr().cast::<c_char>())
}

/// Copy into host buffers. Returns 0, or the `BufferTooSmall` code with nothing written.
///
/// # Safety
///
/// `output` must be a live handle; `words` and `text` must be writable for
/// their capacities.
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_copy(
    output: *const BnshOutput,
    words: *mut u32,
    words_capacity: usize,
    text: *mut c_char,
    text_capacity: usize,
) -> i32 {
    let Some(output) = output.as_ref() else {
        return BNSH_STATUS_INVALID_ARGUMENT;
    };
    if words.is_null() || text.is_null() {
        return BNSH_STATUS_INVALID_ARGUMENT;
    }

    let words = std::slice::from_raw_parts_mut(words, words_capacity);
    let text = std::slice::from_raw_parts_mut(text.cast::<u8>(), text_capacity);
    match output.copy_into(words, text) {
        Ok(()) => BNSH_STATUS_OK,
        Err(e) => e.status_code(),
    }
}

/// Release a handle. Null is ignored.
///
/// # Safety
///
/// `output` must be null or a handle from [`bnsh_decode`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn bnsh_output_free(output: *mut BnshOutput) {
    if !output.is_null() {
        drop(Box::from_raw(output));
    }
}
