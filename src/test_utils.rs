//! Shared fixtures for unit tests

use std::cell::RefCell;

use crate::container::{BNSH_MAGIC, BYTECODE_PAYLOAD_OFFSET, BYTECODE_SENTINEL};
use crate::engine::{DecodeRequest, DecodeResult, Decompiler, EngineRequest};
use crate::error::DecodeErrorKind;

/// Header word with only the stage field set.
pub fn header_word(stage: u32) -> u64 {
    u64::from(stage) << 10
}

/// BNSH container with the sentinel at 0x30 and `words` at 0x60.
pub fn build_container(words: &[u64]) -> Vec<u8> {
    let mut blob = vec![0u8; 0x30];
    blob[..4].copy_from_slice(&BNSH_MAGIC.to_le_bytes());
    blob.extend_from_slice(&BYTECODE_SENTINEL.to_le_bytes());
    blob.resize(0x30 + BYTECODE_PAYLOAD_OFFSET, 0);
    for word in words {
        blob.extend_from_slice(&word.to_le_bytes());
    }
    blob
}

/// Smallest module that passes header validation.
pub fn minimal_spirv() -> Vec<u32> {
    vec![0x0723_0203, 0x0001_0000, 0, 1, 0]
}

/// Returns a fixed result and records the last request it saw.
pub struct StubEngine {
    result: DecodeResult,
    last: RefCell<Option<EngineRequest>>,
}

impl StubEngine {
    pub fn new(result: DecodeResult) -> Self {
        Self {
            result,
            last: RefCell::new(None),
        }
    }

    pub fn last_request(&self) -> Option<EngineRequest> {
        self.last.borrow().clone()
    }
}

impl Decompiler for StubEngine {
    fn decompile(&self, request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind> {
        *self.last.borrow_mut() = Some(EngineRequest::from(request));
        Ok(self.result.clone())
    }
}

pub struct FailingEngine;

impl Decompiler for FailingEngine {
    fn decompile(&self, _request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind> {
        Err(DecodeErrorKind::DecodeEngineFailure("stub failure".to_string()))
    }
}
