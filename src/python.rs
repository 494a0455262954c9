//! Python bindings
//!
//! # Python Example
//!
//! ```python
//! import json, bnsh_decoder
//!
//! def engine(request: str) -> str:
//!     return my_decompiler.run(json.loads(request))
//!
//! result = bnsh_decoder.decode(data, engine, base_binding_index=0, input_varyings=[0, 2])
//! open("shader.spv", "wb").write(result["spirv"])
//! print(result["constantBuffers"])
//! ```

use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList};

use crate::engine::{DecodeRequest, DecodeResult, Decompiler, EngineReply, EngineRequest};
use crate::error::DecodeErrorKind;
use crate::pipeline::{self, DecodeOptions};
use crate::serialize;

/// Engine backed by a Python callable taking the request JSON and returning the reply JSON.
struct PyCallableEngine<'py> {
    callable: Bound<'py, PyAny>,
}

impl Decompiler for PyCallableEngine<'_> {
    fn decompile(&self, request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind> {
        let payload = String::from_utf8(EngineRequest::from(request).to_json()?)
            .map_err(|e| DecodeErrorKind::DecodeEngineFailure(e.to_string()))?;

        let reply: String = self
            .callable
            .call1((payload,))
            .and_then(|value| value.extract())
            .map_err(|e| DecodeErrorKind::DecodeEngineFailure(format!("engine callable raised: {}", e)))?;

        DecodeResult::try_from(EngineReply::from_json(reply.as_bytes())?)
    }
}

fn document_dict<'py>(py: Python<'py>, result: &DecodeResult) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);

    let constant_buffers = PyList::empty_bound(py);
    for (&index, usage) in &result.constant_buffers {
        let entry = PyDict::new_bound(py);
        entry.set_item("index", index)?;
        entry.set_item("maxOffset", usage.max_offset)?;
        entry.set_item("size", usage.size)?;
        constant_buffers.append(entry)?;
    }

    let samplers = PyList::empty_bound(py);
    for sampler in &result.samplers {
        let entry = PyDict::new_bound(py);
        entry.set_item("index", sampler.index)?;
        entry.set_item("offset", sampler.offset)?;
        entry.set_item("isShadow", u8::from(sampler.is_shadow))?;
        samplers.append(entry)?;
    }

    let global = PyList::empty_bound(py);
    for base in result.global_memory.keys() {
        let entry = PyDict::new_bound(py);
        entry.set_item("index", base.cbuf_index)?;
        entry.set_item("offset", base.cbuf_offset)?;
        global.append(entry)?;
    }

    dict.set_item("spirvLength", result.spirv.len())?;
    dict.set_item("constantBuffers", constant_buffers)?;
    dict.set_item("samplers", samplers)?;
    dict.set_item("global", global)?;
    dict.set_item("inputAttributes", result.input_attributes.iter().copied().collect::<Vec<_>>())?;
    dict.set_item("outputAttributes", result.output_attributes.iter().copied().collect::<Vec<_>>())?;
    Ok(dict)
}

/// Decode a BNSH container or raw bytecode.
///
/// Returns a dict with the document fields plus `spirv` as little-endian bytes.
/// Raises `RuntimeError` on any decode failure.
#[pyfunction]
#[pyo3(signature = (data, engine, base_binding_index=0, input_varyings=Vec::new()))]
fn decode<'py>(
    py: Python<'py>,
    data: &[u8],
    engine: Bound<'py, PyAny>,
    base_binding_index: u32,
    input_varyings: Vec<u8>,
) -> PyResult<Bound<'py, PyDict>> {
    let options = DecodeOptions {
        base_binding: base_binding_index,
        input_varyings,
        ..Default::default()
    };

    let decoded = pipeline::decode_blob(&PyCallableEngine { callable: engine }, data, &options)?;

    let dict = document_dict(py, &decoded.result)?;
    dict.set_item(
        "spirv",
        PyBytes::new_bound(py, &serialize::spirv_to_bytes(&decoded.result.spirv)),
    )?;
    Ok(dict)
}

#[pymodule]
fn bnsh_decoder(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(decode, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{build_container, header_word};

    const ENGINES: &str = r#"
import json

def reply(request):
    req = json.loads(request)
    if req["stage"] != "fragment":
        raise ValueError("unexpected stage " + req["stage"])
    spec = req["specialization"]
    return json.dumps({
        "spirv": [119734787, 65536, 0, 1, 0],
        "constantBuffers": [{"index": spec["baseBinding"], "maxOffset": 4, "size": 8}],
        "samplers": [{"index": 1, "offset": 16, "isShadow": True}],
        "inputAttributes": spec["customInputVaryings"],
    })

def broken(request):
    raise ValueError("unsupported shader model")
"#;

    fn engines(py: Python<'_>) -> Bound<'_, PyModule> {
        PyModule::from_code_bound(py, ENGINES, "engines.py", "engines").unwrap()
    }

    #[test]
    fn test_decode_returns_document_fields_and_spirv() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let blob = build_container(&[header_word(5), 0]);
            let engine = engines(py).getattr("reply").unwrap();
            let dict = decode(py, &blob, engine, 3, vec![8, 9]).unwrap();

            let spirv = dict.get_item("spirv").unwrap().unwrap();
            let spirv = spirv.downcast::<PyBytes>().unwrap().as_bytes();
            assert_eq!(spirv.len(), 20);
            assert_eq!(&spirv[..4], &[0x03, 0x02, 0x23, 0x07]);

            let length: usize = dict.get_item("spirvLength").unwrap().unwrap().extract().unwrap();
            assert_eq!(length, 5);

            let cb = dict.get_item("constantBuffers").unwrap().unwrap().get_item(0).unwrap();
            assert_eq!(cb.get_item("index").unwrap().extract::<u32>().unwrap(), 3);
            assert_eq!(cb.get_item("size").unwrap().extract::<u32>().unwrap(), 8);

            let sampler = dict.get_item("samplers").unwrap().unwrap().get_item(0).unwrap();
            assert_eq!(sampler.get_item("isShadow").unwrap().extract::<u8>().unwrap(), 1);

            let inputs: Vec<u64> = dict.get_item("inputAttributes").unwrap().unwrap().extract().unwrap();
            assert_eq!(inputs, vec![8, 9]);
            let global = dict.get_item("global").unwrap().unwrap();
            assert_eq!(global.len().unwrap(), 0);
        });
    }

    #[test]
    fn test_engine_exception_becomes_runtime_error() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let blob = build_container(&[header_word(5), 0]);
            let engine = engines(py).getattr("broken").unwrap();

            let err = decode(py, &blob, engine, 0, Vec::new()).unwrap_err();
            assert!(err.is_instance_of::<pyo3::exceptions::PyRuntimeError>(py));
            assert!(err.to_string().contains("unsupported shader model"), "got: {}", err);
        });
    }

    #[test]
    fn test_container_error_becomes_runtime_error() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let mut blob = vec![0u8; 0x40];
            blob[..4].copy_from_slice(&crate::container::BNSH_MAGIC.to_le_bytes());
            let engine = engines(py).getattr("reply").unwrap();

            let err = decode(py, &blob, engine, 0, Vec::new()).unwrap_err();
            assert!(err.is_instance_of::<pyo3::exceptions::PyRuntimeError>(py));
            assert!(err.to_string().contains("Missing BNSH bytecode section"), "got: {}", err);
        });
    }
}
