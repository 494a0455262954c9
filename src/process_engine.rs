//! Out-of-process decompiler
//!
//! Runs an external program per request. The request JSON goes to its stdin,
//! the reply JSON is read from its stdout. The program must read all of stdin
//! before it writes its reply.
//!
//! Protocol:
//!   stdin:  EngineRequest (JSON)
//!   stdout: EngineReply (JSON)
//!   exit status 0 on success; anything else is a decompile failure and
//!   stderr is reported back to the caller.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::engine::{DecodeRequest, DecodeResult, Decompiler, EngineReply, EngineRequest};
use crate::error::DecodeErrorKind;

/// Decompiler backed by an external command.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append arguments passed to the program on every request.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Decompiler for ProcessEngine {
    fn decompile(&self, request: &DecodeRequest<'_>) -> Result<DecodeResult, DecodeErrorKind> {
        let payload = EngineRequest::from(request).to_json()?;

        log::debug!(
            "Spawning decompiler {} ({} byte request)",
            self.program.display(),
            payload.len()
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DecodeErrorKind::DecodeEngineFailure(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        // A child that exits early breaks the pipe. Its status and stderr are
        // reported ahead of the write error. stdin drops with the match arm.
        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&payload),
            None => Ok(()),
        };

        let output = child.wait_with_output().map_err(|e| {
            DecodeErrorKind::DecodeEngineFailure(format!("failed to read reply: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeErrorKind::DecodeEngineFailure(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        sent.map_err(|e| {
            DecodeErrorKind::DecodeEngineFailure(format!("failed to send request: {}", e))
        })?;

        let reply = EngineReply::from_json(&output.stdout)?;
        DecodeResult::try_from(reply)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{DeviceProfile, Specialization};
    use crate::container::ProgramCode;
    use crate::engine::CompileSettings;
    use crate::header::ShaderStage;

    fn run(engine: &ProcessEngine) -> Result<DecodeResult, DecodeErrorKind> {
        let code = ProgramCode::new(vec![1 << 10]);
        let spec = Specialization::default();
        let device = DeviceProfile::Baseline.capabilities();
        engine.decompile(&DecodeRequest {
            code: &code,
            stage: ShaderStage::Vertex,
            settings: CompileSettings::default(),
            specialization: &spec,
            device: &device,
        })
    }

    #[test]
    fn test_reply_from_script() {
        let script = r#"cat > /dev/null; printf '%s' '{"spirv":[119734787,65536,0,1,0],"constantBuffers":[{"index":0,"maxOffset":4,"size":8}],"inputAttributes":[8]}'"#;
        let engine = ProcessEngine::new("/bin/sh").with_args(["-c", script]);

        let result = run(&engine).unwrap();
        assert_eq!(result.spirv.len(), 5);
        assert_eq!(result.constant_buffers[&0].size, 8);
        assert!(result.input_attributes.contains(&8));
    }

    #[test]
    fn test_request_reaches_stdin() {
        // Echo the stage back through the sampler count to prove the request was read
        let script = r#"req=$(cat); case "$req" in *'"stage":"vertex"'*) n='[{"index":1,"offset":0,"isShadow":false}]';; *) n='[]';; esac; printf '{"spirv":[],"samplers":%s}' "$n""#;
        let engine = ProcessEngine::new("/bin/sh").with_args(["-c", script]);

        let result = run(&engine).unwrap();
        assert_eq!(result.samplers.len(), 1);
    }

    #[test]
    fn test_nonzero_exit_is_engine_failure() {
        let engine = ProcessEngine::new("/bin/sh")
            .with_args(["-c", "cat > /dev/null; echo 'invalid opcode' >&2; exit 3"]);

        match run(&engine) {
            Err(DecodeErrorKind::DecodeEngineFailure(msg)) => {
                assert!(msg.contains("invalid opcode"), "got: {}", msg)
            }
            other => panic!("expected engine failure, got {:?}", other),
        }
    }

    #[test]
    fn test_early_exit_reports_stderr_not_broken_pipe() {
        // Large enough that the request cannot fit in the pipe buffer
        let code = ProgramCode::new(vec![u64::MAX; 20_000]);
        let spec = Specialization::default();
        let device = DeviceProfile::Baseline.capabilities();
        let engine = ProcessEngine::new("/bin/sh")
            .with_args(["-c", "echo 'unsupported shader model' >&2; exit 2"]);

        let result = engine.decompile(&DecodeRequest {
            code: &code,
            stage: ShaderStage::Fragment,
            settings: CompileSettings::default(),
            specialization: &spec,
            device: &device,
        });

        match result {
            Err(DecodeErrorKind::DecodeEngineFailure(msg)) => {
                assert!(msg.contains("unsupported shader model"), "got: {}", msg);
                assert!(!msg.contains("failed to send request"), "got: {}", msg);
            }
            other => panic!("expected engine failure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_program_is_engine_failure() {
        let engine = ProcessEngine::new("/nonexistent/bnsh-engine");
        assert!(matches!(run(&engine), Err(DecodeErrorKind::DecodeEngineFailure(_))));
    }
}
