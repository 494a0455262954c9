//! Command-line surface
//!
//! Reads a BNSH container or raw bytecode file, decompiles it through an
//! external engine program and writes the JSON document and/or the SPIR-V
//! binary.
//!
//! Usage:
//!   bnsh_cli -i shader.bnsh --output-json out.json --output-spirv out.spv \
//!       --engine ./decompiler [--engine-arg ARG]... \
//!       [--base-binding-index N] [--input-varyings [n,n,...]]

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::config::DeviceProfile;
use crate::error::DecodeErrorKind;
use crate::header::StagePolicy;
use crate::pipeline::{self, DecodeOptions};
use crate::process_engine::ProcessEngine;
use crate::serialize::{self, DocumentLayout};

/// BNSH shader decoder
#[derive(Debug, Parser)]
#[command(name = "bnsh_cli", version)]
#[command(about = "Decompile BNSH shader bytecode to SPIR-V plus a resource description")]
pub struct Args {
    /// Input file (BNSH container or raw bytecode).
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output JSON file.
    #[arg(long = "output-json")]
    pub output_json: Option<PathBuf>,

    /// Output SPIR-V file.
    #[arg(long = "output-spirv")]
    pub output_spirv: Option<PathBuf>,

    /// Base binding index.
    #[arg(long = "base-binding-index", default_value = "0", value_parser = parse_uint)]
    pub base_binding_index: u32,

    /// Custom input varyings, e.g. [0,2,5].
    #[arg(long = "input-varyings", value_parser = parse_varyings_arg)]
    pub input_varyings: Option<InputVaryings>,

    /// Decompiler program.
    #[arg(long = "engine")]
    pub engine: Option<PathBuf>,

    /// Argument passed to the decompiler program (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Device capability profile the SPIR-V targets.
    #[arg(long = "device-profile", value_enum, default_value_t)]
    pub device_profile: DeviceProfile,

    /// Fields written to the JSON document.
    #[arg(long = "document-layout", value_enum, default_value_t)]
    pub document_layout: DocumentLayout,

    /// Treat unknown pipeline stages as compute instead of failing.
    #[arg(long = "lenient-stage")]
    pub lenient_stage: bool,

    /// Only log warnings and errors.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// Parsed `--input-varyings` list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputVaryings(pub Vec<u8>);

/// A fully validated invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub input: PathBuf,
    pub output_json: Option<PathBuf>,
    pub output_spirv: Option<PathBuf>,
    pub engine: ProcessEngine,
    pub options: DecodeOptions,
    pub layout: DocumentLayout,
}

impl Args {
    /// Check required flags. Returns the problem on failure.
    pub fn into_invocation(self) -> Result<Invocation, String> {
        let input = self.input.ok_or("missing --input")?;
        if self.output_json.is_none() && self.output_spirv.is_none() {
            return Err("need --output-json and/or --output-spirv".to_string());
        }
        let engine = self.engine.ok_or("missing --engine")?;

        Ok(Invocation {
            input,
            output_json: self.output_json,
            output_spirv: self.output_spirv,
            engine: ProcessEngine::new(engine).with_args(self.engine_args),
            options: DecodeOptions {
                base_binding: self.base_binding_index,
                input_varyings: self.input_varyings.unwrap_or_default().0,
                device_profile: self.device_profile,
                stage_policy: if self.lenient_stage {
                    StagePolicy::DefaultToCompute
                } else {
                    StagePolicy::Strict
                },
            },
            layout: self.document_layout,
        })
    }
}

/// Parse an unsigned integer with C-style radix detection (`0x` hex, leading `0` octal).
pub fn parse_uint(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        u32::from_str_radix(&s[1..], 8)
    } else {
        s.parse::<u32>()
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

/// Parse a varying list such as `[0,2,5]`. `[]` is the empty list.
///
/// # Errors
///
/// Returns `DecodeErrorKind::InvalidVaryingSyntax` if the brackets are missing,
/// an entry is empty or an entry is not a number in 0-255.
pub fn parse_varyings(s: &str) -> Result<Vec<u8>, DecodeErrorKind> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| DecodeErrorKind::InvalidVaryingSyntax(format!("expected [n,n,...], got '{}'", s)))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|entry| {
            let value = parse_uint(entry).map_err(DecodeErrorKind::InvalidVaryingSyntax)?;
            u8::try_from(value).map_err(|_| {
                DecodeErrorKind::InvalidVaryingSyntax(format!("varying {} out of range 0-255", value))
            })
        })
        .collect()
}

fn parse_varyings_arg(s: &str) -> Result<InputVaryings, String> {
    parse_varyings(s).map(InputVaryings).map_err(|e| e.to_string())
}

fn print_usage() {
    println!("{}", Args::command().render_help());
}

/// Run the CLI with the given arguments (including the program name).
///
/// Returns the process exit code.
pub fn run_from<I, T>(argv: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(argv) {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{}", e);
                return 0;
            }
            _ => {
                print!("{}", e);
                print_usage();
                return 1;
            }
        },
    };

    init_logging(args.quiet);

    let invocation = match args.into_invocation() {
        Ok(invocation) => invocation,
        Err(problem) => {
            println!("error: {}", problem);
            print_usage();
            return 1;
        }
    };

    match execute(&invocation) {
        Ok(()) => {
            log::info!("Successfully decoded");
            0
        }
        Err(e) => {
            log::error!("{}", e);
            1
        }
    }
}

fn init_logging(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    // A second init (tests calling run_from repeatedly) is harmless
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .try_init();
}

/// Decode the input and write the requested outputs.
///
/// Both outputs are rendered before anything is written. Each is written to a
/// staging file next to its destination and renamed into place only after
/// every output has been written in full. On failure no output is left behind.
pub fn execute(invocation: &Invocation) -> Result<(), DecodeErrorKind> {
    let blob = fs::read(&invocation.input).map_err(|source| DecodeErrorKind::FileOpenFailure {
        path: invocation.input.clone(),
        source,
    })?;

    let decoded = pipeline::decode_blob(&invocation.engine, &blob, &invocation.options)?;

    let document = match &invocation.output_json {
        Some(_) => Some(serialize::to_document(&decoded.result, invocation.layout)?),
        None => None,
    };

    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(2);
    if let Err(e) = stage_outputs(invocation, document.as_deref(), &decoded.result.spirv, &mut staged) {
        for (pending, _) in &staged {
            let _ = fs::remove_file(pending);
        }
        return Err(e);
    }

    commit(&staged)
}

fn stage_outputs<'a>(
    invocation: &'a Invocation,
    document: Option<&str>,
    spirv: &[u32],
    staged: &mut Vec<(PathBuf, &'a Path)>,
) -> Result<(), DecodeErrorKind> {
    if let (Some(path), Some(document)) = (&invocation.output_json, document) {
        let pending = stage(path, |file| file.write_all(document.as_bytes()))?;
        staged.push((pending, path.as_path()));
    }
    if let Some(path) = &invocation.output_spirv {
        let pending = stage(path, |file| serialize::write_spirv(file, spirv))?;
        staged.push((pending, path.as_path()));
    }
    Ok(())
}

/// Sibling of `path` an output is written to before it is renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".partial");
    path.with_file_name(name)
}

/// Write one output to its staging file. A failed write removes the staging file.
fn stage<F>(path: &Path, write: F) -> Result<PathBuf, DecodeErrorKind>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    let pending = staging_path(path);
    let failure = |source| DecodeErrorKind::FileWriteFailure {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(&pending).map_err(failure)?;
    if let Err(source) = write(&mut file) {
        drop(file);
        let _ = fs::remove_file(&pending);
        return Err(failure(source));
    }
    Ok(pending)
}

/// Rename staged outputs into place. If one rename fails, outputs already
/// moved are removed along with the remaining staging files.
fn commit(staged: &[(PathBuf, &Path)]) -> Result<(), DecodeErrorKind> {
    for (i, (pending, path)) in staged.iter().enumerate() {
        if let Err(source) = fs::rename(pending, path) {
            for (_, done) in &staged[..i] {
                let _ = fs::remove_file(done);
            }
            for (left, _) in &staged[i..] {
                let _ = fs::remove_file(left);
            }
            return Err(DecodeErrorKind::FileWriteFailure {
                path: path.to_path_buf(),
                source,
            });
        }
        log::debug!("Wrote {}", path.display());
    }
    Ok(())
}
