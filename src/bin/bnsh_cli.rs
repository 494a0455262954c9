//! BNSH shader decoder CLI
//!
//! Usage:
//!   bnsh_cli -i shader.bnsh --output-json out.json --output-spirv out.spv --engine ./decompiler
//!
//! Run with --help for all options.

fn main() {
    std::process::exit(bnsh_decoder::cli::run_from(std::env::args_os()));
}
