//! Synchronous external toolchain invocations.
//!
//! The compiler, linker and `strings` extractor are black boxes to the
//! composer; it only ever runs them as blocking child processes and
//! consumes their files or text output. A non-zero exit status surfaces as
//! [`crate::Error::ToolFailed`] and aborts the run; there is no retry and
//! no timeout, so a tool that never returns blocks the composer
//! indefinitely.

use std::{
    fs::OpenOptions,
    io::Write,
    path::Path,
    process::Command,
};

use crate::{Error, Result};

/// Flags for the stub probe compile; the probe only exists so the real
/// compiler emits its mangled names for the declared functions.
const PROBE_FLAGS: [&str; 6] = [
    "-D__GETADDR",
    "-c",
    "-m32",
    "-fpermissive",
    "-std=c++17",
    "-Wno-return-type",
];

fn run(mut command: Command, tool: &str) -> Result<()> {
    log::debug!("running {command:?}");
    let status = command.status()?;
    if !status.success() {
        return Err(Error::ToolFailed {
            tool: tool.to_string(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

/// Verifies the compiler is reachable before any work starts.
pub fn check_compiler() -> Result<()> {
    let mut command = Command::new("g++");
    command.arg("--version");
    run(command, "g++")
}

/// Compiles one stub header so its mangled symbol names can be harvested.
pub fn compile_stub_probe(source: &Path, output: &Path) -> Result<()> {
    let mut command = Command::new("g++");
    command.args(PROBE_FLAGS);
    command.arg(source).arg("-o").arg(output);
    run(command, "g++")
}

/// Runs the `strings` extractor over an artifact, appending its output to
/// the collected symbols file.
pub fn extract_strings(artifact: &Path, symbols_file: &Path) -> Result<()> {
    let mut command = Command::new("strings");
    command.arg(artifact);
    log::debug!("running {command:?}");

    let output = command.output()?;
    if !output.status.success() {
        return Err(Error::ToolFailed {
            tool: String::from("strings"),
            code: output.status.code().unwrap_or(-1),
        });
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(symbols_file)?;
    file.write_all(&output.stdout)?;
    Ok(())
}

/// Compiles and links the aggregate section image inside the build
/// directory, placing it at the given image base and emitting a map file.
pub fn compile_section(
    cflags: &str,
    build_dir: &Path,
    link_script: &str,
    image_base: u32,
    map_file: &str,
    source: &str,
) -> Result<()> {
    let mut command = Command::new("g++");
    command.current_dir(build_dir);
    command.args(cflags.split_whitespace());
    command.arg(format!(
        "-Wl,-T,{link_script},--image-base,{image_base},-s,-Map,{map_file}"
    ));
    command.arg(source);
    run(command, "g++")
}

/// Compiles every hook source to a relocatable object inside the build
/// directory.
pub fn compile_hooks(cflags: &str, build_dir: &Path, sources: &[std::path::PathBuf]) -> Result<()> {
    if sources.is_empty() {
        log::info!("no hook sources found");
        return Ok(());
    }
    let mut command = Command::new("g++");
    command.current_dir(build_dir);
    command.arg("-c");
    command.args(cflags.split_whitespace());
    for source in sources {
        command.arg(source);
    }
    run(command, "g++")
}

/// Links the placement script into the composite patch artifact.
pub fn link_patch(script: &Path, image_base: u32, map_file: &Path) -> Result<()> {
    let mut command = Command::new("ld");
    command
        .arg("-T")
        .arg(script)
        .arg("--image-base")
        .arg(image_base.to_string())
        .arg("-s")
        .arg("-Map")
        .arg(map_file);
    run(command, "ld")
}
