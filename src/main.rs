//! Command-line orchestrator for the binary-patch composer.
//!
//! Drives the full pipeline over the conventional project layout: stub
//! headers under `section/include/`, section sources under `section/`,
//! hook sources under `hooks/`, scratch output under `build/`.

use std::{
    fs,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::Parser;

use sectweave::{
    coff::CoffObject,
    config::Config,
    gen,
    pe::PeImage,
    resolve::{self, ResolvedSymbols, ScoreWeight},
    scan::{self, DeclaredSymbols},
    splice, tools, Error,
};

/// Directory holding the section sources aggregated into the new section.
const SECTION_DIR: &str = "section";
/// Directory holding the stub headers with `ADDR(...)` declarations.
const INCLUDE_DIR: &str = "section/include";
/// Directory holding hook sources compiled to relocatable objects.
const HOOKS_DIR: &str = "hooks";
/// Scratch directory for intermediate artifacts.
const BUILD_DIR: &str = "build";

/// Generated aggregate driver source.
const SECTION_DRIVER: &str = "section.cpp";
/// User-supplied linker script for the section build, relative to `build/`.
const SECTION_SCRIPT: &str = "../section.ld";
/// Map file the section build emits, relative to `build/`.
const SECTION_MAP: &str = "sectmap.txt";
/// Generated definition header consumed by hook sources.
const DEFINE_FILE: &str = "define.h";
/// Collected `strings` output across all stub probes.
const SYMBOLS_TEXT: &str = "build/symbols.txt";
/// Generated declared-address linker script.
const SYMBOLS_SCRIPT: &str = "build/symbols.ld";
/// Generated placement linker script.
const PATCH_SCRIPT: &str = "patch.ld";
/// Composite artifact the placement link produces.
const PATCH_ARTIFACT: &str = "build/patch.pe";
/// Map file the placement link emits.
const PATCH_MAP: &str = "build/patchmap.txt";
/// Section image referenced by the placement script.
const SECTION_OBJECT: &str = "build/section.pe";
/// Optional signature patch list applied after the splice.
const SIG_PATCHES: &str = "SigPatches.txt";

/// The section build is linked one page below the section's own base so
/// its startup stub lands inside the reserved headers.
const IMAGE_BASE_BIAS: u32 = 0x1000;

/// sectweave - compose compiled hook code into a linked PE executable
#[derive(Debug, Parser)]
#[command(name = "sectweave", version, about, long_about = None)]
struct Cli {
    /// Path to the key/value configuration file.
    #[arg(value_name = "CONFIG", default_value = "config.txt")]
    config: PathBuf,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    tools::check_compiler().context("compiler toolchain unavailable")?;
    let config = Config::load(&cli.config);

    fs::copy(&config.target, &config.output)
        .with_context(|| format!("failed to copy {} to {}", config.target, config.output))?;

    let build_dir = Path::new(BUILD_DIR);
    fs::create_dir_all(build_dir)?;
    remove_files(build_dir, "o")?;
    remove_files(build_dir, "gch")?;
    if Path::new(SYMBOLS_TEXT).exists() {
        fs::remove_file(SYMBOLS_TEXT)?;
    }

    let mut image = PeImage::open(Path::new(&config.output))
        .with_context(|| format!("failed to open {}", config.output))?;
    if image.find_section(&config.section_name).is_some() {
        return Err(Error::SectionExists(config.section_name.clone()).into());
    }

    let layout = splice::compute_layout(&image);
    log::debug!(
        "new section placement: virtual 0x{:x}, file 0x{:x}",
        layout.virtual_offset,
        layout.raw_offset
    );

    let section_sources = sorted_files(Path::new(SECTION_DIR), "cpp")?;
    let lists = gen::collect_patcher_lists(&section_sources)?;
    gen::write_section_driver(Path::new(SECTION_DRIVER), &section_sources, &lists)?;

    if config.address_mapping {
        map_addresses(build_dir)?;
    }

    tools::compile_section(
        &config.cflags,
        build_dir,
        SECTION_SCRIPT,
        image.image_base + layout.virtual_offset - IMAGE_BASE_BIAS,
        SECTION_MAP,
        "../section.cpp",
    )?;
    gen::parse_map(&build_dir.join(SECTION_MAP), Path::new(DEFINE_FILE))?;

    remove_files(build_dir, "o")?;
    remove_files(build_dir, "gch")?;

    let hook_sources: Vec<PathBuf> = sorted_files(Path::new(HOOKS_DIR), "cpp")?
        .into_iter()
        .map(|path| Path::new("..").join(path))
        .collect();
    tools::compile_hooks(&config.cflags, build_dir, &hook_sources)?;

    let mut hooks = Vec::new();
    for object in sorted_files(build_dir, "o")? {
        hooks.push(
            CoffObject::open(&object)
                .with_context(|| format!("failed to parse {}", object.display()))?,
        );
    }
    let slots = splice::plan_hooks(&hooks);

    gen::write_patch_script(
        Path::new(PATCH_SCRIPT),
        &slots,
        &config.section_name,
        image.image_base + layout.virtual_offset,
        PATCH_ARTIFACT,
        SECTION_OBJECT,
    )?;
    tools::link_patch(Path::new(PATCH_SCRIPT), image.image_base, Path::new(PATCH_MAP))?;

    let mut artifact = PeImage::open(Path::new(PATCH_ARTIFACT))
        .context("failed to open linked patch artifact")?;
    let spliced = splice::splice_hooks(&mut image, &mut artifact, &slots)?;
    log::info!("spliced {spliced} hook section(s)");

    splice::commit_section(
        &mut image,
        &mut artifact,
        &config.section_name,
        layout,
        config.section_size,
    )?;
    drop(artifact);
    drop(image);

    if Path::new(SIG_PATCHES).exists() {
        splice::apply_patch_file(Path::new(&config.output), Path::new(SIG_PATCHES))?;
    }

    log::info!("done");
    Ok(())
}

/// Scans stub headers, probes the compiler for their mangled names and
/// writes the declared-address linker script.
fn map_addresses(build_dir: &Path) -> anyhow::Result<()> {
    let stub_files = sorted_files(Path::new(INCLUDE_DIR), "h")?;

    let mut declared = DeclaredSymbols::new();
    for stub in &stub_files {
        match scan::scan_file(stub, &mut declared) {
            Ok(()) => {}
            // logged by the scanner; earlier declarations are kept
            Err(Error::DuplicateAddress { .. }) => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to scan {}", stub.display()))
            }
        }
    }

    let symbols_text = Path::new(SYMBOLS_TEXT);
    for stub in &stub_files {
        let file_name = stub
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("stub");
        let probe = build_dir.join(format!("{file_name}.gch"));
        if let Err(err) = tools::compile_stub_probe(stub, &probe) {
            log::error!("unable to compile stub {}: {}", stub.display(), err);
            continue;
        }
        if let Err(err) = tools::extract_strings(&probe, symbols_text) {
            log::error!("unable to extract symbols from {}: {}", probe.display(), err);
        }
    }

    let mut resolved = ResolvedSymbols::new();
    if symbols_text.exists() {
        let reader = BufReader::new(fs::File::open(symbols_text)?);
        resolve::resolve_stream(reader, &declared, &mut resolved, ScoreWeight::default())?;
    }

    gen::write_symbol_script(Path::new(SYMBOLS_SCRIPT), &resolved, &declared)?;
    Ok(())
}

/// Files with the given extension inside a directory, sorted by path so
/// every downstream pass is deterministic. A missing directory is empty.
fn sorted_files(dir: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            log::warn!("no directory {}", dir.display());
            return Ok(files);
        }
    };
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn remove_files(dir: &Path, extension: &str) -> anyhow::Result<()> {
    for path in sorted_files(dir, extension)? {
        if let Err(err) = fs::remove_file(&path) {
            log::warn!("could not remove {}: {}", path.display(), err);
        }
    }
    Ok(())
}
