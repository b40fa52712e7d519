//! External model-checker handshake: sequences `pins2lts-seq` and
//! `stir-bin-export` over a temp directory, per the subprocess contract.

use std::path::Path;
use std::process::Command;

use crate::error::{CompileError, CompileResult};

pub struct ModelCheckPaths<'a> {
    pub ltsmin: &'a Path,
    pub pins_stir: &'a Path,
}

/// Runs the external model checker against `stir_text` and returns the raw
/// co-occurrence CSV produced by the binary exporter.
pub fn model_check(paths: ModelCheckPaths<'_>, stir_text: &str) -> CompileResult<String> {
    let dir = tempfile::tempdir()?;
    let stir_file = dir.path().join("module.stir");
    let bin_file = dir.path().join("state_space.bin");
    std::fs::write(&stir_file, stir_text)?;

    let checker_bin = paths.ltsmin.join("bin").join("pins2lts-seq");
    let pins_lib = paths.pins_stir.join("libpins-stir.so");
    tracing::debug!(?checker_bin, ?pins_lib, "invoking model checker");

    let status = Command::new(&checker_bin)
        .arg(&pins_lib)
        .env("PINS_STIR_MODEL", &stir_file)
        .env("PINS_STIR_OUTPUT", &bin_file)
        .status()
        .map_err(|e| CompileError::Subprocess(format!("{}: {e}", checker_bin.display())))?;
    if !status.success() {
        return Err(CompileError::ModelCheck(
            status.code(),
            format!("{} failed", checker_bin.display()),
        ));
    }

    let exporter_bin = paths.pins_stir.join("stir-bin-export");
    tracing::debug!(?exporter_bin, "invoking state-space exporter");
    let output = Command::new(&exporter_bin)
        .arg(&stir_file)
        .arg(&bin_file)
        .output()
        .map_err(|e| CompileError::Subprocess(format!("{}: {e}", exporter_bin.display())))?;
    if !output.status.success() {
        return Err(CompileError::ModelCheck(
            output.status.code(),
            format!("{} failed", exporter_bin.display()),
        ));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| CompileError::Subprocess(format!("exporter produced non-UTF-8 output: {e}")))
}
