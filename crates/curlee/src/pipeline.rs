//! Stage orchestration: one entry point per pipeline depth.
//!
//! `lex → parse → load imports → merge → resolve → type check → verify →
//! emit`. The first stage to produce any diagnostic stops the pipeline and
//! is the only stage contributing diagnostics for that run. Failures are
//! anchored to a concrete file so callers can render `path:line:col`
//! locations; post-merge stages anchor to the entry file.

use std::path::{Path, PathBuf};

use crate::ast::Program;
use crate::bytecode::{Chunk, emit_bytecode};
use crate::diag::Diagnostic;
use crate::lexer::lex;
use crate::loader::{LoadFailure, LoadedProgram, LoaderConfig, load_program};
use crate::parser::parse;
use crate::resolver::{Resolution, resolve};
use crate::source::SourceFile;
use crate::typecheck::type_check;
use crate::types::TypeInfo;
use crate::verify::verify;

/// A program that has passed every analysis stage.
#[derive(Debug)]
pub struct CheckedProgram {
    pub loaded: LoadedProgram,
    pub resolution: Resolution,
    pub type_info: TypeInfo,
}

fn entry_failure(loaded: &LoadedProgram, diags: Vec<Diagnostic>) -> LoadFailure {
    let entry = loaded.entry();
    LoadFailure {
        path: entry.source.path.clone(),
        source: entry.source.contents.clone(),
        diags,
    }
}

/// Runs every analysis stage over the entry file and its imports.
pub fn check_file(
    entry_path: &Path,
    roots: &[PathBuf],
    config: &LoaderConfig,
) -> Result<CheckedProgram, LoadFailure> {
    let loaded = load_program(entry_path, roots, config)?;

    let resolution = match resolve(&loaded.program) {
        Ok(resolution) => resolution,
        Err(diags) => return Err(entry_failure(&loaded, diags)),
    };

    let type_info = match type_check(&loaded.program) {
        Ok(type_info) => type_info,
        Err(diags) => return Err(entry_failure(&loaded, diags)),
    };

    if let Err(diags) = verify(&loaded.program, &type_info) {
        return Err(entry_failure(&loaded, diags));
    }

    Ok(CheckedProgram {
        loaded,
        resolution,
        type_info,
    })
}

/// Checks and emits bytecode for the entry file.
pub fn compile_file(
    entry_path: &Path,
    roots: &[PathBuf],
    config: &LoaderConfig,
) -> Result<(CheckedProgram, Chunk), LoadFailure> {
    let checked = check_file(entry_path, roots, config)?;
    match emit_bytecode(&checked.loaded.program) {
        Ok(chunk) => Ok((checked, chunk)),
        Err(diags) => Err(entry_failure(&checked.loaded, diags)),
    }
}

/// Single-file analysis without imports or verification, for editor
/// tooling: lex, parse, resolve, type check.
pub fn analyze_source(
    file: &SourceFile,
) -> Result<(Program, Resolution, TypeInfo), Vec<Diagnostic>> {
    let tokens = lex(&file.contents).map_err(|diag| vec![diag])?;
    let program = parse(&tokens)?;
    let resolution = resolve(&program)?;
    let type_info = type_check(&program)?;
    Ok((program, resolution, type_info))
}
