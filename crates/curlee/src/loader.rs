//! Module loading: follows imports, detects cycles, merges modules.
//!
//! `import p.q.r` canonicalizes to `p/q/r.curlee` and is looked up in each
//! configured root. Modules are cached per loader session; a module on the
//! current loading path is a cycle (including a file importing itself). The
//! merged program contains every module's top-level items with the entry's
//! first, then gets a fresh expression-id numbering.
//!
//! Import tracing is a per-run configuration value, not a global: the CLI
//! seeds it from `CURLEE_DEBUG_IMPORTS=1`.

use std::path::{Path, PathBuf};

use ahash::{AHashMap, AHashSet};

use crate::ast::{Program, reassign_expr_ids};
use crate::bundle::{Manifest, hash_bytes};
use crate::diag::Diagnostic;
use crate::lexer::lex;
use crate::parser::parse;
use crate::source::SourceFile;

/// Per-run loader configuration, threaded through every load.
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// When set, log `[import] …` lines to stderr.
    pub trace_imports: bool,
}

/// One loaded module: its identity, raw source, and parsed items.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Dotted import path (`p.q.r`); the entry file's stem for the entry.
    pub dotted: String,
    pub path: PathBuf,
    pub source: SourceFile,
    pub program: Program,
    pub is_entry: bool,
}

/// A fully loaded, merged program.
#[derive(Debug, Clone)]
pub struct LoadedProgram {
    /// Merged items of every module, expression ids reassigned.
    pub program: Program,
    /// The entry module first, imports in load order after it.
    pub modules: Vec<LoadedModule>,
}

impl LoadedProgram {
    /// The entry module (always present).
    #[must_use]
    pub fn entry(&self) -> &LoadedModule {
        &self.modules[0]
    }
}

/// Diagnostics anchored to one specific file.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: String,
    pub source: String,
    pub diags: Vec<Diagnostic>,
}

impl LoadFailure {
    fn new(path: &Path, source: impl Into<String>, diags: Vec<Diagnostic>) -> Self {
        Self {
            path: path.display().to_string(),
            source: source.into(),
            diags,
        }
    }
}

struct Loader<'a> {
    roots: &'a [PathBuf],
    config: &'a LoaderConfig,
    /// Canonical paths currently being loaded (cycle detection).
    visiting: AHashSet<PathBuf>,
    /// Canonical path -> index into `modules` for already-loaded modules.
    cache: AHashMap<PathBuf, usize>,
    modules: Vec<LoadedModule>,
}

impl<'a> Loader<'a> {
    fn trace(&self, message: &str) {
        if self.config.trace_imports {
            eprintln!("[import] {message}");
        }
    }

    fn canonical(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn load_file(
        &mut self,
        path: &Path,
        dotted: String,
        is_entry: bool,
    ) -> Result<usize, LoadFailure> {
        let canonical = Self::canonical(path);

        if self.visiting.contains(&canonical) {
            return Err(LoadFailure::new(
                path,
                String::new(),
                vec![Diagnostic::error(format!("import cycle detected: '{dotted}'"))],
            ));
        }
        if let Some(&index) = self.cache.get(&canonical) {
            return Ok(index);
        }

        let Ok(contents) = std::fs::read_to_string(path) else {
            return Err(LoadFailure::new(
                path,
                String::new(),
                vec![Diagnostic::error(format!(
                    "failed to read '{}'",
                    path.display()
                ))],
            ));
        };

        let source = SourceFile::new(path.display().to_string(), contents.clone());
        let tokens = match lex(&source.contents) {
            Ok(tokens) => tokens,
            Err(diag) => return Err(LoadFailure::new(path, contents, vec![diag])),
        };
        let program = match parse(&tokens) {
            Ok(program) => program,
            Err(diags) => return Err(LoadFailure::new(path, contents, diags)),
        };

        self.visiting.insert(canonical.clone());

        let imports: Vec<_> = program.imports().cloned().collect();
        for import in &imports {
            let dotted_import = import.dotted_path();
            let relative: PathBuf = format!("{}.curlee", import.path_segments.join("/")).into();

            let mut resolved = None;
            for root in self.roots {
                let candidate = root.join(&relative);
                self.trace(&format!("trying {}", candidate.display()));
                if candidate.is_file() {
                    self.trace(&format!("ok: {}", candidate.display()));
                    resolved = Some(candidate);
                    break;
                }
            }
            let Some(candidate) = resolved else {
                self.trace(&format!("failed: {dotted_import}"));
                self.visiting.remove(&canonical);
                return Err(LoadFailure::new(
                    path,
                    contents,
                    vec![Diagnostic::error_at(
                        import.span,
                        format!("import not found: '{dotted_import}'"),
                    )],
                ));
            };

            let loaded = self.load_file(&candidate, dotted_import.clone(), false);
            match loaded {
                Ok(index) => {
                    if self.modules[index].program.functions().any(|f| f.name == "main") {
                        self.visiting.remove(&canonical);
                        return Err(LoadFailure::new(
                            path,
                            contents,
                            vec![Diagnostic::error_at(
                                import.span,
                                format!("imported module defines 'main': '{dotted_import}'"),
                            )],
                        ));
                    }
                }
                Err(failure) => {
                    // A bare cycle failure (empty source) comes from the
                    // visiting check; surface it at the import statement of
                    // the importing file rather than inside the cycle.
                    self.visiting.remove(&canonical);
                    if failure.source.is_empty()
                        && failure.diags.len() == 1
                        && failure.diags[0].message.starts_with("import cycle detected")
                    {
                        return Err(LoadFailure::new(
                            path,
                            contents,
                            vec![Diagnostic::error_at(
                                import.span,
                                format!("import cycle detected: '{dotted_import}'"),
                            )],
                        ));
                    }
                    return Err(failure);
                }
            }
        }

        self.visiting.remove(&canonical);

        let index = self.modules.len();
        self.modules.push(LoadedModule {
            dotted,
            path: path.to_path_buf(),
            source,
            program,
            is_entry,
        });
        self.cache.insert(canonical, index);
        Ok(index)
    }
}

/// Loads the entry file and every transitively imported module, then merges
/// them into one program.
pub fn load_program(
    entry_path: &Path,
    roots: &[PathBuf],
    config: &LoaderConfig,
) -> Result<LoadedProgram, LoadFailure> {
    let entry_dotted = entry_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut loader = Loader {
        roots,
        config,
        visiting: AHashSet::new(),
        cache: AHashMap::new(),
        modules: Vec::new(),
    };

    let entry_index = loader.load_file(entry_path, entry_dotted, true)?;

    // Entry first, imports in load order after it.
    let mut modules = loader.modules;
    let entry = modules.remove(entry_index);
    modules.insert(0, entry);

    check_cross_module_duplicates(&modules)?;

    let mut merged = Program::default();
    for module in &modules {
        merged.items.extend(module.program.items.iter().cloned());
    }
    reassign_expr_ids(&mut merged);

    Ok(LoadedProgram {
        program: merged,
        modules,
    })
}

fn check_cross_module_duplicates(modules: &[LoadedModule]) -> Result<(), LoadFailure> {
    let mut seen: AHashMap<&str, &LoadedModule> = AHashMap::new();
    for module in modules {
        for f in module.program.functions() {
            if let Some(first_module) = seen.get(f.name.as_str()) {
                return Err(LoadFailure::new(
                    &module.path,
                    module.source.contents.clone(),
                    vec![
                        Diagnostic::error_at(
                            f.name_span,
                            format!("duplicate function across modules: '{}'", f.name),
                        )
                        .with_note(
                            format!("first defined in module '{}'", first_module.dotted),
                            None,
                        ),
                    ],
                ));
            }
            seen.insert(f.name.as_str(), module);
        }
    }
    Ok(())
}

/// Verifies every imported module against a bundle manifest's pins.
///
/// The entry module itself is not pinned; each import must appear with the
/// FNV-1a-64 hex digest of its raw source bytes.
pub fn check_pins(loaded: &LoadedProgram, manifest: &Manifest) -> Result<(), Vec<Diagnostic>> {
    let mut diags = Vec::new();
    for module in loaded.modules.iter().filter(|m| !m.is_entry) {
        let actual = hash_bytes(module.source.contents.as_bytes());
        match manifest.imports.iter().find(|pin| pin.path == module.dotted) {
            None => {
                diags.push(
                    Diagnostic::error(format!("import not pinned: '{}'", module.dotted))
                        .with_note(format!("expected pin: {}:{actual}", module.dotted), None),
                );
            }
            Some(pin) if pin.hash != actual => {
                diags.push(
                    Diagnostic::error(format!(
                        "import pin hash mismatch: '{}'",
                        module.dotted
                    ))
                    .with_note(format!("expected: {}", pin.hash), None)
                    .with_note(format!("actual: {actual}"), None),
                );
            }
            Some(_) => {}
        }
    }
    if diags.is_empty() { Ok(()) } else { Err(diags) }
}
