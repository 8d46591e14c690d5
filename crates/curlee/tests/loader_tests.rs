//! Module loader tests: import resolution, cycles, merging, and pins.

use std::path::PathBuf;

use curlee::bundle::{ImportPin, Manifest, hash_bytes};
use curlee::loader::{LoaderConfig, check_pins, load_program};

/// Creates a fresh scratch directory for one test.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("curlee-loader-tests")
        .join(format!("{}-{name}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).expect("scratch dir should be removable");
    }
    std::fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

fn write_file(dir: &PathBuf, relative: &str, contents: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("module dir should be creatable");
    }
    std::fs::write(&path, contents).expect("module file should be writable");
    path
}

fn config() -> LoaderConfig {
    LoaderConfig::default()
}

#[test]
fn single_file_loads_without_imports() {
    let dir = scratch_dir("single");
    let entry = write_file(&dir, "main.curlee", "fn main() -> Int { return 1; }");
    let loaded = load_program(&entry, &[dir], &config()).expect("load should succeed");
    assert_eq!(loaded.modules.len(), 1);
    assert!(loaded.modules[0].is_entry);
    assert_eq!(loaded.program.functions().count(), 1);
}

#[test]
fn imports_resolve_to_slash_paths_under_the_roots() {
    let dir = scratch_dir("nested");
    write_file(
        &dir,
        "stdlib/math.curlee",
        "fn abs(x: Int) -> Int { return x; }",
    );
    let entry = write_file(
        &dir,
        "main.curlee",
        "import stdlib.math; fn main() -> Int { return abs(1); }",
    );
    let loaded = load_program(&entry, &[dir], &config()).expect("load should succeed");
    assert_eq!(loaded.modules.len(), 2);
    assert_eq!(loaded.modules[1].dotted, "stdlib.math");
    // Both modules' functions are merged into one program.
    assert_eq!(loaded.program.functions().count(), 2);
}

#[test]
fn missing_import_is_reported_at_the_import_statement() {
    let dir = scratch_dir("missing");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import no.such.module; fn main() -> Int { return 1; }",
    );
    let failure = load_program(&entry, &[dir], &config()).expect_err("expected load failure");
    assert!(
        failure.diags[0]
            .message
            .contains("import not found: 'no.such.module'"),
        "unexpected message: {}",
        failure.diags[0].message
    );
    assert!(failure.diags[0].span.is_some());
}

#[test]
fn self_import_is_a_cycle() {
    let dir = scratch_dir("self-cycle");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import main; fn main() -> Int { return 1; }",
    );
    let failure = load_program(&entry, &[dir], &config()).expect_err("expected load failure");
    assert!(
        failure.diags[0].message.contains("import cycle detected"),
        "unexpected message: {}",
        failure.diags[0].message
    );
}

#[test]
fn mutual_imports_are_a_cycle() {
    let dir = scratch_dir("mutual-cycle");
    write_file(&dir, "a.curlee", "import b; fn fa() -> Int { return 1; }");
    write_file(&dir, "b.curlee", "import a; fn fb() -> Int { return 2; }");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import a; fn main() -> Int { return 0; }",
    );
    let failure = load_program(&entry, &[dir], &config()).expect_err("expected load failure");
    assert!(
        failure.diags[0].message.contains("import cycle detected"),
        "unexpected message: {}",
        failure.diags[0].message
    );
}

#[test]
fn modules_are_loaded_once_per_session() {
    let dir = scratch_dir("diamond");
    write_file(&dir, "shared.curlee", "fn shared() -> Int { return 1; }");
    write_file(&dir, "a.curlee", "import shared; fn fa() -> Int { return 1; }");
    write_file(&dir, "b.curlee", "import shared; fn fb() -> Int { return 2; }");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import a; import b; fn main() -> Int { return 0; }",
    );
    let loaded = load_program(&entry, &[dir], &config()).expect("load should succeed");
    // main, a, b, shared — shared only once despite two importers.
    assert_eq!(loaded.modules.len(), 4);
}

#[test]
fn imported_module_defining_main_is_rejected() {
    let dir = scratch_dir("imported-main");
    write_file(&dir, "dep.curlee", "fn main() -> Int { return 1; }");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import dep; fn main() -> Int { return 0; }",
    );
    let failure = load_program(&entry, &[dir], &config()).expect_err("expected load failure");
    assert!(
        failure.diags[0]
            .message
            .contains("imported module defines 'main': 'dep'"),
        "unexpected message: {}",
        failure.diags[0].message
    );
}

#[test]
fn duplicate_functions_across_modules_are_rejected() {
    let dir = scratch_dir("cross-dup");
    write_file(&dir, "dep.curlee", "fn helper() -> Int { return 1; }");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import dep; fn helper() -> Int { return 2; } fn main() -> Int { return 0; }",
    );
    let failure = load_program(&entry, &[dir], &config()).expect_err("expected load failure");
    assert!(
        failure.diags[0]
            .message
            .contains("duplicate function across modules: 'helper'"),
        "unexpected message: {}",
        failure.diags[0].message
    );
    assert!(!failure.diags[0].notes.is_empty(), "expected a related note");
}

#[test]
fn parse_errors_in_imports_name_the_imported_file() {
    let dir = scratch_dir("broken-import");
    write_file(&dir, "dep.curlee", "fn broken( { }");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import dep; fn main() -> Int { return 0; }",
    );
    let failure = load_program(&entry, &[dir], &config()).expect_err("expected load failure");
    assert!(
        failure.path.ends_with("dep.curlee"),
        "failure should be anchored to the imported file: {}",
        failure.path
    );
}

#[test]
fn matching_pins_pass_the_manifest_check() {
    let dir = scratch_dir("pins-ok");
    let dep_source = "fn helper() -> Int { return 1; }";
    write_file(&dir, "dep.curlee", dep_source);
    let entry = write_file(
        &dir,
        "main.curlee",
        "import dep; fn main() -> Int { return helper(); }",
    );
    let loaded = load_program(&entry, &[dir], &config()).expect("load should succeed");

    let manifest = Manifest {
        imports: vec![ImportPin {
            path: "dep".to_string(),
            hash: hash_bytes(dep_source.as_bytes()),
        }],
        ..Manifest::default()
    };
    check_pins(&loaded, &manifest).expect("pins should match");
}

#[test]
fn unpinned_import_is_reported_with_the_expected_pin() {
    let dir = scratch_dir("pins-missing");
    write_file(&dir, "dep.curlee", "fn helper() -> Int { return 1; }");
    let entry = write_file(
        &dir,
        "main.curlee",
        "import dep; fn main() -> Int { return helper(); }",
    );
    let loaded = load_program(&entry, &[dir], &config()).expect("load should succeed");

    let diags = check_pins(&loaded, &Manifest::default()).expect_err("expected pin failure");
    assert!(diags[0].message.contains("import not pinned: 'dep'"));
    assert!(
        diags[0].notes[0].message.starts_with("expected pin: dep:"),
        "note should suggest the pin: {}",
        diags[0].notes[0].message
    );
}

#[test]
fn pin_hash_mismatch_reports_expected_and_actual() {
    let dir = scratch_dir("pins-mismatch");
    let dep_source = "fn helper() -> Int { return 1; }";
    write_file(&dir, "dep.curlee", dep_source);
    let entry = write_file(
        &dir,
        "main.curlee",
        "import dep; fn main() -> Int { return helper(); }",
    );
    let loaded = load_program(&entry, &[dir], &config()).expect("load should succeed");

    let manifest = Manifest {
        imports: vec![ImportPin {
            path: "dep".to_string(),
            hash: "deadbeef".to_string(),
        }],
        ..Manifest::default()
    };
    let diags = check_pins(&loaded, &manifest).expect_err("expected pin failure");
    assert!(diags[0].message.contains("import pin hash mismatch: 'dep'"));
    let notes: Vec<&str> = diags[0].notes.iter().map(|n| n.message.as_str()).collect();
    assert!(notes.iter().any(|n| n.contains("expected: deadbeef")), "{notes:?}");
    assert!(
        notes
            .iter()
            .any(|n| n.contains(&format!("actual: {}", hash_bytes(dep_source.as_bytes())))),
        "{notes:?}"
    );
}
