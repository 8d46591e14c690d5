//! The `curlee` command-line tool.
//!
//! Exit codes: 0 on success, 1 for execution or verification errors, 2 for
//! usage errors. Diagnostics render to stderr; command output to stdout.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use curlee::ast::dump;
use curlee::bundle::{Bundle, read_bundle};
use curlee::diag::render_all;
use curlee::interop::{InteropBridge, LoopbackBridge, ProcessBridge};
use curlee::lexer::lex;
use curlee::loader::{LoadFailure, LoaderConfig, check_pins};
use curlee::parser::parse;
use curlee::pipeline::{check_file, compile_file};
use curlee::{CapabilitySet, Diagnostic, LineMap, StdPrint, UNLIMITED_FUEL, Vm};

const USAGE: &str = "usage: curlee <command> [args]

commands:
  lex <file.curlee>
  parse <file.curlee>
  check <file.curlee>
  fmt --check <file.curlee> | fmt --write <file.curlee>
  run [--cap NAME] [--fuel N] [--bundle PATH] <file.curlee>
  bundle verify <file.bundle> | bundle info <file.bundle>
  version
  help
";

const SUCCESS: u8 = 0;
const FAILURE: u8 = 1;
const USAGE_ERROR: u8 = 2;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    ExitCode::from(run(&args))
}

fn run(args: &[String]) -> u8 {
    let Some(command) = args.first() else {
        eprint!("{USAGE}");
        return USAGE_ERROR;
    };

    match command.as_str() {
        "lex" => cmd_lex(&args[1..]),
        "parse" => cmd_parse(&args[1..]),
        "check" => cmd_check(&args[1..]),
        "fmt" => cmd_fmt(&args[1..]),
        "run" => cmd_run(&args[1..]),
        "bundle" => cmd_bundle(&args[1..]),
        "version" => {
            println!("curlee {}", env!("CARGO_PKG_VERSION"));
            SUCCESS
        }
        "help" | "--help" | "-h" => {
            print!("{USAGE}");
            SUCCESS
        }
        _ => {
            eprintln!("error: unknown command '{command}'");
            eprint!("{USAGE}");
            USAGE_ERROR
        }
    }
}

fn usage_error(message: &str) -> u8 {
    eprintln!("error: {message}");
    USAGE_ERROR
}

fn print_failure(failure: &LoadFailure) -> u8 {
    let map = LineMap::new(&failure.source);
    eprint!("{}", render_all(&failure.diags, &failure.path, &map));
    FAILURE
}

fn print_diags(diags: &[Diagnostic], path: &str, source: &str) -> u8 {
    let map = LineMap::new(source);
    eprint!("{}", render_all(diags, path, &map));
    FAILURE
}

fn read_source(path: &str) -> Result<String, u8> {
    std::fs::read_to_string(path).map_err(|_| {
        eprintln!("error: failed to read '{path}'");
        FAILURE
    })
}

fn loader_config() -> LoaderConfig {
    LoaderConfig {
        trace_imports: env::var("CURLEE_DEBUG_IMPORTS").is_ok_and(|v| v == "1"),
    }
}

fn roots_for(path: &Path) -> Vec<PathBuf> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    vec![parent.map_or_else(|| PathBuf::from("."), Path::to_path_buf)]
}

fn cmd_lex(args: &[String]) -> u8 {
    let [path] = args else {
        return usage_error("expected curlee lex <file.curlee>");
    };
    let source = match read_source(path) {
        Ok(source) => source,
        Err(code) => return code,
    };
    match lex(&source) {
        Ok(tokens) => {
            for token in &tokens {
                println!(
                    "{} '{}' @{}..{}",
                    token.kind, token.lexeme, token.span.start, token.span.end
                );
            }
            SUCCESS
        }
        Err(diag) => print_diags(&[diag], path, &source),
    }
}

fn parse_source(path: &str, source: &str) -> Result<curlee::ast::Program, u8> {
    let tokens = lex(source).map_err(|diag| print_diags(&[diag], path, source))?;
    parse(&tokens).map_err(|diags| print_diags(&diags, path, source))
}

fn cmd_parse(args: &[String]) -> u8 {
    let [path] = args else {
        return usage_error("expected curlee parse <file.curlee>");
    };
    let source = match read_source(path) {
        Ok(source) => source,
        Err(code) => return code,
    };
    match parse_source(path, &source) {
        Ok(program) => {
            println!("{}", dump(&program));
            SUCCESS
        }
        Err(code) => code,
    }
}

fn cmd_check(args: &[String]) -> u8 {
    let [path] = args else {
        return usage_error("expected curlee check <file.curlee>");
    };
    let entry = PathBuf::from(path);
    match check_file(&entry, &roots_for(&entry), &loader_config()) {
        Ok(_) => {
            println!("curlee check: OK");
            SUCCESS
        }
        Err(failure) => print_failure(&failure),
    }
}

fn cmd_fmt(args: &[String]) -> u8 {
    let (mode, path) = match args {
        [mode, path] if mode == "--check" || mode == "--write" => (mode.as_str(), path),
        _ => {
            return usage_error(
                "expected curlee fmt --check <file.curlee> | curlee fmt --write <file.curlee>",
            );
        }
    };
    let source = match read_source(path) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let program = match parse_source(path, &source) {
        Ok(program) => program,
        Err(code) => return code,
    };
    let formatted = format!("{}\n", dump(&program));

    if mode == "--check" {
        if source == formatted {
            SUCCESS
        } else {
            println!("would reformat: {path}");
            FAILURE
        }
    } else if std::fs::write(path, formatted).is_ok() {
        SUCCESS
    } else {
        eprintln!("error: failed to write '{path}'");
        FAILURE
    }
}

struct RunOptions {
    capabilities: Vec<String>,
    fuel: u64,
    bundle: Option<PathBuf>,
    file: PathBuf,
}

fn parse_run_args(args: &[String]) -> Result<RunOptions, u8> {
    let mut capabilities = Vec::new();
    let mut fuel = UNLIMITED_FUEL;
    let mut bundle = None;
    let mut file = None;

    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--cap" || arg == "--capability" {
            let Some(value) = iter.next() else {
                return Err(usage_error(&format!("expected capability name after {arg}")));
            };
            capabilities.push(value.clone());
        } else if let Some(value) = arg.strip_prefix("--cap=") {
            if value.is_empty() {
                return Err(usage_error("expected capability name after --cap="));
            }
            capabilities.push(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--capability=") {
            if value.is_empty() {
                return Err(usage_error("expected capability name after --capability="));
            }
            capabilities.push(value.to_string());
        } else if arg == "--fuel" {
            let Some(value) = iter.next() else {
                return Err(usage_error("expected integer after --fuel"));
            };
            fuel = value
                .parse()
                .map_err(|_| usage_error("expected non-negative integer for --fuel"))?;
        } else if let Some(value) = arg.strip_prefix("--fuel=") {
            fuel = value
                .parse()
                .map_err(|_| usage_error("expected non-negative integer for --fuel="))?;
        } else if arg == "--bundle" {
            let Some(value) = iter.next() else {
                return Err(usage_error("expected path after --bundle"));
            };
            bundle = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--bundle=") {
            bundle = Some(PathBuf::from(value));
        } else if arg.starts_with('-') {
            return Err(usage_error(&format!("unknown option '{arg}'")));
        } else if file.is_none() {
            file = Some(PathBuf::from(arg));
        } else {
            return Err(usage_error("unexpected extra argument"));
        }
    }

    let Some(file) = file else {
        return Err(usage_error(
            "expected curlee run [--cap NAME] [--fuel N] [--bundle PATH] <file.curlee>",
        ));
    };

    Ok(RunOptions {
        capabilities,
        fuel,
        bundle,
        file,
    })
}

fn interop_bridge() -> Box<dyn InteropBridge> {
    match env::var("CURLEE_PYTHON_RUNNER") {
        Ok(command) if !command.is_empty() => Box::new(ProcessBridge::new(command)),
        _ => Box::new(LoopbackBridge),
    }
}

fn cmd_run(args: &[String]) -> u8 {
    let options = match parse_run_args(args) {
        Ok(options) => options,
        Err(code) => return code,
    };

    let bundle: Option<Bundle> = match &options.bundle {
        Some(path) => match read_bundle(path) {
            Ok(bundle) => Some(bundle),
            Err(err) => {
                eprintln!("error: {err}");
                return FAILURE;
            }
        },
        None => None,
    };

    let (checked, chunk) =
        match compile_file(&options.file, &roots_for(&options.file), &loader_config()) {
            Ok(result) => result,
            Err(failure) => return print_failure(&failure),
        };

    let capabilities = CapabilitySet::new(options.capabilities.clone());

    // Bundle mode gates execution on pinned imports and granted
    // capabilities before any bytecode runs.
    if let Some(bundle) = &bundle {
        if let Err(diags) = check_pins(&checked.loaded, &bundle.manifest) {
            let entry = checked.loaded.entry();
            return print_diags(&diags, &entry.source.path, &entry.source.contents);
        }
        let missing = capabilities.missing_from(&bundle.manifest.capabilities);
        if let Some(first) = missing.first() {
            eprintln!("error: missing capability required by bundle: {first}");
            return FAILURE;
        }
    }

    let mut bridge = interop_bridge();
    let vm = Vm::new(capabilities);
    match vm.run(&chunk, options.fuel, &mut StdPrint, bridge.as_mut()) {
        Ok(value) => {
            println!("curlee run: result {value}");
            SUCCESS
        }
        Err(err) => {
            let entry = checked.loaded.entry();
            let diag = match err.span {
                Some(span) => Diagnostic::error_at(span, err.message),
                None => Diagnostic::error(err.message),
            };
            print_diags(&[diag], &entry.source.path, &entry.source.contents)
        }
    }
}

fn cmd_bundle(args: &[String]) -> u8 {
    let [subcommand, path] = args else {
        return usage_error("expected curlee bundle <verify|info> <file.bundle>");
    };
    match subcommand.as_str() {
        "verify" => match read_bundle(Path::new(path)) {
            Ok(_) => {
                println!("curlee bundle verify: OK");
                SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                FAILURE
            }
        },
        "info" => match read_bundle(Path::new(path)) {
            Ok(bundle) => {
                let manifest = &bundle.manifest;
                let imports: Vec<String> = manifest
                    .imports
                    .iter()
                    .map(|pin| format!("{}:{}", pin.path, pin.hash))
                    .collect();
                println!("curlee bundle info:");
                println!("format_version: {}", manifest.format_version);
                println!("bytecode_hash: {}", manifest.bytecode_hash);
                println!("capabilities: {}", manifest.capabilities.join(","));
                println!("imports: {}", imports.join(","));
                println!(
                    "proof: {}",
                    if manifest.proof.is_some() { "present" } else { "none" }
                );
                SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                FAILURE
            }
        },
        _ => usage_error("expected curlee bundle <verify|info> <file.bundle>"),
    }
}
