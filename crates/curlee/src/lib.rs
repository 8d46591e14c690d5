#![doc = include_str!("../../../README.md")]

pub mod ast;
pub mod bundle;
pub mod bytecode;
pub mod capability;
pub mod diag;
pub mod interop;
pub mod io;
pub mod lexer;
pub mod loader;
pub mod lowering;
pub mod lsp;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod smt;
pub mod source;
pub mod typecheck;
pub mod types;
pub mod verify;
pub mod vm;

pub use crate::bundle::{Bundle, BundleError, ImportPin, Manifest, hash_bytes};
pub use crate::bytecode::{Chunk, OpCode, Value, decode_chunk, emit_bytecode, encode_chunk};
pub use crate::capability::{CAP_PYTHON_FFI, CAP_STDOUT, CapabilitySet};
pub use crate::diag::{Diagnostic, Related, Severity};
pub use crate::interop::{InteropBridge, LoopbackBridge, ProcessBridge};
pub use crate::io::{CollectStringPrint, NoPrint, PrintSink, StdPrint};
pub use crate::loader::{LoadFailure, LoadedProgram, LoaderConfig, load_program};
pub use crate::pipeline::{CheckedProgram, check_file, compile_file};
pub use crate::source::{LineMap, SourceFile, Span};
pub use crate::types::{Type, TypeInfo};
pub use crate::vm::{UNLIMITED_FUEL, Vm, VmError};
