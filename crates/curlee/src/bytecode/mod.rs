//! Bytecode: opcodes, chunks, the emitter, and the binary codec.

pub use chunk::{Chunk, Value};
pub use codec::{ChunkDecodeError, decode_chunk, encode_chunk};
pub use emitter::{ENTRY_FUNCTION, emit_bytecode};
pub use op::OpCode;

mod chunk;
mod codec;
mod emitter;
mod op;
