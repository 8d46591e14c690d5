//! Versioned binary chunk encoding.
//!
//! Layout: the 12-byte magic `CURLEE_CHUNK`, a u32 format version, then
//! `max_locals`, the code bytes, the span table, and the constant pool.
//! Version 1 encodes sizes and offsets as u32; version 2 (the written form)
//! uses u64. Decoding is strict: exact magic, known version, no trailing
//! bytes, and a span table the same length as the code. Error messages are
//! fixed strings so tooling can match them verbatim.

use crate::bytecode::chunk::{Chunk, Value};
use crate::source::Span;

const MAGIC: &[u8; 12] = b"CURLEE_CHUNK";
const VERSION_V1: u32 = 1;
const VERSION_V2: u32 = 2;

/// A chunk decoding failure with a fixed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDecodeError {
    pub message: &'static str,
}

impl ChunkDecodeError {
    fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl std::fmt::Display for ChunkDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for ChunkDecodeError {}

fn append_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn append_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Encodes a chunk in the current (v2) format.
#[must_use]
pub fn encode_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + chunk.code.len());

    out.extend_from_slice(MAGIC);
    append_u32(&mut out, VERSION_V2);

    append_u64(&mut out, chunk.max_locals as u64);

    append_u64(&mut out, chunk.code.len() as u64);
    out.extend_from_slice(&chunk.code);

    append_u64(&mut out, chunk.spans.len() as u64);
    for span in &chunk.spans {
        append_u64(&mut out, span.start as u64);
        append_u64(&mut out, span.end as u64);
    }

    append_u64(&mut out, chunk.constants.len() as u64);
    for constant in &chunk.constants {
        match constant {
            Value::Int(v) => {
                out.push(0);
                append_u64(&mut out, v.cast_unsigned());
            }
            Value::Bool(v) => {
                out.push(1);
                out.push(u8::from(*v));
            }
            Value::String(v) => {
                out.push(2);
                append_u64(&mut out, v.len() as u64);
                out.extend_from_slice(v.as_bytes());
            }
            Value::Unit => out.push(3),
        }
    }

    out
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn has(&self, n: usize) -> bool {
        self.pos + n <= self.input.len()
    }

    fn read_u8(&mut self) -> Option<u8> {
        if !self.has(1) {
            return None;
        }
        let b = self.input[self.pos];
        self.pos += 1;
        Some(b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if !self.has(4) {
            return None;
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.input[self.pos..self.pos + 4]);
        self.pos += 4;
        Some(u32::from_le_bytes(bytes))
    }

    fn read_u64(&mut self) -> Option<u64> {
        if !self.has(8) {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.input[self.pos..self.pos + 8]);
        self.pos += 8;
        Some(u64::from_le_bytes(bytes))
    }

    fn read_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if !self.has(n) {
            return None;
        }
        let out = self.input[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Some(out)
    }

    /// Reads a size field in the given version's width, guarding against
    /// values that don't fit the host `usize`.
    fn read_size(
        &mut self,
        v1: bool,
        truncated: &'static str,
        overflow: &'static str,
    ) -> Result<usize, ChunkDecodeError> {
        if v1 {
            let v = self.read_u32().ok_or(ChunkDecodeError::new(truncated))?;
            Ok(v as usize)
        } else {
            let v = self.read_u64().ok_or(ChunkDecodeError::new(truncated))?;
            usize::try_from(v).map_err(|_| ChunkDecodeError::new(overflow))
        }
    }
}

/// Decodes a chunk in either supported format version.
pub fn decode_chunk(bytes: &[u8]) -> Result<Chunk, ChunkDecodeError> {
    let mut r = Reader {
        input: bytes,
        pos: 0,
    };

    for expected in MAGIC {
        let b = r.read_u8();
        if b != Some(*expected) {
            return Err(ChunkDecodeError::new("invalid chunk header"));
        }
    }

    let version = r
        .read_u32()
        .ok_or(ChunkDecodeError::new("truncated chunk version"))?;
    if version != VERSION_V1 && version != VERSION_V2 {
        return Err(ChunkDecodeError::new("unsupported chunk format version"));
    }
    let v1 = version == VERSION_V1;

    let max_locals = r.read_size(v1, "truncated max_locals", "max_locals too large")?;

    let code_len = r.read_size(v1, "truncated code length", "code length too large")?;
    let code = r
        .read_bytes(code_len)
        .ok_or(ChunkDecodeError::new("truncated code bytes"))?;

    let spans_len = r.read_size(v1, "truncated spans length", "spans length too large")?;
    let mut spans = Vec::with_capacity(spans_len.min(code_len));
    for _ in 0..spans_len {
        let start = r.read_size(v1, "truncated span", "span offset too large")?;
        let end = r.read_size(v1, "truncated span", "span offset too large")?;
        spans.push(Span::new(start, end));
    }

    let const_len = r.read_size(v1, "truncated constants length", "constants length too large")?;
    let mut constants = Vec::with_capacity(const_len.min(bytes.len()));
    for _ in 0..const_len {
        let kind = r
            .read_u8()
            .ok_or(ChunkDecodeError::new("truncated constant kind"))?;
        match kind {
            0 => {
                let raw = r
                    .read_u64()
                    .ok_or(ChunkDecodeError::new("truncated int constant"))?;
                constants.push(Value::Int(raw.cast_signed()));
            }
            1 => {
                let b = r
                    .read_u8()
                    .ok_or(ChunkDecodeError::new("truncated bool constant"))?;
                if b > 1 {
                    return Err(ChunkDecodeError::new("invalid bool constant"));
                }
                constants.push(Value::Bool(b == 1));
            }
            2 => {
                let len = r.read_size(
                    v1,
                    "truncated string constant length",
                    "string constant too large",
                )?;
                let raw = r
                    .read_bytes(len)
                    .ok_or(ChunkDecodeError::new("truncated string constant"))?;
                let s = String::from_utf8(raw)
                    .map_err(|_| ChunkDecodeError::new("invalid string constant"))?;
                constants.push(Value::String(s));
            }
            3 => constants.push(Value::Unit),
            _ => return Err(ChunkDecodeError::new("unknown constant kind")),
        }
    }

    if spans.len() != code.len() {
        return Err(ChunkDecodeError::new("span map length mismatch"));
    }

    if r.pos != bytes.len() {
        return Err(ChunkDecodeError::new("unexpected trailing bytes"));
    }

    Ok(Chunk {
        code,
        spans,
        constants,
        max_locals,
    })
}
