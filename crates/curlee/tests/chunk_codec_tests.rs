//! Binary chunk codec tests: round trips, version compatibility, and the
//! fixed decode error strings.

use curlee::bytecode::{Chunk, Value, decode_chunk, encode_chunk};
use curlee::source::Span;

use pretty_assertions::assert_eq;

fn sample_chunk() -> Chunk {
    Chunk {
        code: vec![0, 1, 0, 16],
        spans: vec![
            Span::new(0, 3),
            Span::new(0, 3),
            Span::new(0, 3),
            Span::new(4, 10),
        ],
        constants: vec![
            Value::Int(-42),
            Value::Bool(true),
            Value::String("hello".to_string()),
            Value::Unit,
        ],
        max_locals: 3,
    }
}

fn expect_decode_error(bytes: &[u8], message: &str) {
    let err = decode_chunk(bytes).expect_err("expected decode failure");
    assert_eq!(err.message, message);
}

#[test]
fn v2_round_trip_preserves_everything() {
    let chunk = sample_chunk();
    let decoded = decode_chunk(&encode_chunk(&chunk)).expect("decode should succeed");
    assert_eq!(decoded, chunk);
}

#[test]
fn empty_chunk_round_trips() {
    let chunk = Chunk::default();
    let decoded = decode_chunk(&encode_chunk(&chunk)).expect("decode should succeed");
    assert_eq!(decoded, chunk);
}

/// Hand-encodes the sample chunk in the v1 (u32 sizes) layout.
fn encode_v1(chunk: &Chunk) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"CURLEE_CHUNK");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&u32::try_from(chunk.max_locals).expect("fits").to_le_bytes());
    out.extend_from_slice(&u32::try_from(chunk.code.len()).expect("fits").to_le_bytes());
    out.extend_from_slice(&chunk.code);
    out.extend_from_slice(&u32::try_from(chunk.spans.len()).expect("fits").to_le_bytes());
    for span in &chunk.spans {
        out.extend_from_slice(&u32::try_from(span.start).expect("fits").to_le_bytes());
        out.extend_from_slice(&u32::try_from(span.end).expect("fits").to_le_bytes());
    }
    out.extend_from_slice(&u32::try_from(chunk.constants.len()).expect("fits").to_le_bytes());
    for constant in &chunk.constants {
        match constant {
            Value::Int(v) => {
                out.push(0);
                out.extend_from_slice(&v.cast_unsigned().to_le_bytes());
            }
            Value::Bool(v) => {
                out.push(1);
                out.push(u8::from(*v));
            }
            Value::String(v) => {
                out.push(2);
                out.extend_from_slice(&u32::try_from(v.len()).expect("fits").to_le_bytes());
                out.extend_from_slice(v.as_bytes());
            }
            Value::Unit => out.push(3),
        }
    }
    out
}

#[test]
fn v1_chunks_still_decode() {
    let chunk = sample_chunk();
    let decoded = decode_chunk(&encode_v1(&chunk)).expect("v1 decode should succeed");
    assert_eq!(decoded, chunk);
}

#[test]
fn wrong_magic_is_invalid_header() {
    let mut bytes = encode_chunk(&sample_chunk());
    bytes[0] = b'X';
    expect_decode_error(&bytes, "invalid chunk header");
}

#[test]
fn short_magic_is_invalid_header() {
    expect_decode_error(b"CURLEE", "invalid chunk header");
}

#[test]
fn missing_version_is_truncated() {
    expect_decode_error(b"CURLEE_CHUNK", "truncated chunk version");
}

#[test]
fn unknown_version_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"CURLEE_CHUNK");
    bytes.extend_from_slice(&9u32.to_le_bytes());
    expect_decode_error(&bytes, "unsupported chunk format version");
}

#[test]
fn truncated_code_bytes_are_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"CURLEE_CHUNK");
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes()); // max_locals
    bytes.extend_from_slice(&10u64.to_le_bytes()); // code_len, but no code
    expect_decode_error(&bytes, "truncated code bytes");
}

#[test]
fn span_count_must_match_code_length() {
    let chunk = Chunk {
        code: vec![16],
        spans: vec![],
        constants: vec![],
        max_locals: 0,
    };
    expect_decode_error(&encode_chunk(&chunk), "span map length mismatch");
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = encode_chunk(&sample_chunk());
    bytes.push(0);
    expect_decode_error(&bytes, "unexpected trailing bytes");
}

#[test]
fn unknown_constant_kind_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"CURLEE_CHUNK");
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes()); // max_locals
    bytes.extend_from_slice(&0u64.to_le_bytes()); // code_len
    bytes.extend_from_slice(&0u64.to_le_bytes()); // spans_len
    bytes.extend_from_slice(&1u64.to_le_bytes()); // constants_len
    bytes.push(9); // bogus kind tag
    expect_decode_error(&bytes, "unknown constant kind");
}

#[test]
fn malformed_bool_constant_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"CURLEE_CHUNK");
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.push(1); // bool tag
    bytes.push(7); // neither 0 nor 1
    expect_decode_error(&bytes, "invalid bool constant");
}

#[test]
fn truncated_string_constant_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"CURLEE_CHUNK");
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&0u64.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.push(2); // string tag
    bytes.extend_from_slice(&4u64.to_le_bytes()); // length 4, only 2 bytes follow
    bytes.extend_from_slice(b"ab");
    expect_decode_error(&bytes, "truncated string constant");
}

#[test]
fn negative_int_constants_round_trip_via_bit_pattern() {
    let chunk = Chunk {
        code: vec![],
        spans: vec![],
        constants: vec![Value::Int(i64::MIN), Value::Int(-1), Value::Int(i64::MAX)],
        max_locals: 0,
    };
    let decoded = decode_chunk(&encode_chunk(&chunk)).expect("decode should succeed");
    assert_eq!(decoded.constants, chunk.constants);
}
