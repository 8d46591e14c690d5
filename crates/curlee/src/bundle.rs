//! The deployable bundle format.
//!
//! A bundle is a UTF-8 text file: a magic header line, `key=value` records,
//! and a base64-encoded bytecode body. Content addressing uses FNV-1a-64
//! over raw bytes; an optional `manifest_hash` record covers a canonical
//! serialization of the manifest itself. The reader tolerates the legacy
//! `CURLEE_BUNDLE_V1` magic and `version=` key; the writer emits only the
//! current forms.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

const HEADER: &str = "CURLEE_BUNDLE";
const HEADER_LEGACY_V1: &str = "CURLEE_BUNDLE_V1";

/// A pinned import: the module path and the FNV-1a-64 hex of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPin {
    pub path: String,
    pub hash: String,
}

/// Everything a bundle declares about its bytecode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub format_version: u32,
    pub bytecode_hash: String,
    pub capabilities: Vec<String>,
    pub imports: Vec<ImportPin>,
    pub proof: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub manifest: Manifest,
    pub bytecode: Vec<u8>,
}

/// A bundle read/write failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleError {
    pub message: String,
}

impl BundleError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BundleError {}

/// FNV-1a 64-bit over raw bytes, rendered as 16 lowercase hex digits.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    format!("{hash:016x}")
}

fn join_csv(values: &[String]) -> String {
    values.join(",")
}

fn join_pins(imports: &[ImportPin]) -> String {
    imports
        .iter()
        .map(|pin| format!("{}:{}", pin.path, pin.hash))
        .collect::<Vec<_>>()
        .join(",")
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stable, ordered serialization of the manifest fields (excluding the
/// manifest hash itself). This is integrity, not cryptographic signing.
fn compute_manifest_hash(manifest: &Manifest) -> String {
    let material = format!(
        "format_version={}\nbytecode_hash={}\ncapabilities={}\nimports={}\nproof={}\n",
        manifest.format_version,
        manifest.bytecode_hash,
        join_csv(&manifest.capabilities),
        join_pins(&manifest.imports),
        manifest.proof.as_deref().unwrap_or(""),
    );
    hash_bytes(material.as_bytes())
}

/// Serializes a bundle in the current format, deriving the hashes and the
/// format version from the contents.
#[must_use]
pub fn write_bundle_string(bundle: &Bundle) -> String {
    let mut manifest = bundle.manifest.clone();
    manifest.format_version = BUNDLE_FORMAT_VERSION;
    manifest.bytecode_hash = hash_bytes(&bundle.bytecode);
    let manifest_hash = compute_manifest_hash(&manifest);

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(&format!("format_version={}\n", manifest.format_version));
    out.push_str(&format!("bytecode_hash={}\n", manifest.bytecode_hash));
    out.push_str(&format!("manifest_hash={manifest_hash}\n"));
    out.push_str(&format!("capabilities={}\n", join_csv(&manifest.capabilities)));
    out.push_str(&format!("imports={}\n", join_pins(&manifest.imports)));
    out.push_str(&format!("proof={}\n", manifest.proof.as_deref().unwrap_or("")));
    out.push_str(&format!("bytecode={}\n", BASE64.encode(&bundle.bytecode)));
    out
}

pub fn write_bundle(path: &std::path::Path, bundle: &Bundle) -> Result<(), BundleError> {
    std::fs::write(path, write_bundle_string(bundle))
        .map_err(|_| BundleError::new("failed to open bundle for writing"))
}

/// Parses and validates a bundle from its text form.
pub fn read_bundle_str(input: &str) -> Result<Bundle, BundleError> {
    let mut lines = input.lines().map(|line| line.trim_end_matches('\r'));

    let Some(header) = lines.next() else {
        return Err(BundleError::new("empty bundle"));
    };
    let legacy_v1_header = header == HEADER_LEGACY_V1;
    if header != HEADER && !legacy_v1_header {
        return Err(BundleError::new("invalid bundle header"));
    }

    let mut manifest = Manifest::default();
    let mut saw_format_version = false;
    let mut bytecode_b64 = String::new();
    let mut manifest_hash = String::new();

    if legacy_v1_header {
        manifest.format_version = 1;
        saw_format_version = true;
    }

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        match key {
            "format_version" | "version" => {
                let parsed: u32 = value
                    .parse()
                    .map_err(|_| BundleError::new("invalid bundle format version"))?;
                manifest.format_version = parsed;
                saw_format_version = true;
            }
            "bytecode_hash" => manifest.bytecode_hash = value.to_string(),
            "manifest_hash" => manifest_hash = value.to_string(),
            "capabilities" => manifest.capabilities = split_csv(value),
            "imports" => {
                for entry in split_csv(value) {
                    let Some((path, hash)) = entry.split_once(':') else {
                        return Err(BundleError::new("invalid import pin"));
                    };
                    if path.is_empty() || hash.is_empty() {
                        return Err(BundleError::new("invalid import pin"));
                    }
                    manifest.imports.push(ImportPin {
                        path: path.to_string(),
                        hash: hash.to_string(),
                    });
                }
            }
            "proof" => {
                if !value.is_empty() {
                    manifest.proof = Some(value.to_string());
                }
            }
            "bytecode" => bytecode_b64 = value.to_string(),
            _ => {}
        }
    }

    if !saw_format_version {
        return Err(BundleError::new("missing bundle format version"));
    }
    if manifest.format_version != BUNDLE_FORMAT_VERSION {
        return Err(BundleError::new(format!(
            "unsupported bundle format version: {} (supported: {BUNDLE_FORMAT_VERSION})",
            manifest.format_version
        )));
    }
    if manifest.bytecode_hash.is_empty() {
        return Err(BundleError::new("missing bytecode_hash"));
    }
    if bytecode_b64.is_empty() {
        return Err(BundleError::new("missing bytecode"));
    }

    // Whitespace inside the body is tolerated.
    let compact: String = bytecode_b64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytecode = BASE64
        .decode(compact.as_bytes())
        .map_err(|_| BundleError::new("invalid base64 bytecode"))?;

    if hash_bytes(&bytecode) != manifest.bytecode_hash {
        return Err(BundleError::new("bytecode hash mismatch"));
    }

    // Optional manifest integrity check (bundles produced by current tooling
    // include it).
    if !manifest_hash.is_empty() && compute_manifest_hash(&manifest) != manifest_hash {
        return Err(BundleError::new("manifest hash mismatch"));
    }

    Ok(Bundle { manifest, bytecode })
}

pub fn read_bundle(path: &std::path::Path) -> Result<Bundle, BundleError> {
    let contents =
        std::fs::read_to_string(path).map_err(|_| BundleError::new("failed to open bundle"))?;
    read_bundle_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_known_vector() {
        assert_eq!(hash_bytes(b"abc"), "e71fa2190541574b");
    }

    #[test]
    fn empty_input_hashes_to_offset_basis() {
        assert_eq!(hash_bytes(b""), "cbf29ce484222325");
    }

    #[test]
    fn equal_bytes_hash_equal() {
        assert_eq!(hash_bytes(b"curlee"), hash_bytes(b"curlee"));
        assert_ne!(hash_bytes(b"curlee"), hash_bytes(b"curle"));
    }
}
