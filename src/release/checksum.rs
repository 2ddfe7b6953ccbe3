//! Content digests and the saved plugins manifest.
//!
//! Offloaded plugins are identified by the lowercase hex SHA-256 of their
//! content. The digest is both the store key and the integrity check after
//! the plugin is fetched back.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// Read buffer size for hashing (256KB)
const CHUNK_SIZE: usize = 256 * 1024;

/// Hash everything remaining in `reader`.
pub fn sha256_hex<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A plugin that was handed to the store instead of embedded in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SavedPlugin {
    /// Path relative to the release directory, `/`-separated
    pub path: String,
    /// Hex SHA-256 of the content
    pub checksum: String,
    /// Unix permission bits of the original file
    pub mode: u32,
}

/// Serialize the manifest, sorted by path so identical releases produce
/// identical archives.
pub fn encode_manifest(plugins: &[SavedPlugin]) -> Result<Vec<u8>> {
    let mut sorted = plugins.to_vec();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    serde_json::to_vec(&sorted).map_err(Error::Manifest)
}

pub fn decode_manifest(data: &[u8]) -> Result<Vec<SavedPlugin>> {
    serde_json::from_slice(data).map_err(Error::Manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let mut input: &[u8] = b"binary";
        assert_eq!(
            sha256_hex(&mut input).unwrap(),
            "9a3a45d01531a20e89ac6ae10b0b0beb0492acd7216a368aa062d1a5fecaf9cd"
        );
    }

    #[test]
    fn test_sha256_empty() {
        let mut input: &[u8] = b"";
        assert_eq!(
            sha256_hex(&mut input).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_larger_than_chunk() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 13];
        let mut whole = Sha256::new();
        whole.update(&data);
        let expected = hex::encode(whole.finalize());

        assert_eq!(sha256_hex(&mut data.as_slice()).unwrap(), expected);
    }

    #[test]
    fn test_manifest_sorted_by_path() {
        let plugins = vec![
            SavedPlugin {
                path: ".terraform/plugins/b".into(),
                checksum: "bb".into(),
                mode: 0o755,
            },
            SavedPlugin {
                path: ".terraform/plugins/a".into(),
                checksum: "aa".into(),
                mode: 0o644,
            },
        ];

        let encoded = encode_manifest(&plugins).unwrap();
        assert_eq!(
            String::from_utf8(encoded.clone()).unwrap(),
            r#"[{"Path":".terraform/plugins/a","Checksum":"aa","Mode":420},{"Path":".terraform/plugins/b","Checksum":"bb","Mode":493}]"#
        );

        let decoded = decode_manifest(&encoded).unwrap();
        assert_eq!(decoded[0].path, ".terraform/plugins/a");
        assert_eq!(decoded[1].mode, 0o755);
    }

    #[test]
    fn test_empty_manifest() {
        assert_eq!(encode_manifest(&[]).unwrap(), b"[]");
        assert!(decode_manifest(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_invalid_manifest() {
        assert!(matches!(
            decode_manifest(b"{\"Path\":1}"),
            Err(Error::Manifest(_))
        ));
    }
}
