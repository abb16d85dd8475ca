//! Object serialization
//!
//! Fitted objects and arrays are written as bincode payloads inside an
//! envelope carrying a magic tag, a format version, the object kind and a
//! SHA-256 checksum of the payload. Loading verifies all four.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{PhishnetError, Result};

/// What an envelope holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Preprocessor,
    Model,
    Bundle,
    Array,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectEnvelope {
    magic: [u8; 4],
    format_version: u32,
    kind: ObjectKind,
    checksum: String,
    payload: Vec<u8>,
}

impl ObjectEnvelope {
    const MAGIC: [u8; 4] = [b'P', b'H', b'N', b'T'];
    const VERSION: u32 = 1;

    fn new(kind: ObjectKind, payload: Vec<u8>) -> Self {
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            kind,
            checksum: checksum(&payload),
            payload,
        }
    }

    fn verify(&self, expected: ObjectKind) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(PhishnetError::SerializationError(
                "not a phishnet object file".to_string(),
            ));
        }
        if self.format_version != Self::VERSION {
            return Err(PhishnetError::SerializationError(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.kind != expected {
            return Err(PhishnetError::SerializationError(format!(
                "expected {:?} object, found {:?}",
                expected, self.kind
            )));
        }
        if checksum(&self.payload) != self.checksum {
            return Err(PhishnetError::SerializationError(
                "checksum mismatch, file is corrupted".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hex-encoded SHA-256 digest
pub fn checksum(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Serialize `value` into an enveloped byte buffer
pub fn to_bytes<T: Serialize>(kind: ObjectKind, value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    Ok(bincode::serialize(&ObjectEnvelope::new(kind, payload))?)
}

/// Decode an enveloped byte buffer
pub fn from_bytes<T: DeserializeOwned>(kind: ObjectKind, bytes: &[u8]) -> Result<T> {
    let envelope: ObjectEnvelope = bincode::deserialize(bytes)?;
    envelope.verify(kind)?;
    Ok(bincode::deserialize(&envelope.payload)?)
}

/// Write an object file, creating parent directories
pub fn save_object<T: Serialize>(path: &Path, kind: ObjectKind, value: &T) -> Result<()> {
    let bytes = to_bytes(kind, value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read and verify an object file
pub fn load_object<T: DeserializeOwned>(path: &Path, kind: ObjectKind) -> Result<T> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| {
        PhishnetError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    from_bytes(kind, &bytes)
}

/// Write a YAML document, creating parent directories
pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_yaml::to_string(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PhishnetError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    Ok(serde_yaml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_object_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj").join("array.bin");
        let value = array![[1.0, 2.0], [3.0, f64::NAN]];

        save_object(&path, ObjectKind::Array, &value).unwrap();
        let loaded: ndarray::Array2<f64> = load_object(&path, ObjectKind::Array).unwrap();

        assert_eq!(loaded[[1, 0]], 3.0);
        assert!(loaded[[1, 1]].is_nan());
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let bytes = to_bytes(ObjectKind::Model, &vec![1u32, 2, 3]).unwrap();
        let result: Result<Vec<u32>> = from_bytes(ObjectKind::Preprocessor, &bytes);
        assert!(matches!(result, Err(PhishnetError::SerializationError(_))));
    }

    #[test]
    fn test_corruption_detected() {
        let mut envelope = ObjectEnvelope::new(ObjectKind::Model, bincode::serialize(&7u64).unwrap());
        envelope.payload[0] ^= 0xff;
        let bytes = bincode::serialize(&envelope).unwrap();

        let result: Result<u64> = from_bytes(ObjectKind::Model, &bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        let sum = checksum(b"abc");
        assert_eq!(sum.len(), 64);
        assert!(sum.starts_with("ba7816bf"));
    }
}
