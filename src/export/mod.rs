//! Artifact persistence: checksummed binary objects and YAML documents

mod serializer;

pub use serializer::{
    checksum, from_bytes, load_object, load_yaml, save_object, save_yaml, to_bytes, ObjectKind,
};
