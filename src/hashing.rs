// #️⃣ Content Hashing - semantic fingerprint of a canonical entity
//
// Identity = PrimaryIdentifier, Change detection = content hash.
// Timestamps and provenance are never fed in, so re-importing unchanged
// source data produces the same digest.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Field separator; cannot appear in field names.
const UNIT_SEPARATOR: u8 = 0x1f;

/// Builder over SHA-256 that tags every value with its field name and length,
/// so `("ab", "c")` and `("a", "bc")` never collide.
pub struct ContentHasher {
    hasher: Sha256,
}

impl ContentHasher {
    pub fn new(entity_type: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(entity_type.as_bytes());
        hasher.update([UNIT_SEPARATOR]);
        ContentHasher { hasher }
    }

    fn write(&mut self, name: &str, value: &str) {
        self.hasher.update(name.as_bytes());
        self.hasher.update([UNIT_SEPARATOR]);
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
    }

    /// Scalar field.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.write(name, value);
        self
    }

    /// Optional field; `None` and `Some("")` hash differently.
    pub fn optional(mut self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.write(name, value),
            None => self.write(&format!("{}?", name), ""),
        }
        self
    }

    /// Order-insensitive list: values are sorted before hashing.
    pub fn set<S: AsRef<str>>(mut self, name: &str, values: &[S]) -> Self {
        let mut sorted: Vec<&str> = values.iter().map(|v| v.as_ref()).collect();
        sorted.sort_unstable();
        self.write(&format!("{}#", name), &sorted.len().to_string());
        for value in sorted {
            self.write(name, value);
        }
        self
    }

    /// Order-significant list.
    pub fn sequence<S: AsRef<str>>(mut self, name: &str, values: &[S]) -> Self {
        self.write(&format!("{}#", name), &values.len().to_string());
        for value in values {
            self.write(name, value.as_ref());
        }
        self
    }

    /// Map field. `BTreeMap` iterates in key order, which keeps this stable.
    pub fn map(mut self, name: &str, values: &BTreeMap<String, String>) -> Self {
        self.write(&format!("{}#", name), &values.len().to_string());
        for (key, value) in values {
            self.write(&format!("{}.{}", name, key), value);
        }
        self
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}
