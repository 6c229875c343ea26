// src/store/fingerprint.rs

//! Step fingerprints.
//!
//! A fingerprint identifies *what* a step does: its operation tag plus every
//! resolved argument token and declared output. Each field is length-prefixed
//! before hashing so that `["ab", "c"]` and `["a", "bc"]` never collide.

use std::path::PathBuf;

use blake3::Hasher;

use crate::dag::Operation;

pub fn fingerprint(operation: &Operation, outputs: &[PathBuf]) -> String {
    let mut hasher = Hasher::new();

    update_field(&mut hasher, operation.tag());

    let tokens = operation.tokens();
    hasher.update(&(tokens.len() as u64).to_le_bytes());
    for token in &tokens {
        update_field(&mut hasher, token);
    }

    hasher.update(&(outputs.len() as u64).to_le_bytes());
    for output in outputs {
        update_field(&mut hasher, &output.display().to_string());
    }

    hasher.finalize().to_hex().to_string()
}

fn update_field(hasher: &mut Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Short, filesystem-safe key for a step id (used for status record names).
pub fn record_key(id: &str) -> String {
    let hash = blake3::hash(id.as_bytes()).to_hex();
    hash.as_str()[..32].to_string()
}
