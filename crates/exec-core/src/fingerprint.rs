//! Deterministic command fingerprinting for the timeout estimator.
//!
//! Normalization: lowercase, collapse whitespace runs to a single space,
//! strip a leading shell wrapper (`sh -c '...'`, `bash -c "..."`) if present
//! so that the wrapped command, not the wrapper, drives history lookups.

use sha2::{Digest, Sha256};

/// Stable hash of a normalized command string, used to index timing history.
pub fn fingerprint(command: &str) -> String {
    let normalized = normalize(command);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    encode_hex(&hasher.finalize())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn normalize(command: &str) -> String {
    let collapsed = collapse_whitespace(&command.to_lowercase());
    strip_shell_wrapper(&collapsed).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

fn strip_shell_wrapper(s: &str) -> &str {
    for prefix in ["sh -c ", "bash -c ", "/bin/sh -c ", "/bin/bash -c "] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return rest.trim_matches(['\'', '"']);
        }
    }
    s
}
