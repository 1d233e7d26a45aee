//! Error signature computation for deduplication.
//!
//! A signature identifies a class of faults based on:
//! - Type name (runtime severity label or error type)
//! - Message
//! - Source file and line, when known
//! - Rendered stack trace
//!
//! Faults with the same signature are considered the same fault. The hash is a
//! truncated SHA-256, so the same fault maps to the same signature across
//! restarts and across worker processes writing to the same artifact.

use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identity of a captured fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorSignature([u8; 16]);

impl ErrorSignature {
    /// Compute a signature from fault components.
    ///
    /// Each component is terminated before the next is fed so that
    /// `("ab", "c")` and `("a", "bc")` never collide, and a missing location
    /// hashes differently from an empty one.
    pub fn compute(
        type_name: &str,
        message: &str,
        file: Option<&str>,
        line: Option<u32>,
        stack_trace: &str,
    ) -> Self {
        let mut hasher = Sha256::new();

        feed_str(&mut hasher, type_name);
        feed_str(&mut hasher, message);

        match file {
            Some(f) => {
                hasher.update([1u8]);
                feed_str(&mut hasher, f);
            }
            None => hasher.update([0u8]),
        }

        match line {
            Some(l) => {
                hasher.update([1u8]);
                hasher.update(l.to_be_bytes());
            }
            None => hasher.update([0u8]),
        }

        feed_str(&mut hasher, stack_trace);

        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        ErrorSignature(bytes)
    }

    /// Signature from a message alone, for faults with no location or stack.
    pub fn simple(type_name: &str, message: &str) -> Self {
        Self::compute(type_name, message, None, None, "")
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

fn feed_str(hasher: &mut Sha256, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update([0xff]);
}

impl fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
