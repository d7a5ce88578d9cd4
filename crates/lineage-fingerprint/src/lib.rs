//! Lineage Fingerprint: content-derived hashes for replay detection.
//!
//! Every logged request repeats the whole conversation so far. These
//! hashes identify "the same conversation" or "the same prompt" across
//! those replays using content only: tool-use identifiers, whitespace and
//! formatting never reach the digest.

pub mod hash;

pub use hash::{
    compute_hash, fingerprint_conversation, fingerprint_text, normalize_command,
    normalize_whitespace, system_prompt_hash, FINGERPRINT_LEN, SIGNATURE_LEN,
};
