use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Encodes raw receipt bytes as standard base64 without line wrapping.
pub fn encode_receipt(receipt: &[u8]) -> String {
    STANDARD.encode(receipt)
}

/// Fingerprint of an encoded receipt: base64 of the SHA-256 digest over the
/// UTF-8 bytes of the base64 text.
pub fn fingerprint(encoded_receipt: &str) -> String {
    let digest = Sha256::digest(encoded_receipt.as_bytes());
    STANDARD.encode(digest)
}

/// Convenience for callers holding raw bytes.
pub fn fingerprint_receipt(receipt: &[u8]) -> String {
    fingerprint(&encode_receipt(receipt))
}
