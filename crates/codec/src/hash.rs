use sha3::{Digest, Keccak256};

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// `0x`-prefixed hash of an encoded signed transaction.
pub fn tx_hash(encoded: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(encoded)))
}

/// `0x`-prefixed hash of a transaction payload, used to recognise
/// resubmissions of the same write.
pub fn payload_hash(payload: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn hashes_are_prefixed() {
        let hash = payload_hash(b"abc");
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);
        assert_eq!(hash, tx_hash(b"abc"));
    }
}
