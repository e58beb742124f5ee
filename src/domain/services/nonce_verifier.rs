use subtle::ConstantTimeEq;

/// Compares the stored scan nonce with the one presented by a scanner.
///
/// Absent values and length mismatches short-circuit; equal-length buffers
/// are always compared in full.
pub fn verify_nonce(stored: Option<&[u8]>, provided: Option<&[u8]>) -> bool {
    let (Some(stored), Some(provided)) = (stored, provided) else {
        return false;
    };
    if stored.is_empty() || stored.len() != provided.len() {
        return false;
    }
    stored.ct_eq(provided).into()
}

/// Hex-decodes both sides before comparing. Undecodable input never matches.
pub fn verify_hex_nonce(stored_hex: &str, provided_hex: &str) -> bool {
    let stored = hex::decode(stored_hex).ok();
    let provided = hex::decode(provided_hex).ok();
    verify_nonce(stored.as_deref(), provided.as_deref())
}

/// Digest under which retired nonces are recorded in the ledger.
pub fn nonce_digest(nonce_hex: &str) -> String {
    use sha2::{Digest, Sha256};
    let normalized = nonce_hex.to_ascii_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hint::black_box;
    use std::time::Instant;

    #[test]
    fn equal_nonces_verify() {
        let a = [7u8; 32];
        assert!(verify_nonce(Some(&a), Some(&a)));
        assert!(verify_hex_nonce(&"ab".repeat(32), &"AB".repeat(32)));
    }

    #[test]
    fn absent_or_mismatched_lengths_fail() {
        let a = [7u8; 32];
        assert!(!verify_nonce(None, Some(&a)));
        assert!(!verify_nonce(Some(&a), None));
        assert!(!verify_nonce(Some(&[]), Some(&[])));
        assert!(!verify_nonce(Some(&a), Some(&a[..31])));
        assert!(!verify_hex_nonce("not-hex", "not-hex"));
    }

    #[test]
    fn any_differing_byte_fails() {
        let a = [0x5au8; 32];
        for offset in 0..a.len() {
            let mut b = a;
            b[offset] ^= 0x01;
            assert!(!verify_nonce(Some(&a), Some(&b)), "offset {offset}");
        }
    }

    #[test]
    fn digest_ignores_hex_case() {
        assert_eq!(nonce_digest(&"AB".repeat(32)), nonce_digest(&"ab".repeat(32)));
        assert_ne!(nonce_digest(&"ab".repeat(32)), nonce_digest(&"ac".repeat(32)));
    }

    fn median_nanos(stored: &[u8], provided: &[u8], rounds: usize) -> u128 {
        let mut samples: Vec<u128> = (0..rounds)
            .map(|_| {
                let start = Instant::now();
                for _ in 0..50 {
                    black_box(verify_nonce(Some(black_box(stored)), Some(black_box(provided))));
                }
                start.elapsed().as_nanos()
            })
            .collect();
        samples.sort_unstable();
        samples[samples.len() / 2]
    }

    #[test]
    fn timing_does_not_depend_on_mismatch_offset() {
        let stored = vec![0xa5u8; 1024];
        let offsets = [0, 1, 256, 512, 1023];

        // warm up
        median_nanos(&stored, &stored, 50);

        let medians: Vec<u128> = offsets
            .iter()
            .map(|&offset| {
                let mut provided = stored.clone();
                provided[offset] ^= 0xff;
                median_nanos(&stored, &provided, 51)
            })
            .collect();

        let fastest = *medians.iter().min().unwrap() as f64;
        let slowest = *medians.iter().max().unwrap() as f64;
        // An early-exit comparison would make offset 0 orders of magnitude
        // faster than offset 1023 on a 1 KiB buffer.
        assert!(slowest / fastest.max(1.0) < 4.0, "medians by offset: {medians:?}");
    }
}
