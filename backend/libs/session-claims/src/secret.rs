//! Signing secret strength checks
//!
//! HS256 is only as strong as its secret, so configuration loading classifies
//! the configured secret before a codec is built from it.

use rand::distributions::Alphanumeric;
use rand::Rng;

const MIN_SECRET_LENGTH: usize = 32; // 256 bits minimum
const RECOMMENDED_SECRET_LENGTH: usize = 64;

/// Secret strength classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStrength {
    /// Too short, low entropy or patterned: refuse it
    Weak,
    /// Usable, but shorter than recommended
    Acceptable,
    Strong,
}

/// Classify an HS256 signing secret.
///
/// **Criteria**:
/// - Minimum 32 bytes
/// - Shannon entropy of at least 4 bits/byte
/// - No runs of four repeated or sequential bytes
/// - Strong: 64+ bytes and at least 5 bits/byte
pub fn validate_secret_strength(secret: &str) -> SecretStrength {
    let bytes = secret.as_bytes();

    if bytes.len() < MIN_SECRET_LENGTH {
        return SecretStrength::Weak;
    }

    let entropy = shannon_entropy(bytes);
    if entropy < 4.0 || has_obvious_patterns(bytes) {
        return SecretStrength::Weak;
    }

    if bytes.len() >= RECOMMENDED_SECRET_LENGTH && entropy >= 5.0 {
        SecretStrength::Strong
    } else {
        SecretStrength::Acceptable
    }
}

/// Generate a random alphanumeric secret of `length` characters (at least 32).
pub fn generate_secret(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length.max(MIN_SECRET_LENGTH))
        .map(char::from)
        .collect()
}

/// Bits per byte, 0 to 8.
fn shannon_entropy(data: &[u8]) -> f64 {
    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn has_obvious_patterns(data: &[u8]) -> bool {
    let mut repeated = 1;
    let mut sequential = 1;
    for window in data.windows(2) {
        repeated = if window[0] == window[1] { repeated + 1 } else { 1 };
        sequential = if window[1] as i16 - window[0] as i16 == 1 {
            sequential + 1
        } else {
            1
        };
        if repeated >= 4 || sequential >= 4 {
            return true;
        }
    }
    false
}
