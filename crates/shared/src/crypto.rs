//! Cryptographic helpers for secret handling.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compares a presented secret against the expected one in constant time.
///
/// Used for the scheduled-export cron key. Comparing HMAC tags instead of
/// the raw strings avoids leaking the match position through timing.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    const COMPARISON_KEY: &[u8] = b"finclass.secret-compare.v1";

    let mut presented_mac =
        HmacSha256::new_from_slice(COMPARISON_KEY).expect("HMAC accepts any key length");
    presented_mac.update(presented.as_bytes());
    let presented_tag = presented_mac.finalize().into_bytes();

    let mut expected_mac =
        HmacSha256::new_from_slice(COMPARISON_KEY).expect("HMAC accepts any key length");
    expected_mac.update(expected.as_bytes());

    // verify_slice performs a constant-time comparison of the tags
    expected_mac.verify_slice(&presented_tag).is_ok()
}
