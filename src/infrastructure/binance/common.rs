//! Common signing and URL helpers shared by the spot and futures clients.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::errors::CoreError;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 over the canonicalised query string
/// (spec.md §6.1). Parameter order is caller-controlled and must be
/// preserved end to end for the signature to validate against it.
pub fn sign(api_secret: &str, query_string: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .expect("HMAC accepts a key of any size");
    mac.update(query_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Rejects any base URL that is not HTTPS (spec.md §6.1).
pub fn validate_base_url(base_url: &str) -> Result<(), CoreError> {
    if !base_url.starts_with("https://") {
        return Err(CoreError::InvalidParameter(format!(
            "base URL {base_url} must use https"
        )));
    }
    Ok(())
}
