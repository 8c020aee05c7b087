//! HMAC-SHA256 request signatures shared by the sink and the archive endpoint.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-callflow-signature-256";

/// Header value for `body`: `sha256=<hex>`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a `sha256=<hex>` header value against `body` in constant time.
pub fn verify(secret: &str, header: Option<&str>, body: &[u8]) -> Result<(), String> {
    let header = header.ok_or_else(|| "missing X-Callflow-Signature-256 header".to_string())?;
    let sig_hex = header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Callflow-Signature-256 header".to_string())?;
    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Callflow-Signature-256 is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}
