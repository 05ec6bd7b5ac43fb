//! UserSig (TLS signature v2) generation.
//!
//! A UserSig is a zlib-compressed, base64-encoded JSON document carrying an
//! HMAC-SHA256 over the identifier, application id, issue time and validity.
//! The service accepts it both as the `X-TRTC-UserSig` header and as the
//! `signature` query parameter.

use crate::error::{AsrError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::io::Write;

/// Validity used when the caller passes a non-positive expiry (180 days).
pub const DEFAULT_EXPIRE_SECS: i64 = 86_400 * 180;

/// Validity of tokens generated by the recognizers (1 day).
pub const SESSION_EXPIRE_SECS: i64 = 86_400;

/// Produces time-bounded signed tokens.
///
/// Implementations must fail rather than return an empty or partial token.
pub trait TokenSigner: Send + Sync {
    fn sign(
        &self,
        sdk_app_id: u64,
        secret_key: &str,
        identifier: &str,
        expire_secs: i64,
    ) -> Result<String>;
}

/// The service's UserSig v2 algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsSigV2;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SigDocument {
    #[serde(rename = "TLS.ver")]
    pub ver: String,
    #[serde(rename = "TLS.identifier")]
    pub identifier: String,
    #[serde(rename = "TLS.sdkappid")]
    pub sdk_app_id: u64,
    #[serde(rename = "TLS.expire")]
    pub expire: i64,
    #[serde(rename = "TLS.time")]
    pub time: i64,
    #[serde(rename = "TLS.sig")]
    pub sig: String,
}

impl TlsSigV2 {
    /// Signs with an explicit issue time. Exposed for deterministic callers.
    pub fn sign_at(
        &self,
        sdk_app_id: u64,
        secret_key: &str,
        identifier: &str,
        expire_secs: i64,
        issued_at: i64,
    ) -> Result<String> {
        if secret_key.is_empty() {
            return Err(AsrError::AuthFailed(
                "generate user sig failed: secret key is empty".to_string(),
            ));
        }
        if identifier.is_empty() {
            return Err(AsrError::AuthFailed(
                "generate user sig failed: identifier is empty".to_string(),
            ));
        }

        let expire = if expire_secs <= 0 {
            DEFAULT_EXPIRE_SECS
        } else {
            expire_secs
        };

        let doc = SigDocument {
            ver: "2.0".to_string(),
            identifier: identifier.to_string(),
            sdk_app_id,
            expire,
            time: issued_at,
            sig: hmac_sha256(secret_key, identifier, sdk_app_id, issued_at, expire)?,
        };

        let raw = serde_json::to_vec(&doc)
            .map_err(|e| AsrError::AuthFailed(format!("generate user sig failed: {e}")))?;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .map_err(|e| AsrError::AuthFailed(format!("generate user sig failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| AsrError::AuthFailed(format!("generate user sig failed: {e}")))?;

        Ok(base64_url_encode(&compressed))
    }
}

impl TokenSigner for TlsSigV2 {
    fn sign(
        &self,
        sdk_app_id: u64,
        secret_key: &str,
        identifier: &str,
        expire_secs: i64,
    ) -> Result<String> {
        self.sign_at(
            sdk_app_id,
            secret_key,
            identifier,
            expire_secs,
            Utc::now().timestamp(),
        )
    }
}

/// Convenience wrapper around [`TlsSigV2`].
pub fn gen_user_sig(
    sdk_app_id: u64,
    secret_key: &str,
    identifier: &str,
    expire_secs: i64,
) -> Result<String> {
    TlsSigV2.sign(sdk_app_id, secret_key, identifier, expire_secs)
}

fn hmac_sha256(
    secret_key: &str,
    identifier: &str,
    sdk_app_id: u64,
    time: i64,
    expire: i64,
) -> Result<String> {
    let content = format!(
        "TLS.identifier:{identifier}\nTLS.sdkappid:{sdk_app_id}\nTLS.time:{time}\nTLS.expire:{expire}\n"
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes())
        .map_err(|e| AsrError::AuthFailed(format!("generate user sig failed: {e}")))?;
    mac.update(content.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

// The service uses its own URL-safe alphabet rather than base64url.
fn base64_url_encode(data: &[u8]) -> String {
    STANDARD
        .encode(data)
        .chars()
        .map(|c| match c {
            '+' => '*',
            '/' => '-',
            '=' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn decode(sig: &str) -> SigDocument {
        let std_b64: String = sig
            .chars()
            .map(|c| match c {
                '*' => '+',
                '-' => '/',
                '_' => '=',
                other => other,
            })
            .collect();
        let compressed = STANDARD.decode(std_b64).expect("valid base64");
        let mut json = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut json)
            .expect("valid zlib");
        serde_json::from_slice(&json).expect("valid json")
    }

    #[test]
    fn user_sig_roundtrips_to_signed_document() {
        let sig = TlsSigV2
            .sign_at(1400188366, "secret", "voice-1", 86400, 1_700_000_000)
            .expect("sign should succeed");

        assert!(!sig.is_empty());
        assert!(!sig.contains('+') && !sig.contains('/') && !sig.contains('='));

        let doc = decode(&sig);
        assert_eq!(doc.ver, "2.0");
        assert_eq!(doc.identifier, "voice-1");
        assert_eq!(doc.sdk_app_id, 1400188366);
        assert_eq!(doc.expire, 86400);
        assert_eq!(doc.time, 1_700_000_000);

        let expected = hmac_sha256("secret", "voice-1", 1400188366, 1_700_000_000, 86400)
            .expect("hmac");
        assert_eq!(doc.sig, expected);
    }

    #[test]
    fn non_positive_expire_uses_default() {
        let sig = TlsSigV2
            .sign_at(1, "secret", "id", 0, 10)
            .expect("sign should succeed");
        assert_eq!(decode(&sig).expire, DEFAULT_EXPIRE_SECS);
    }

    #[test]
    fn signature_depends_on_secret() {
        let a = TlsSigV2.sign_at(1, "secret-a", "id", 60, 10).unwrap();
        let b = TlsSigV2.sign_at(1, "secret-b", "id", 60, 10).unwrap();
        assert_ne!(decode(&a).sig, decode(&b).sig);
    }

    #[test]
    fn empty_secret_is_auth_failure() {
        let err = gen_user_sig(1, "", "id", 60).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AuthFailed);
    }

    #[test]
    fn secret_does_not_leak_into_token() {
        let secret = "plain-secret-value";
        let sig = TlsSigV2.sign_at(1, secret, "id", 60, 10).unwrap();
        assert!(!sig.contains(secret));
        let doc = decode(&sig);
        assert!(!doc.sig.contains(secret));
    }
}
