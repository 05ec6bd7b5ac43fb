use crate::error::{AsrError, Result};
use crate::usersig::TokenSigner;
use parking_lot::RwLock;
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

pub const ENV_APP_ID: &str = "TRTC_APP_ID";
pub const ENV_SDK_APP_ID: &str = "TRTC_SDK_APP_ID";
pub const ENV_SECRET_KEY: &str = "TRTC_SECRET_KEY";

#[derive(Clone)]
enum CachedSig {
    /// Supplied by the caller; used for every identifier.
    Override(String),
    /// Generated for one identifier.
    Generated { identifier: String, sig: String },
}

/// Authentication material for the service.
///
/// * `app_id` - cloud account id, also sent as `secretid` / `Secretid`.
/// * `sdk_app_id` - application id the UserSig is issued for.
/// * `secret_key` - application signing key. Never serialized, logged or sent.
///
/// Share it between recognizers with an `Arc`.
pub struct Credential {
    app_id: u64,
    sdk_app_id: u64,
    secret_key: Zeroizing<String>,
    user_sig: RwLock<Option<CachedSig>>,
}

impl Credential {
    pub fn new(app_id: u64, sdk_app_id: u64, secret_key: impl Into<String>) -> Self {
        Self {
            app_id,
            sdk_app_id,
            secret_key: Zeroizing::new(secret_key.into()),
            user_sig: RwLock::new(None),
        }
    }

    /// Reads `TRTC_APP_ID`, `TRTC_SDK_APP_ID` and `TRTC_SECRET_KEY`, loading a
    /// `.env` file first when one is present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let app_id = read_env_u64(ENV_APP_ID)?;
        let sdk_app_id = read_env_u64(ENV_SDK_APP_ID)?;
        let secret_key = std::env::var(ENV_SECRET_KEY)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AsrError::InvalidParameter(format!("{ENV_SECRET_KEY} is not set")))?;

        Ok(Self::new(app_id, sdk_app_id, secret_key))
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn sdk_app_id(&self) -> u64 {
        self.sdk_app_id
    }

    /// Signing key, handed to a [`TokenSigner`] only.
    pub fn secret_key(&self) -> &str {
        self.secret_key.as_str()
    }

    /// Sets a pre-computed UserSig. When set, no token is generated.
    pub fn set_user_sig(&self, user_sig: impl Into<String>) {
        *self.user_sig.write() = Some(CachedSig::Override(user_sig.into()));
    }

    /// The caller supplied or most recently generated UserSig.
    pub fn user_sig(&self) -> Option<String> {
        self.user_sig.read().as_ref().map(|cached| match cached {
            CachedSig::Override(sig) => sig.clone(),
            CachedSig::Generated { sig, .. } => sig.clone(),
        })
    }

    /// Returns the token to present for `identifier`, signing and caching a new
    /// one when no usable token is held.
    pub fn resolve_user_sig(
        &self,
        identifier: &str,
        signer: &dyn TokenSigner,
        expire_secs: i64,
    ) -> Result<String> {
        if let Some(cached) = self.user_sig.read().as_ref() {
            match cached {
                CachedSig::Override(sig) => return Ok(sig.clone()),
                CachedSig::Generated {
                    identifier: cached_id,
                    sig,
                } if cached_id == identifier => return Ok(sig.clone()),
                CachedSig::Generated { .. } => {}
            }
        }

        let sig = signer
            .sign(self.sdk_app_id, self.secret_key(), identifier, expire_secs)
            .map_err(|e| match e {
                AsrError::AuthFailed(_) => e,
                other => AsrError::AuthFailed(format!("generate user sig failed: {other}")),
            })?;

        if sig.is_empty() {
            return Err(AsrError::AuthFailed(
                "generate user sig failed: signer returned an empty token".to_string(),
            ));
        }

        debug!(identifier, expire_secs, "generated user sig");

        let mut slot = self.user_sig.write();
        if !matches!(slot.as_ref(), Some(CachedSig::Override(_))) {
            *slot = Some(CachedSig::Generated {
                identifier: identifier.to_string(),
                sig: sig.clone(),
            });
        }

        Ok(sig)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("app_id", &self.app_id)
            .field("sdk_app_id", &self.sdk_app_id)
            .field("secret_key", &"REDACTED")
            .field("has_user_sig", &self.user_sig.read().is_some())
            .finish()
    }
}

fn read_env_u64(key: &str) -> Result<u64> {
    let raw = std::env::var(key)
        .map_err(|_| AsrError::InvalidParameter(format!("{key} is not set")))?;
    raw.trim()
        .parse::<u64>()
        .map_err(|e| AsrError::InvalidParameter(format!("{key} is not a valid integer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSigner {
        calls: AtomicUsize,
    }

    impl TokenSigner for CountingSigner {
        fn sign(&self, _: u64, _: &str, identifier: &str, _: i64) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("sig-{identifier}-{n}"))
        }
    }

    struct EmptySigner;

    impl TokenSigner for EmptySigner {
        fn sign(&self, _: u64, _: &str, _: &str, _: i64) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn generated_sig_is_cached_per_identifier() {
        let cred = Credential::new(1, 2, "secret");
        let signer = CountingSigner {
            calls: AtomicUsize::new(0),
        };

        let a = cred.resolve_user_sig("voice-a", &signer, 60).unwrap();
        let again = cred.resolve_user_sig("voice-a", &signer, 60).unwrap();
        assert_eq!(a, again);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);

        let b = cred.resolve_user_sig("voice-b", &signer, 60).unwrap();
        assert_ne!(a, b);
        assert_eq!(cred.user_sig().as_deref(), Some(b.as_str()));
    }

    #[test]
    fn override_skips_signing() {
        let cred = Credential::new(1, 2, "secret");
        cred.set_user_sig("precomputed");
        let signer = CountingSigner {
            calls: AtomicUsize::new(0),
        };

        let sig = cred.resolve_user_sig("any", &signer, 60).unwrap();
        assert_eq!(sig, "precomputed");
        assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_token_is_rejected() {
        let cred = Credential::new(1, 2, "secret");
        let err = cred.resolve_user_sig("id", &EmptySigner, 60).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AuthFailed);
        assert!(cred.user_sig().is_none());
    }

    fn set_env(app_id: Option<&str>, sdk_app_id: Option<&str>, secret_key: Option<&str>) {
        for (key, value) in [
            (ENV_APP_ID, app_id),
            (ENV_SDK_APP_ID, sdk_app_id),
            (ENV_SECRET_KEY, secret_key),
        ] {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }

    #[test]
    #[serial]
    fn from_env_reads_all_three_variables() {
        set_env(Some("1300403317"), Some(" 1400188366 "), Some("env-secret"));

        let cred = Credential::from_env().unwrap();
        assert_eq!(cred.app_id(), 1300403317);
        assert_eq!(cred.sdk_app_id(), 1400188366);
        assert_eq!(cred.secret_key(), "env-secret");
        assert!(cred.user_sig().is_none());

        set_env(None, None, None);
    }

    #[test]
    #[serial]
    fn from_env_missing_variable_is_invalid_parameter() {
        set_env(None, Some("1400188366"), Some("env-secret"));
        let err = Credential::from_env().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameter);
        assert!(err.message().contains(ENV_APP_ID));

        set_env(Some("1300403317"), None, Some("env-secret"));
        let err = Credential::from_env().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameter);
        assert!(err.message().contains(ENV_SDK_APP_ID));

        set_env(None, None, None);
    }

    #[test]
    #[serial]
    fn from_env_non_numeric_id_is_invalid_parameter() {
        set_env(Some("not-a-number"), Some("1400188366"), Some("env-secret"));
        let err = Credential::from_env().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameter);
        assert!(err.message().contains("not a valid integer"));

        set_env(None, None, None);
    }

    #[test]
    #[serial]
    fn from_env_blank_secret_is_invalid_parameter() {
        set_env(Some("1300403317"), Some("1400188366"), Some("   "));
        let err = Credential::from_env().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameter);
        assert!(err.message().contains(ENV_SECRET_KEY));

        set_env(Some("1300403317"), Some("1400188366"), None);
        let err = Credential::from_env().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParameter);

        set_env(None, None, None);
    }

    #[test]
    fn debug_redacts_secret() {
        let cred = Credential::new(1, 2, "very-secret");
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
