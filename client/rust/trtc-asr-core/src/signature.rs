//! Query string construction for the streaming endpoint.
//!
//! Keys are emitted in ASCII order because the service verifies the request
//! over exactly that ordering. `secretid` carries the account id; the secret
//! key itself never appears in the output.

use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use std::collections::BTreeMap;

/// Default validity window of a signed request, in seconds.
pub const DEFAULT_EXPIRY_SECS: i64 = 86_400;

pub const NONCE_MIN: u32 = 1;
pub const NONCE_MAX: u32 = 9_999_999;

/// Everything except RFC 3986 unreserved characters is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub app_id: u64,
    pub engine_model_type: String,
    pub voice_id: String,
    pub timestamp: i64,
    /// Explicit expiry; `None` means `timestamp + DEFAULT_EXPIRY_SECS`.
    pub expired: Option<i64>,
    pub nonce: u32,
    pub voice_format: i32,
    pub need_vad: i32,
    pub convert_num_mode: i32,

    pub hotword_id: String,
    pub customization_id: String,
    pub filter_dirty: i32,
    pub filter_modal: i32,
    pub filter_punc: i32,
    pub word_info: i32,
    pub vad_silence_time: i32,
    pub max_speak_time: i32,
}

impl SignatureParams {
    /// Fresh parameters stamped with the current time and a random nonce.
    pub fn new(
        app_id: u64,
        engine_model_type: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        Self {
            app_id,
            engine_model_type: engine_model_type.into(),
            voice_id: voice_id.into(),
            timestamp: Utc::now().timestamp(),
            expired: None,
            nonce: rand::rng().random_range(NONCE_MIN..=NONCE_MAX),
            voice_format: 1,
            need_vad: 1,
            convert_num_mode: 1,
            hotword_id: String::new(),
            customization_id: String::new(),
            filter_dirty: 0,
            filter_modal: 0,
            filter_punc: 0,
            word_info: 0,
            vad_silence_time: 0,
            max_speak_time: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_expired(mut self, expired: i64) -> Self {
        self.expired = Some(expired);
        self
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn expired(&self) -> i64 {
        self.expired
            .unwrap_or(self.timestamp + DEFAULT_EXPIRY_SECS)
    }

    /// Query string without the `signature` key.
    pub fn build_query_string(&self) -> String {
        encode_params(&self.to_map())
    }

    /// Query string with `signature` set to `user_sig`, in its sorted position.
    pub fn build_query_string_with_signature(&self, user_sig: &str) -> String {
        let mut params = self.to_map();
        params.insert("signature", user_sig.to_string());
        encode_params(&params)
    }

    fn to_map(&self) -> BTreeMap<&'static str, String> {
        let mut m = BTreeMap::new();
        m.insert("secretid", self.app_id.to_string());
        m.insert("timestamp", self.timestamp.to_string());
        m.insert("expired", self.expired().to_string());
        m.insert("nonce", self.nonce.to_string());
        m.insert("engine_model_type", self.engine_model_type.clone());
        m.insert("voice_id", self.voice_id.clone());
        m.insert("voice_format", self.voice_format.to_string());
        m.insert("needvad", self.need_vad.to_string());

        insert_non_empty(&mut m, "hotword_id", &self.hotword_id);
        insert_non_empty(&mut m, "customization_id", &self.customization_id);
        insert_non_zero(&mut m, "filter_dirty", self.filter_dirty);
        insert_non_zero(&mut m, "filter_modal", self.filter_modal);
        insert_non_zero(&mut m, "filter_punc", self.filter_punc);
        insert_non_zero(&mut m, "convert_num_mode", self.convert_num_mode);
        insert_non_zero(&mut m, "word_info", self.word_info);
        insert_non_zero(&mut m, "vad_silence_time", self.vad_silence_time);
        insert_non_zero(&mut m, "max_speak_time", self.max_speak_time);

        m
    }
}

fn insert_non_empty(m: &mut BTreeMap<&'static str, String>, key: &'static str, value: &str) {
    if !value.is_empty() {
        m.insert(key, value.to_string());
    }
}

fn insert_non_zero(m: &mut BTreeMap<&'static str, String>, key: &'static str, value: i32) {
    if value != 0 {
        m.insert(key, value.to_string());
    }
}

fn encode_params(params: &BTreeMap<&'static str, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, QUERY_VALUE)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SignatureParams {
        SignatureParams::new(1300403317, "16k_zh", "test-voice-001")
    }

    fn keys(qs: &str) -> Vec<String> {
        qs.split('&')
            .map(|pair| pair.split('=').next().unwrap_or_default().to_string())
            .collect()
    }

    fn value<'a>(qs: &'a str, key: &str) -> Option<&'a str> {
        qs.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    #[test]
    fn defaults() {
        let p = params();
        assert_eq!(p.voice_format, 1);
        assert_eq!(p.need_vad, 1);
        assert_eq!(p.convert_num_mode, 1);
        assert!(p.timestamp > 0);
        assert_eq!(p.expired(), p.timestamp + 86400);
        assert!((NONCE_MIN..=NONCE_MAX).contains(&p.nonce));
    }

    #[test]
    fn expiry_follows_timestamp_unless_overridden() {
        let p = params().with_timestamp(1000);
        assert_eq!(p.expired(), 1000 + 86400);

        let p = p.with_expired(5000).with_timestamp(2000);
        assert_eq!(p.expired(), 5000);
    }

    #[test]
    fn required_params_present() {
        let qs = params().build_query_string();
        assert_eq!(value(&qs, "secretid"), Some("1300403317"));
        assert_eq!(value(&qs, "engine_model_type"), Some("16k_zh"));
        assert_eq!(value(&qs, "voice_id"), Some("test-voice-001"));
        assert_eq!(value(&qs, "voice_format"), Some("1"));
        assert_eq!(value(&qs, "needvad"), Some("1"));
        assert_eq!(value(&qs, "convert_num_mode"), Some("1"));
        assert!(value(&qs, "signature").is_none());
    }

    #[test]
    fn keys_strictly_ascending() {
        let mut p = params();
        p.hotword_id = "hw".into();
        p.customization_id = "cz".into();
        p.filter_dirty = 1;
        p.filter_modal = 2;
        p.filter_punc = 1;
        p.word_info = 2;
        p.vad_silence_time = 800;
        p.max_speak_time = 60000;

        for qs in [
            p.build_query_string(),
            p.build_query_string_with_signature("sig"),
        ] {
            let ks = keys(&qs);
            assert!(ks.windows(2).all(|w| w[0] < w[1]), "not sorted: {ks:?}");
        }
    }

    #[test]
    fn signature_takes_sorted_position() {
        let qs = params().build_query_string_with_signature("abc");
        let ks = keys(&qs);
        let idx = ks.iter().position(|k| k == "signature").unwrap();
        assert_eq!(ks[idx - 1], "secretid");
        assert_eq!(ks[idx + 1], "timestamp");
    }

    #[test]
    fn signature_value_is_percent_encoded() {
        let qs = params().build_query_string_with_signature("a*b-c_d+e/f=g h");
        assert_eq!(value(&qs, "signature"), Some("a%2Ab-c_d%2Be%2Ff%3Dg%20h"));
    }

    #[test]
    fn optional_params_omitted_when_zero() {
        let mut p = params();
        p.convert_num_mode = 0;
        let qs = p.build_query_string();
        for key in [
            "hotword_id",
            "customization_id",
            "filter_dirty",
            "filter_modal",
            "filter_punc",
            "convert_num_mode",
            "word_info",
            "vad_silence_time",
            "max_speak_time",
        ] {
            assert!(value(&qs, key).is_none(), "{key} should be omitted");
        }
    }

    #[test]
    fn optional_params_included_when_set() {
        let mut p = params();
        p.hotword_id = "hw-001".into();
        p.customization_id = "custom 1".into();
        p.filter_dirty = 1;
        p.filter_modal = 2;
        p.filter_punc = 1;
        p.word_info = 1;
        p.vad_silence_time = 500;
        p.max_speak_time = 30000;

        let qs = p.build_query_string();
        assert_eq!(value(&qs, "hotword_id"), Some("hw-001"));
        assert_eq!(value(&qs, "customization_id"), Some("custom%201"));
        assert_eq!(value(&qs, "filter_dirty"), Some("1"));
        assert_eq!(value(&qs, "filter_modal"), Some("2"));
        assert_eq!(value(&qs, "filter_punc"), Some("1"));
        assert_eq!(value(&qs, "word_info"), Some("1"));
        assert_eq!(value(&qs, "vad_silence_time"), Some("500"));
        assert_eq!(value(&qs, "max_speak_time"), Some("30000"));
    }

    #[test]
    fn secret_key_never_in_query() {
        let secret = "my-very-secret-key";
        let sig = crate::usersig::TlsSigV2
            .sign_at(1400188366, secret, "test-voice-001", 86400, 1_700_000_000)
            .unwrap();
        let qs = params().build_query_string_with_signature(&sig);

        assert!(!qs.contains(secret));
        assert!(!qs.to_lowercase().contains("secret_key"));
        assert!(!qs.to_lowercase().contains("secretkey"));
    }

    #[test]
    fn identical_inputs_build_identical_output() {
        let a = params().with_timestamp(10).with_nonce(42);
        let b = a.clone();
        assert_eq!(
            a.build_query_string_with_signature("s"),
            b.build_query_string_with_signature("s")
        );
    }
}
