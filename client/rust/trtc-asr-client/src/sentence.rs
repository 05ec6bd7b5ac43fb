//! One-shot recognition of a short clip (up to about a minute of audio).

use crate::http::ApiClient;
use crate::protocol::null_as_default;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use trtc_asr_core::{AsrError, Credential, Result, TokenSigner};

pub const SOURCE_TYPE_URL: i32 = 0;
pub const SOURCE_TYPE_DATA: i32 = 1;

/// Largest clip accepted inline.
pub const MAX_SENTENCE_DATA_LEN: usize = 3 * 1024 * 1024;

pub const DEFAULT_SENTENCE_TIMEOUT: Duration = Duration::from_secs(30);

const PATH: &str = "/v1/SentenceRecognition";

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

fn is_default_convert_num_mode(v: &i32) -> bool {
    *v == 1
}

/// Request body. Zero and empty optional fields are left out.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct SentenceRecognitionRequest {
    #[serde(rename = "EngSerViceType")]
    pub eng_service_type: String,
    pub source_type: i32,
    /// `pcm`, `wav`, `ogg-opus`, `mp3` or `m4a`.
    pub voice_format: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Base64 of the audio.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub data_len: i64,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub word_info: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub filter_dirty: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub filter_modal: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub filter_punc: i32,
    #[serde(skip_serializing_if = "is_default_convert_num_mode")]
    pub convert_num_mode: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hotword_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hotword_list: String,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub input_sample_rate: i32,
}

impl Default for SentenceRecognitionRequest {
    fn default() -> Self {
        Self {
            eng_service_type: String::new(),
            source_type: SOURCE_TYPE_DATA,
            voice_format: "pcm".to_string(),
            url: String::new(),
            data: String::new(),
            data_len: 0,
            word_info: 0,
            filter_dirty: 0,
            filter_modal: 0,
            filter_punc: 0,
            convert_num_mode: 1,
            hotword_id: String::new(),
            hotword_list: String::new(),
            input_sample_rate: 0,
        }
    }
}

impl SentenceRecognitionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.eng_service_type.is_empty() {
            return Err(AsrError::InvalidParameter(
                "eng_service_type is required".to_string(),
            ));
        }
        if self.voice_format.is_empty() {
            return Err(AsrError::InvalidParameter(
                "voice_format is required".to_string(),
            ));
        }
        if self.source_type == SOURCE_TYPE_URL && self.url.is_empty() {
            return Err(AsrError::InvalidParameter(
                "url is required when source_type=0".to_string(),
            ));
        }
        if self.source_type == SOURCE_TYPE_DATA && self.data.is_empty() {
            return Err(AsrError::InvalidParameter(
                "data is required when source_type=1".to_string(),
            ));
        }
        Ok(())
    }

    fn set_data(&mut self, raw: &[u8]) -> Result<()> {
        check_data(raw, MAX_SENTENCE_DATA_LEN, "3MB")?;
        self.source_type = SOURCE_TYPE_DATA;
        self.data = STANDARD.encode(raw);
        self.data_len = raw.len() as i64;
        Ok(())
    }
}

pub(crate) fn check_data(raw: &[u8], max: usize, label: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(AsrError::InvalidParameter("audio data is empty".to_string()));
    }
    if raw.len() > max {
        return Err(AsrError::InvalidParameter(format!(
            "audio data exceeds {label} limit"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SentenceWord {
    pub word: String,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SentenceRecognitionResult {
    pub result: String,
    /// Milliseconds.
    pub audio_duration: i64,
    pub word_size: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub word_list: Vec<SentenceWord>,
    pub request_id: String,
}

/// Client for `SentenceRecognition`.
#[derive(Clone)]
pub struct SentenceRecognizer {
    api: ApiClient,
}

impl SentenceRecognizer {
    pub fn new(credential: Arc<Credential>) -> Self {
        Self {
            api: ApiClient::new(credential, DEFAULT_SENTENCE_TIMEOUT),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.api.timeout = timeout;
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn TokenSigner>) -> Self {
        self.api.set_signer(signer);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.api.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.api.timeout
    }

    pub async fn recognize(
        &self,
        req: &SentenceRecognitionRequest,
    ) -> Result<SentenceRecognitionResult> {
        req.validate()?;
        let result: SentenceRecognitionResult = self.api.post(PATH, req).await?;
        info!(
            request_id = %result.request_id,
            audio_duration_ms = result.audio_duration,
            "sentence recognized"
        );
        Ok(result)
    }

    /// Recognizes raw audio bytes, base64-encoding them into the request.
    pub async fn recognize_data(
        &self,
        data: &[u8],
        voice_format: &str,
        engine_model_type: &str,
    ) -> Result<SentenceRecognitionResult> {
        let mut req = SentenceRecognitionRequest {
            eng_service_type: engine_model_type.to_string(),
            voice_format: voice_format.to_string(),
            ..Default::default()
        };
        req.set_data(data)?;
        self.recognize(&req).await
    }

    /// Like [`Self::recognize_data`], keeping every other field of `req`.
    pub async fn recognize_data_with_options(
        &self,
        data: &[u8],
        mut req: SentenceRecognitionRequest,
    ) -> Result<SentenceRecognitionResult> {
        req.set_data(data)?;
        self.recognize(&req).await
    }

    pub async fn recognize_url(
        &self,
        audio_url: &str,
        voice_format: &str,
        engine_model_type: &str,
    ) -> Result<SentenceRecognitionResult> {
        if audio_url.is_empty() {
            return Err(AsrError::InvalidParameter("audio URL is empty".to_string()));
        }

        let req = SentenceRecognitionRequest {
            eng_service_type: engine_model_type.to_string(),
            source_type: SOURCE_TYPE_URL,
            voice_format: voice_format.to_string(),
            url: audio_url.to_string(),
            ..Default::default()
        };
        self.recognize(&req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trtc_asr_core::ErrorKind;

    fn recognizer() -> SentenceRecognizer {
        SentenceRecognizer::new(Arc::new(Credential::new(1, 2, "secret")))
    }

    #[test]
    fn data_request_body() {
        let mut req = SentenceRecognitionRequest {
            eng_service_type: "16k_zh".to_string(),
            ..Default::default()
        };
        req.set_data(b"abc").unwrap();

        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "EngSerViceType": "16k_zh",
                "SourceType": 1,
                "VoiceFormat": "pcm",
                "Data": "YWJj",
                "DataLen": 3
            })
        );
    }

    #[test]
    fn url_request_body_with_options() {
        let req = SentenceRecognitionRequest {
            eng_service_type: "16k_zh_en".to_string(),
            source_type: SOURCE_TYPE_URL,
            voice_format: "mp3".to_string(),
            url: "https://example.com/a.mp3".to_string(),
            word_info: 2,
            filter_punc: 1,
            convert_num_mode: 0,
            hotword_id: "hw".to_string(),
            input_sample_rate: 8000,
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "EngSerViceType": "16k_zh_en",
                "SourceType": 0,
                "VoiceFormat": "mp3",
                "Url": "https://example.com/a.mp3",
                "WordInfo": 2,
                "FilterPunc": 1,
                "ConvertNumMode": 0,
                "HotwordId": "hw",
                "InputSampleRate": 8000
            })
        );
    }

    #[test]
    fn validation() {
        let mut req = SentenceRecognitionRequest::default();
        assert_eq!(req.validate().unwrap_err().kind(), ErrorKind::InvalidParameter);

        req.eng_service_type = "16k_zh".to_string();
        req.voice_format.clear();
        assert!(req.validate().unwrap_err().message().contains("voice_format"));

        req.voice_format = "pcm".to_string();
        assert!(req.validate().unwrap_err().message().contains("data is required"));

        req.source_type = SOURCE_TYPE_URL;
        assert!(req.validate().unwrap_err().message().contains("url is required"));

        req.url = "https://example.com/a.wav".to_string();
        assert!(req.validate().is_ok());
    }

    #[tokio::test]
    async fn oversized_and_empty_data_rejected_before_sending() {
        let rec = recognizer();

        let err = rec.recognize_data(&[], "pcm", "16k_zh").await.unwrap_err();
        assert_eq!(err.message(), "audio data is empty");

        let big = vec![0u8; MAX_SENTENCE_DATA_LEN + 1];
        let err = rec.recognize_data(&big, "pcm", "16k_zh").await.unwrap_err();
        assert_eq!(err.message(), "audio data exceeds 3MB limit");

        let err = rec.recognize_url("", "wav", "16k_zh").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn result_decodes_null_word_list() {
        let res: SentenceRecognitionResult = serde_json::from_value(json!({
            "Result": "hi",
            "AudioDuration": 1200,
            "WordSize": 0,
            "WordList": null,
            "RequestId": "r1"
        }))
        .unwrap();
        assert_eq!(res.result, "hi");
        assert!(res.word_list.is_empty());
    }
}
