use serde::{Deserialize, Deserializer, Serialize};
use trtc_asr_core::{AsrError, Result};

/// Control frames sent as text on the streaming connection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMsg {
    /// No more audio will follow.
    End,
}

/// Category of a result fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SliceKind {
    SentenceBegin,
    ResultChange,
    SentenceEnd,
    Other(i32),
}

impl From<i32> for SliceKind {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::SentenceBegin,
            1 => Self::ResultChange,
            2 => Self::SentenceEnd,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WordInfo {
    pub word: String,
    pub start_time: i64,
    pub end_time: i64,
    pub stable_flag: i32,
}

impl WordInfo {
    pub fn is_stable(&self) -> bool {
        self.stable_flag != 0
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecognitionResult {
    pub slice_type: i32,
    pub index: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub voice_text_str: String,
    pub word_size: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub word_list: Vec<WordInfo>,
}

impl RecognitionResult {
    pub fn slice_kind(&self) -> SliceKind {
        SliceKind::from(self.slice_type)
    }
}

/// One decoded server message on the streaming connection.
///
/// A message without a `result` object (the handshake acknowledgement, often
/// the final message) carries a default result, i.e. a sentence begin.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpeechRecognitionResponse {
    pub code: i64,
    pub message: String,
    pub voice_id: String,
    pub message_id: String,
    #[serde(rename = "final")]
    pub final_flag: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub result: RecognitionResult,
}

impl SpeechRecognitionResponse {
    pub fn is_final(&self) -> bool {
        self.final_flag == 1
    }

    pub fn is_error(&self) -> bool {
        self.code != 0
    }
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn encode_control_msg(msg: &ControlMsg) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| AsrError::WriteFailed(e.to_string()))
}

/// Decodes a text frame. Anything that is not a JSON object of the expected
/// shape is a read failure.
pub fn decode_response(text: &str) -> Result<SpeechRecognitionResponse> {
    serde_json::from_str::<SpeechRecognitionResponse>(text)
        .map_err(|e| AsrError::ReadFailed(format!("unmarshal response failed: {e}")))
}
