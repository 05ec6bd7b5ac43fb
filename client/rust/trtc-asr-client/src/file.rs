//! Recognition of long recordings: submit a task, then poll for its result.

use crate::http::ApiClient;
use crate::protocol::null_as_default;
use crate::sentence::{SOURCE_TYPE_DATA, SOURCE_TYPE_URL, check_data};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};
use trtc_asr_core::{AsrError, Credential, ERR_SERVER_ERROR, Result, TokenSigner};

/// Largest recording accepted inline. Longer audio must be passed by URL.
pub const MAX_FILE_DATA_LEN: usize = 5 * 1024 * 1024;

pub const DEFAULT_FILE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

pub const TASK_STATUS_WAITING: i32 = 0;
pub const TASK_STATUS_RUNNING: i32 = 1;
pub const TASK_STATUS_SUCCESS: i32 = 2;
pub const TASK_STATUS_FAILED: i32 = 3;

const CREATE_PATH: &str = "/v1/CreateRecTask";
const DESCRIBE_PATH: &str = "/v1/DescribeTaskStatus";

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRecTaskRequest {
    pub engine_model_type: String,
    pub channel_num: i32,
    pub res_text_format: i32,
    pub source_type: i32,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub data_len: i64,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub callback_url: String,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub filter_dirty: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub filter_modal: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub filter_punc: i32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub convert_num_mode: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hotword_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hotword_list: String,
}

impl Default for CreateRecTaskRequest {
    fn default() -> Self {
        Self {
            engine_model_type: String::new(),
            channel_num: 1,
            res_text_format: 1,
            source_type: SOURCE_TYPE_DATA,
            url: String::new(),
            data: String::new(),
            data_len: 0,
            callback_url: String::new(),
            filter_dirty: 0,
            filter_modal: 0,
            filter_punc: 0,
            convert_num_mode: 0,
            hotword_id: String::new(),
            hotword_list: String::new(),
        }
    }
}

impl CreateRecTaskRequest {
    pub fn validate(&self) -> Result<()> {
        if self.engine_model_type.is_empty() {
            return Err(AsrError::InvalidParameter(
                "engine_model_type is required".to_string(),
            ));
        }
        if self.channel_num <= 0 {
            return Err(AsrError::InvalidParameter(
                "channel_num must be positive".to_string(),
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
        check_data(raw, MAX_FILE_DATA_LEN, "5MB")?;
        self.source_type = SOURCE_TYPE_DATA;
        self.data = STANDARD.encode(raw);
        self.data_len = raw.len() as i64;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SentenceWords {
    pub word: String,
    pub offset_start_ms: i64,
    pub offset_end_ms: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SentenceDetail {
    pub final_sentence: String,
    pub slice_sentence: String,
    pub written_text: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub words_num: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub words: Vec<SentenceWords>,
    pub speech_speed: f64,
    pub silence_time: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskStatus {
    pub rec_task_id: String,
    /// One of the `TASK_STATUS_*` values.
    pub status: i32,
    pub status_str: String,
    pub result: String,
    pub error_msg: String,
    #[serde(deserialize_with = "null_as_default")]
    pub result_detail: Vec<SentenceDetail>,
    /// Seconds.
    pub audio_duration: f64,
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        self.status == TASK_STATUS_SUCCESS
    }

    pub fn is_failed(&self) -> bool {
        self.status == TASK_STATUS_FAILED
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CreatedTask {
    rec_task_id: String,
}

/// Client for `CreateRecTask` / `DescribeTaskStatus`.
#[derive(Clone)]
pub struct FileRecognizer {
    api: ApiClient,
}

impl FileRecognizer {
    pub fn new(credential: Arc<Credential>) -> Self {
        Self {
            api: ApiClient::new(credential, DEFAULT_FILE_TIMEOUT),
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

    /// Submits a task and returns its id.
    pub async fn create_task(&self, req: &CreateRecTaskRequest) -> Result<String> {
        req.validate()?;

        let resp: DataEnvelope<CreatedTask> = self.api.post(CREATE_PATH, req).await?;
        let task_id = resp
            .data
            .map(|d| d.rec_task_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AsrError::server(ERR_SERVER_ERROR, "empty RecTaskId in response"))?;

        info!(task_id = %task_id, "recognition task created");
        Ok(task_id)
    }

    pub async fn create_task_from_data(
        &self,
        data: &[u8],
        engine_model_type: &str,
    ) -> Result<String> {
        let mut req = CreateRecTaskRequest {
            engine_model_type: engine_model_type.to_string(),
            ..Default::default()
        };
        req.set_data(data)?;
        self.create_task(&req).await
    }

    pub async fn create_task_from_url(
        &self,
        audio_url: &str,
        engine_model_type: &str,
    ) -> Result<String> {
        if audio_url.is_empty() {
            return Err(AsrError::InvalidParameter("audio URL is empty".to_string()));
        }

        let req = CreateRecTaskRequest {
            engine_model_type: engine_model_type.to_string(),
            source_type: SOURCE_TYPE_URL,
            url: audio_url.to_string(),
            ..Default::default()
        };
        self.create_task(&req).await
    }

    /// Like [`Self::create_task_from_data`], keeping every other field of `req`.
    pub async fn create_task_from_data_with_options(
        &self,
        data: &[u8],
        mut req: CreateRecTaskRequest,
    ) -> Result<String> {
        req.set_data(data)?;
        self.create_task(&req).await
    }

    pub async fn describe_task_status(&self, rec_task_id: &str) -> Result<TaskStatus> {
        if rec_task_id.is_empty() {
            return Err(AsrError::InvalidParameter("rec_task_id is empty".to_string()));
        }

        let resp: DataEnvelope<TaskStatus> = self
            .api
            .post(DESCRIBE_PATH, &json!({ "RecTaskId": rec_task_id }))
            .await?;

        resp.data
            .ok_or_else(|| AsrError::server(ERR_SERVER_ERROR, "empty response from server"))
    }

    /// Polls every second for up to ten minutes.
    pub async fn wait_for_result(&self, rec_task_id: &str) -> Result<TaskStatus> {
        self.wait_for_result_with_interval(rec_task_id, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT)
            .await
    }

    pub async fn wait_for_result_with_interval(
        &self,
        rec_task_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<TaskStatus> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self.describe_task_status(rec_task_id).await?;

            if status.is_success() {
                info!(task_id = %rec_task_id, "recognition task finished");
                return Ok(status);
            }
            if status.is_failed() {
                return Err(AsrError::server(
                    ERR_SERVER_ERROR,
                    format!(
                        "task failed: {} (RecTaskId: {})",
                        status.error_msg, status.rec_task_id
                    ),
                ));
            }
            if Instant::now() > deadline {
                return Err(AsrError::Timeout(format!(
                    "task not completed within {}s (RecTaskId: {}, Status: {})",
                    timeout.as_secs_f64(),
                    rec_task_id,
                    status.status_str
                )));
            }

            debug!(task_id = %rec_task_id, status = %status.status_str, "task pending");
            sleep(interval).await;
        }
    }
}
