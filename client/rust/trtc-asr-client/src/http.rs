//! Signed JSON-over-HTTP calls shared by the sentence and file recognizers.

use chrono::Utc;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use trtc_asr_core::usersig::SESSION_EXPIRE_SECS;
use trtc_asr_core::{AsrError, Credential, ERR_SERVER_ERROR, Result, TlsSigV2, TokenSigner};
use uuid::Uuid;

pub const DEFAULT_HTTP_ENDPOINT: &str = "https://asr.cloud-rtc.com";

pub(crate) const HEADER_SDK_APP_ID: &str = "X-TRTC-SdkAppId";
pub(crate) const HEADER_USER_SIG: &str = "X-TRTC-UserSig";

#[derive(Clone)]
pub(crate) struct ApiClient {
    credential: Arc<Credential>,
    signer: Arc<dyn TokenSigner>,
    client: Client,
    pub(crate) endpoint: String,
    pub(crate) timeout: Duration,
}

impl ApiClient {
    pub(crate) fn new(credential: Arc<Credential>, timeout: Duration) -> Self {
        Self {
            credential,
            signer: Arc::new(TlsSigV2),
            client: Client::new(),
            endpoint: DEFAULT_HTTP_ENDPOINT.to_string(),
            timeout,
        }
    }

    pub(crate) fn set_signer(&mut self, signer: Arc<dyn TokenSigner>) {
        self.signer = signer;
    }

    /// POSTs `body` to `path` and returns the decoded `Response` object.
    ///
    /// Every call gets a fresh request id, which is also the identifier the
    /// UserSig is issued for.
    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request_id = Uuid::new_v4().to_string();
        let user_sig =
            self.credential
                .resolve_user_sig(&request_id, self.signer.as_ref(), SESSION_EXPIRE_SECS)?;

        let app_id = self.credential.app_id();
        let url = format!(
            "{}{}?AppId={}&Secretid={}&RequestId={}&Timestamp={}",
            self.endpoint.trim_end_matches('/'),
            path,
            app_id,
            app_id,
            request_id,
            Utc::now().timestamp()
        );

        let body = serde_json::to_vec(body)
            .map_err(|e| AsrError::InvalidParameter(format!("marshal request failed: {e}")))?;

        debug!(path, request_id = %request_id, bytes = body.len(), "sending request");

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(HEADER_SDK_APP_ID, self.credential.sdk_app_id().to_string())
            .header(HEADER_USER_SIG, user_sig)
            .body(body)
            .send()
            .await
            .map_err(|e| AsrError::ConnectFailed(format!("http request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AsrError::ReadFailed(format!("read response failed: {e}")))?;

        if !status.is_success() {
            return Err(AsrError::server(
                ERR_SERVER_ERROR,
                format!("http status {}: {text}", status.as_u16()),
            ));
        }

        parse_envelope(&text)
    }
}

/// Unwraps `{"Response": {...}}`, turning an `Error` member into a server error.
pub(crate) fn parse_envelope<T: DeserializeOwned>(text: &str) -> Result<T> {
    let mut value: Value = serde_json::from_str(text)
        .map_err(|e| AsrError::ReadFailed(format!("unmarshal response failed: {e}")))?;

    let response = match value.get_mut("Response").map(Value::take) {
        Some(response) if !response.is_null() => response,
        _ => {
            return Err(AsrError::server(
                ERR_SERVER_ERROR,
                "empty response from server",
            ));
        }
    };

    if let Some(error) = response.get("Error").filter(|e| is_present(e)) {
        return Err(AsrError::server(
            ERR_SERVER_ERROR,
            format!(
                "server error [{}]: {} (RequestId: {})",
                str_field(error, "Code"),
                str_field(error, "Message"),
                str_field(&response, "RequestId")
            ),
        ));
    }

    serde_json::from_value(response)
        .map_err(|e| AsrError::ReadFailed(format!("unmarshal response failed: {e}")))
}

fn is_present(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Object(m) => !m.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn str_field(v: &Value, key: &str) -> String {
    match v.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
