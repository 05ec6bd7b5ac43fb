use crate::listener::SpeechRecognitionListener;
use crate::protocol::{ControlMsg, SliceKind, SpeechRecognitionResponse, decode_response, encode_control_msg};
use crate::transport::{Connector, FrameSink, FrameStream, WsConnector};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};
use trtc_asr_core::usersig::SESSION_EXPIRE_SECS;
use trtc_asr_core::{AsrError, Credential, Result, SignatureParams, TlsSigV2, TokenSigner, redact_url};

pub const DEFAULT_ENDPOINT: &str = "wss://asr.cloud-rtc.com";
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STOP_WAIT: Duration = Duration::from_secs(10);

const HEADER_SDK_APP_ID: HeaderName = HeaderName::from_static("x-trtc-sdkappid");
const HEADER_USER_SIG: HeaderName = HeaderName::from_static("x-trtc-usersig");

/// Lifecycle of a [`SpeechRecognizer`]. Ordered: later states compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Tunable settings of a streaming session.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub endpoint: String,
    /// 1 = PCM.
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
    /// Fixed voice id. A random one is generated at start when unset.
    pub voice_id: Option<String>,
    /// Limit for one frame write, the end frame and the close handshake.
    pub write_timeout: Duration,
    pub connect_timeout: Duration,
    pub stop_wait: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
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
            voice_id: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stop_wait: DEFAULT_STOP_WAIT,
        }
    }
}

pub struct SpeechRecognizerBuilder {
    credential: Arc<Credential>,
    engine_model_type: String,
    listener: Arc<dyn SpeechRecognitionListener>,
    signer: Arc<dyn TokenSigner>,
    connector: Arc<dyn Connector>,
    config: RealtimeConfig,
}

impl SpeechRecognizerBuilder {
    pub fn config(mut self, config: RealtimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn voice_format(mut self, voice_format: i32) -> Self {
        self.config.voice_format = voice_format;
        self
    }

    pub fn need_vad(mut self, need_vad: i32) -> Self {
        self.config.need_vad = need_vad;
        self
    }

    pub fn convert_num_mode(mut self, mode: i32) -> Self {
        self.config.convert_num_mode = mode;
        self
    }

    pub fn hotword_id(mut self, hotword_id: impl Into<String>) -> Self {
        self.config.hotword_id = hotword_id.into();
        self
    }

    pub fn customization_id(mut self, customization_id: impl Into<String>) -> Self {
        self.config.customization_id = customization_id.into();
        self
    }

    pub fn filter_dirty(mut self, level: i32) -> Self {
        self.config.filter_dirty = level;
        self
    }

    pub fn filter_modal(mut self, level: i32) -> Self {
        self.config.filter_modal = level;
        self
    }

    pub fn filter_punc(mut self, level: i32) -> Self {
        self.config.filter_punc = level;
        self
    }

    pub fn word_info(mut self, level: i32) -> Self {
        self.config.word_info = level;
        self
    }

    pub fn vad_silence_time(mut self, ms: i32) -> Self {
        self.config.vad_silence_time = ms;
        self
    }

    pub fn max_speak_time(mut self, ms: i32) -> Self {
        self.config.max_speak_time = ms;
        self
    }

    pub fn voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.config.voice_id = Some(voice_id.into());
        self
    }

    pub fn write_timeout(mut self, d: Duration) -> Self {
        self.config.write_timeout = d;
        self
    }

    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.config.connect_timeout = d;
        self
    }

    pub fn stop_wait(mut self, d: Duration) -> Self {
        self.config.stop_wait = d;
        self
    }

    pub fn signer(mut self, signer: Arc<dyn TokenSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn build(self) -> SpeechRecognizer {
        let voice_id = self.config.voice_id.clone();
        let shared = Arc::new(Shared::new(self.config.write_timeout));
        SpeechRecognizer {
            credential: self.credential,
            engine_model_type: self.engine_model_type,
            listener: self.listener,
            signer: self.signer,
            connector: self.connector,
            config: self.config,
            voice_id: Mutex::new(voice_id),
            shared,
            recv_task: Mutex::new(None),
        }
    }
}

/// State touched by both the caller and the receive task.
struct Shared {
    state: Mutex<SessionState>,
    sink: tokio::sync::Mutex<Option<FrameSink>>,
    connected: AtomicBool,
    close_timeout: Duration,
}

impl Shared {
    fn new(close_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            sink: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
            close_timeout,
        }
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    /// Safe to call from several places; only the first call closes. A peer
    /// that does not finish the close handshake in time is dropped.
    async fn close_connection(&self) {
        let sink = self.sink.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        if let Some(mut sink) = sink {
            match timeout(self.close_timeout, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("closing connection failed: {e}"),
                Err(_) => warn!(
                    "close handshake not finished within {:?}, dropping connection",
                    self.close_timeout
                ),
            }
        }
    }
}

/// One real-time recognition session over a WebSocket.
///
/// Single use: `start`, any number of `write`s, then `stop`. All methods take
/// `&self` so the session can be shared between a writer task and a stopper.
/// Server events are delivered to the listener from a background task.
pub struct SpeechRecognizer {
    credential: Arc<Credential>,
    engine_model_type: String,
    listener: Arc<dyn SpeechRecognitionListener>,
    signer: Arc<dyn TokenSigner>,
    connector: Arc<dyn Connector>,
    config: RealtimeConfig,
    voice_id: Mutex<Option<String>>,
    shared: Arc<Shared>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechRecognizer {
    pub fn builder(
        credential: Arc<Credential>,
        engine_model_type: impl Into<String>,
        listener: Arc<dyn SpeechRecognitionListener>,
    ) -> SpeechRecognizerBuilder {
        SpeechRecognizerBuilder {
            credential,
            engine_model_type: engine_model_type.into(),
            listener,
            signer: Arc::new(TlsSigV2),
            connector: Arc::new(WsConnector),
            config: RealtimeConfig::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The session's voice id, once assigned.
    pub fn voice_id(&self) -> Option<String> {
        self.voice_id.lock().clone()
    }

    pub fn engine_model_type(&self) -> &str {
        &self.engine_model_type
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if *state != SessionState::Idle {
                return Err(AsrError::AlreadyStarted);
            }
            *state = SessionState::Starting;
        }

        let (sink, stream, voice_id) = match self.connect().await {
            Ok(parts) => parts,
            Err(e) => {
                self.shared.set_state(SessionState::Idle);
                return Err(e);
            }
        };

        *self.shared.sink.lock().await = Some(sink);
        self.shared.connected.store(true, Ordering::SeqCst);
        self.shared.set_state(SessionState::Running);

        let handle = tokio::spawn(receive_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.listener),
            stream,
            voice_id.clone(),
        ));
        *self.recv_task.lock() = Some(handle);

        info!(voice_id = %voice_id, engine = %self.engine_model_type, "recognition started");
        Ok(())
    }

    /// Sends one binary audio frame. Frames reach the server in call order.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        if self.shared.state() != SessionState::Running {
            return Err(AsrError::NotStarted("recognizer not running"));
        }

        let mut guard = self.shared.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or(AsrError::NotStarted("connection not established"))?;

        match timeout(self.config.write_timeout, sink.send(Message::Binary(data.into()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AsrError::WriteFailed(format!("write audio data failed: {e}"))),
            Err(_) => Err(AsrError::WriteFailed(format!(
                "write audio data failed: timed out after {:?}",
                self.config.write_timeout
            ))),
        }
    }

    /// Ends the audio stream and waits for the server to finish.
    ///
    /// Whenever the session was running, it is `Stopped` on return, whether or
    /// not this call fails.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if *state != SessionState::Running {
                return Err(AsrError::NotStarted("recognizer not running"));
            }
            *state = SessionState::Stopping;
        }

        if let Err(e) = self.send_end().await {
            warn!(voice_id = ?self.voice_id(), "stop failed, closing connection: {e}");
            self.teardown().await;
            return Err(e);
        }

        let handle = self.recv_task.lock().take();
        if let Some(mut handle) = handle {
            if timeout(self.config.stop_wait, &mut handle).await.is_err() {
                warn!(
                    voice_id = ?self.voice_id(),
                    "no final result within {:?}, closing connection",
                    self.config.stop_wait
                );
                handle.abort();
            }
        }

        self.shared.close_connection().await;
        self.shared.set_state(SessionState::Stopped);
        info!(voice_id = ?self.voice_id(), "recognition stopped");
        Ok(())
    }

    async fn send_end(&self) -> Result<()> {
        let end = encode_control_msg(&ControlMsg::End)?;

        let mut guard = self.shared.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or(AsrError::NotStarted("connection not established"))?;

        match timeout(self.config.write_timeout, sink.send(Message::text(end))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AsrError::WriteFailed(format!("send end signal failed: {e}"))),
            Err(_) => Err(AsrError::WriteFailed(format!(
                "send end signal failed: timed out after {:?}",
                self.config.write_timeout
            ))),
        }
    }

    async fn teardown(&self) {
        if let Some(handle) = self.recv_task.lock().take() {
            handle.abort();
        }
        self.shared.close_connection().await;
        self.shared.set_state(SessionState::Stopped);
    }

    async fn connect(&self) -> Result<(FrameSink, FrameStream, String)> {
        if self.engine_model_type.is_empty() {
            return Err(AsrError::InvalidParameter(
                "engine model type is required".to_string(),
            ));
        }

        let voice_id = self
            .voice_id
            .lock()
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();

        let user_sig =
            self.credential
                .resolve_user_sig(&voice_id, self.signer.as_ref(), SESSION_EXPIRE_SECS)?;

        let url = self.connect_url(&voice_id, &user_sig);
        let request = self.handshake_request(&url, &user_sig)?;

        debug!(url = %redact_url(&url), "connecting");

        match timeout(self.config.connect_timeout, self.connector.connect(request)).await {
            Ok(Ok((sink, stream))) => Ok((sink, stream, voice_id)),
            Ok(Err(e)) => Err(connect_error(e)),
            Err(_) => Err(AsrError::ConnectFailed(format!(
                "websocket connect failed: timed out after {:?}",
                self.config.connect_timeout
            ))),
        }
    }

    fn connect_url(&self, voice_id: &str, user_sig: &str) -> String {
        let cfg = &self.config;
        let mut params =
            SignatureParams::new(self.credential.app_id(), &self.engine_model_type, voice_id);
        params.voice_format = cfg.voice_format;
        params.need_vad = cfg.need_vad;
        params.convert_num_mode = cfg.convert_num_mode;
        params.hotword_id = cfg.hotword_id.clone();
        params.customization_id = cfg.customization_id.clone();
        params.filter_dirty = cfg.filter_dirty;
        params.filter_modal = cfg.filter_modal;
        params.filter_punc = cfg.filter_punc;
        params.word_info = cfg.word_info;
        params.vad_silence_time = cfg.vad_silence_time;
        params.max_speak_time = cfg.max_speak_time;

        format!(
            "{}/asr/v2/{}?{}",
            cfg.endpoint.trim_end_matches('/'),
            self.credential.app_id(),
            params.build_query_string_with_signature(user_sig)
        )
    }

    fn handshake_request(&self, url: &str, user_sig: &str) -> Result<Request> {
        let mut req = url
            .into_client_request()
            .map_err(|e| AsrError::InvalidParameter(format!("invalid endpoint: {e}")))?;

        let sdk_app_id = HeaderValue::from(self.credential.sdk_app_id());
        let user_sig = HeaderValue::from_str(user_sig)
            .map_err(|e| AsrError::AuthFailed(format!("user sig is not a valid header: {e}")))?;

        req.headers_mut().insert(HEADER_SDK_APP_ID, sdk_app_id);
        req.headers_mut().insert(HEADER_USER_SIG, user_sig);
        Ok(req)
    }
}

impl Drop for SpeechRecognizer {
    fn drop(&mut self) {
        if let Some(handle) = self.recv_task.get_mut().take() {
            handle.abort();
        }
    }
}

fn connect_error(e: WsError) -> AsrError {
    match &e {
        WsError::Http(resp)
            if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN =>
        {
            AsrError::AuthFailed(format!("server rejected authentication: {}", resp.status()))
        }
        _ => AsrError::ConnectFailed(format!("websocket connect failed: {e}")),
    }
}

async fn receive_loop(
    shared: Arc<Shared>,
    listener: Arc<dyn SpeechRecognitionListener>,
    mut stream: FrameStream,
    voice_id: String,
) {
    let closing = || shared.state() >= SessionState::Stopping;

    loop {
        let decoded = match stream.next().await {
            Some(Ok(Message::Text(text))) => decode_response(text.as_str()),
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => decode_response(text),
                Err(e) => Err(AsrError::ReadFailed(format!("unmarshal response failed: {e}"))),
            },
            Some(Ok(Message::Close(frame))) => {
                if !closing() {
                    let detail = frame
                        .map(|f| format!(" (code {}, reason: {})", u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_default();
                    listener.on_fail(
                        None,
                        &AsrError::ReadFailed(format!(
                            "websocket connection closed unexpectedly{detail}"
                        )),
                    );
                }
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                if !closing() {
                    listener.on_fail(None, &AsrError::ReadFailed(format!("read message failed: {e}")));
                }
                break;
            }
            None => {
                if !closing() {
                    listener.on_fail(
                        None,
                        &AsrError::ReadFailed("websocket connection closed unexpectedly".to_string()),
                    );
                }
                break;
            }
        };

        let resp = match decoded {
            Ok(resp) => resp,
            Err(e) => {
                warn!(voice_id = %voice_id, "dropping undecodable message: {e}");
                listener.on_fail(None, &e);
                continue;
            }
        };

        if resp.is_error() {
            warn!(voice_id = %voice_id, code = resp.code, "server reported error: {}", resp.message);
            let err = AsrError::server(resp.code, resp.message.clone());
            listener.on_fail(Some(&resp), &err);
            break;
        }

        debug!(
            voice_id = %voice_id,
            slice_type = resp.result.slice_type,
            index = resp.result.index,
            "recognition event"
        );
        dispatch(listener.as_ref(), &resp);

        if resp.is_final() {
            listener.on_recognition_complete(&resp);
            break;
        }
    }

    shared.close_connection().await;
}

fn dispatch(listener: &dyn SpeechRecognitionListener, resp: &SpeechRecognitionResponse) {
    match resp.result.slice_kind() {
        SliceKind::SentenceBegin => listener.on_sentence_begin(resp),
        SliceKind::ResultChange => listener.on_recognition_result_change(resp),
        SliceKind::SentenceEnd => listener.on_sentence_end(resp),
        SliceKind::Other(_) if resp.is_final() => {}
        // Any other non-final message is reported as a start, possibly more than once.
        SliceKind::Other(_) => listener.on_recognition_start(resp),
    }
}
