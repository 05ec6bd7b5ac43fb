mod http;

pub mod file;
pub mod listener;
pub mod protocol;
pub mod sentence;
pub mod transport;
pub mod ws;

pub use file::{CreateRecTaskRequest, FileRecognizer, TaskStatus};
pub use http::DEFAULT_HTTP_ENDPOINT;
pub use listener::{ChannelListener, RecognitionEvent, SpeechRecognitionListener};
pub use protocol::{RecognitionResult, SliceKind, SpeechRecognitionResponse, WordInfo};
pub use sentence::{SentenceRecognitionRequest, SentenceRecognitionResult, SentenceRecognizer};
pub use transport::{Connector, FrameSink, FrameStream, WsConnector};
pub use ws::{RealtimeConfig, SessionState, SpeechRecognizer, SpeechRecognizerBuilder};

pub use trtc_asr_core::{AsrError, Credential, ErrorKind, Result};
