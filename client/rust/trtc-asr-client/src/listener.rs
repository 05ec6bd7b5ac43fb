use crate::protocol::SpeechRecognitionResponse;
use tokio::sync::mpsc;
use trtc_asr_core::AsrError;

/// Receives the events of one streaming session.
///
/// Every call comes from the session's single receive task, in the order the
/// server sent the messages. Implementations must return promptly; a slow
/// callback delays every later event.
pub trait SpeechRecognitionListener: Send + Sync {
    /// A message whose slice kind is not one of begin / change / end, and which
    /// is not final. May be called more than once per session.
    fn on_recognition_start(&self, response: &SpeechRecognitionResponse);

    fn on_sentence_begin(&self, response: &SpeechRecognitionResponse);

    fn on_recognition_result_change(&self, response: &SpeechRecognitionResponse);

    fn on_sentence_end(&self, response: &SpeechRecognitionResponse);

    /// The final message. No callback follows it.
    fn on_recognition_complete(&self, response: &SpeechRecognitionResponse);

    /// `response` is present when the failure was reported by the server.
    fn on_fail(&self, response: Option<&SpeechRecognitionResponse>, error: &AsrError);
}

/// Owned form of a listener callback.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    RecognitionStart(SpeechRecognitionResponse),
    SentenceBegin(SpeechRecognitionResponse),
    ResultChange(SpeechRecognitionResponse),
    SentenceEnd(SpeechRecognitionResponse),
    RecognitionComplete(SpeechRecognitionResponse),
    Fail {
        response: Option<SpeechRecognitionResponse>,
        error: AsrError,
    },
}

/// Forwards every callback into an unbounded channel.
///
/// Lets async callers consume a session as a stream of [`RecognitionEvent`]s.
/// Sending never blocks; events are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<RecognitionEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: RecognitionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("recognition event dropped, receiver closed");
        }
    }
}

impl SpeechRecognitionListener for ChannelListener {
    fn on_recognition_start(&self, response: &SpeechRecognitionResponse) {
        self.forward(RecognitionEvent::RecognitionStart(response.clone()));
    }

    fn on_sentence_begin(&self, response: &SpeechRecognitionResponse) {
        self.forward(RecognitionEvent::SentenceBegin(response.clone()));
    }

    fn on_recognition_result_change(&self, response: &SpeechRecognitionResponse) {
        self.forward(RecognitionEvent::ResultChange(response.clone()));
    }

    fn on_sentence_end(&self, response: &SpeechRecognitionResponse) {
        self.forward(RecognitionEvent::SentenceEnd(response.clone()));
    }

    fn on_recognition_complete(&self, response: &SpeechRecognitionResponse) {
        self.forward(RecognitionEvent::RecognitionComplete(response.clone()));
    }

    fn on_fail(&self, response: Option<&SpeechRecognitionResponse>, error: &AsrError) {
        self.forward(RecognitionEvent::Fail {
            response: response.cloned(),
            error: error.clone(),
        });
    }
}
