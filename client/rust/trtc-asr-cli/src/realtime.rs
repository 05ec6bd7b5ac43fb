use anyhow::{Context, Result, ensure};
use bytes::Bytes;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use trtc_asr_client::ws::DEFAULT_ENDPOINT;
use trtc_asr_client::{ChannelListener, RecognitionEvent, SpeechRecognizer};
use trtc_asr_core::Credential;

#[derive(Args, Debug, Clone)]
pub struct RealtimeArgs {
    /// 16 kHz mono 16-bit PCM file
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long, default_value = "16k_zh_en")]
    pub engine: String,

    /// Number of sessions streaming the file at the same time
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Start a new session after each one finishes, until interrupted
    #[arg(long = "loop")]
    pub repeat: bool,

    /// Bytes per audio frame (6400 bytes = 200 ms of 16 kHz PCM)
    #[arg(long, default_value_t = 6400)]
    pub slice_size: usize,

    /// Delay between frames in milliseconds
    #[arg(long, default_value_t = 200)]
    pub interval_ms: u64,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

pub async fn run_realtime(credential: Arc<Credential>, args: RealtimeArgs) -> Result<()> {
    ensure!(args.concurrency > 0, "--concurrency must be at least 1");
    ensure!(args.slice_size > 0, "--slice-size must be at least 1");

    let audio = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    ensure!(!audio.is_empty(), "{} is empty", args.file.display());
    let audio = Bytes::from(audio);

    info!(
        file = %args.file.display(),
        bytes = audio.len(),
        concurrency = args.concurrency,
        "streaming"
    );

    let mut workers = JoinSet::new();
    for worker in 0..args.concurrency {
        let credential = Arc::clone(&credential);
        let audio = audio.clone();
        let args = args.clone();
        workers.spawn(async move {
            loop {
                stream_once(worker, Arc::clone(&credential), &audio, &args).await?;
                if !args.repeat {
                    return Ok::<_, anyhow::Error>(());
                }
            }
        });
    }

    let mut failures = 0usize;
    loop {
        tokio::select! {
            next = workers.join_next() => match next {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    error!("session failed: {e:#}");
                    failures += 1;
                }
                Some(Err(e)) => {
                    error!("worker panicked: {e}");
                    failures += 1;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, aborting sessions");
                workers.abort_all();
                break;
            }
        }
    }

    ensure!(failures == 0, "{failures} of {} sessions failed", args.concurrency);
    Ok(())
}

async fn stream_once(
    worker: usize,
    credential: Arc<Credential>,
    audio: &Bytes,
    args: &RealtimeArgs,
) -> Result<()> {
    let (listener, events) = ChannelListener::new();
    let recognizer = SpeechRecognizer::builder(credential, args.engine.as_str(), Arc::new(listener))
        .endpoint(args.endpoint.as_str())
        .build();

    recognizer.start().await?;
    let voice_id = recognizer.voice_id().unwrap_or_default();
    let printer = tokio::spawn(log_events(worker, voice_id, events));

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));
    for offset in (0..audio.len()).step_by(args.slice_size) {
        ticker.tick().await;
        let end = (offset + args.slice_size).min(audio.len());
        if let Err(e) = recognizer.write(audio.slice(offset..end)).await {
            warn!(worker, "write failed, stopping early: {e}");
            break;
        }
    }

    let stopped = recognizer.stop().await;
    drop(recognizer);
    printer.await?;

    stopped?;
    Ok(())
}

async fn log_events(worker: usize, voice_id: String, mut events: UnboundedReceiver<RecognitionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RecognitionEvent::RecognitionStart(_) => {
                info!(worker, voice_id = %voice_id, "recognition start");
            }
            RecognitionEvent::SentenceBegin(r) => {
                info!(worker, index = r.result.index, "sentence begin");
            }
            RecognitionEvent::ResultChange(r) => {
                info!(worker, index = r.result.index, text = %r.result.voice_text_str, "result change");
            }
            RecognitionEvent::SentenceEnd(r) => {
                info!(
                    worker,
                    index = r.result.index,
                    start_ms = r.result.start_time,
                    end_ms = r.result.end_time,
                    text = %r.result.voice_text_str,
                    "sentence end"
                );
            }
            RecognitionEvent::RecognitionComplete(_) => {
                info!(worker, voice_id = %voice_id, "recognition complete");
            }
            RecognitionEvent::Fail { response, error } => {
                warn!(
                    worker,
                    voice_id = %voice_id,
                    code = error.code(),
                    server_message_id = response.as_ref().map(|r| r.message_id.as_str()).unwrap_or(""),
                    "recognition failed: {error}"
                );
            }
        }
    }
}
