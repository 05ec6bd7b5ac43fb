use crate::{Audio, AudioSource};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use trtc_asr_client::{DEFAULT_HTTP_ENDPOINT, SentenceRecognizer};
use trtc_asr_core::Credential;

#[derive(Args, Debug)]
pub struct SentenceArgs {
    #[command(flatten)]
    pub source: AudioSource,

    /// Audio container, e.g. pcm, wav, mp3
    #[arg(long, default_value = "pcm")]
    pub voice_format: String,

    #[arg(long, default_value = "16k_zh_en")]
    pub engine: String,

    #[arg(long, default_value = DEFAULT_HTTP_ENDPOINT)]
    pub endpoint: String,
}

pub async fn run_sentence(credential: Arc<Credential>, args: SentenceArgs) -> Result<()> {
    let recognizer = SentenceRecognizer::new(credential).with_endpoint(args.endpoint.as_str());

    let result = match args.source.load().await? {
        Audio::Data(data) => {
            recognizer
                .recognize_data(&data, &args.voice_format, &args.engine)
                .await?
        }
        Audio::Url(url) => {
            recognizer
                .recognize_url(&url, &args.voice_format, &args.engine)
                .await?
        }
    };

    println!("{}", result.result);
    for word in &result.word_list {
        println!("  [{:>6} - {:>6}] {}", word.start_time, word.end_time, word.word);
    }
    eprintln!(
        "duration: {}ms, request id: {}",
        result.audio_duration, result.request_id
    );
    Ok(())
}
