use crate::{Audio, AudioSource};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use trtc_asr_client::{DEFAULT_HTTP_ENDPOINT, FileRecognizer};
use trtc_asr_core::Credential;

#[derive(Args, Debug)]
pub struct FileArgs {
    #[command(flatten)]
    pub source: AudioSource,

    #[arg(long, default_value = "16k_zh_en")]
    pub engine: String,

    /// Seconds between status polls
    #[arg(long, default_value_t = 1)]
    pub interval_secs: u64,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,

    #[arg(long, default_value = DEFAULT_HTTP_ENDPOINT)]
    pub endpoint: String,
}

pub async fn run_file(credential: Arc<Credential>, args: FileArgs) -> Result<()> {
    let recognizer = FileRecognizer::new(credential).with_endpoint(args.endpoint.as_str());

    let task_id = match args.source.load().await? {
        Audio::Data(data) => recognizer.create_task_from_data(&data, &args.engine).await?,
        Audio::Url(url) => recognizer.create_task_from_url(&url, &args.engine).await?,
    };
    info!(task_id = %task_id, "task submitted, waiting for result");

    let status = recognizer
        .wait_for_result_with_interval(
            &task_id,
            Duration::from_secs(args.interval_secs),
            Duration::from_secs(args.timeout_secs),
        )
        .await?;

    println!("{}", status.result);
    for detail in &status.result_detail {
        println!(
            "  [{:>7} - {:>7}] {}",
            detail.start_ms, detail.end_ms, detail.final_sentence
        );
    }
    eprintln!(
        "duration: {:.2}s, task id: {}",
        status.audio_duration, status.rec_task_id
    );
    Ok(())
}
