use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trtc_asr_core::Credential;

mod file;
mod realtime;
mod sentence;

#[derive(Parser, Debug)]
#[command(author, version, about = "TRTC ASR command line client")]
struct Cli {
    #[command(flatten)]
    auth: AuthArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Cloud account id
    #[arg(long, env = "TRTC_APP_ID", global = true)]
    app_id: Option<u64>,

    /// Application id the UserSig is issued for
    #[arg(long, env = "TRTC_SDK_APP_ID", global = true)]
    sdk_app_id: Option<u64>,

    /// Application signing key
    #[arg(long, env = "TRTC_SECRET_KEY", global = true, hide_env_values = true)]
    secret_key: Option<String>,

    /// Pre-computed UserSig; skips local signing
    #[arg(long, env = "TRTC_USER_SIG", global = true, hide_env_values = true)]
    user_sig: Option<String>,
}

impl AuthArgs {
    fn credential(&self) -> Result<Arc<Credential>> {
        let app_id = self
            .app_id
            .context("--app-id or TRTC_APP_ID is required")?;
        let sdk_app_id = self
            .sdk_app_id
            .context("--sdk-app-id or TRTC_SDK_APP_ID is required")?;
        let secret_key = self
            .secret_key
            .clone()
            .context("--secret-key or TRTC_SECRET_KEY is required")?;

        let credential = Credential::new(app_id, sdk_app_id, secret_key);
        if let Some(sig) = &self.user_sig {
            credential.set_user_sig(sig.clone());
        }
        Ok(Arc::new(credential))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a PCM file through real-time recognition sessions
    Realtime(realtime::RealtimeArgs),
    /// Recognize a short clip in one request
    Sentence(sentence::SentenceArgs),
    /// Submit a recording as a recognition task and wait for the result
    File(file::FileArgs),
    /// Print a UserSig
    Sign(SignArgs),
}

#[derive(Args, Debug)]
struct SignArgs {
    /// Identifier the token is issued for
    #[arg(long)]
    identifier: String,

    /// Validity in seconds
    #[arg(long, default_value_t = trtc_asr_core::usersig::DEFAULT_EXPIRE_SECS)]
    expire_secs: i64,
}

/// Audio given either as a local file or a URL the service can fetch.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub(crate) struct AudioSource {
    /// Local audio file, sent inline
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Publicly reachable audio URL
    #[arg(long)]
    pub url: Option<String>,
}

pub(crate) enum Audio {
    Data(Vec<u8>),
    Url(String),
}

impl AudioSource {
    pub(crate) async fn load(&self) -> Result<Audio> {
        match (&self.file, &self.url) {
            (Some(path), _) => {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Ok(Audio::Data(data))
            }
            (None, Some(url)) => Ok(Audio::Url(url.clone())),
            (None, None) => anyhow::bail!("either --file or --url is required"),
        }
    }
}

fn run_sign(auth: &AuthArgs, args: SignArgs) -> Result<()> {
    let sdk_app_id = auth
        .sdk_app_id
        .context("--sdk-app-id or TRTC_SDK_APP_ID is required")?;
    let secret_key = auth
        .secret_key
        .as_deref()
        .context("--secret-key or TRTC_SECRET_KEY is required")?;

    let sig = trtc_asr_core::gen_user_sig(sdk_app_id, secret_key, &args.identifier, args.expire_secs)?;
    println!("{sig}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Realtime(args) => realtime::run_realtime(cli.auth.credential()?, args).await?,
        Commands::Sentence(args) => sentence::run_sentence(cli.auth.credential()?, args).await?,
        Commands::File(args) => file::run_file(cli.auth.credential()?, args).await?,
        Commands::Sign(args) => run_sign(&cli.auth, args)?,
    }

    Ok(())
}
