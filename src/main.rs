use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nusantara_newsroom::{
    config::{load_config, ApiConfig, LiveConfig, ScriptConfig, SpeechConfig},
    devices::CpalBackend,
    live::{CloseReason, GeminiLiveConnector, LiveSessionController},
    script::{GeminiScriptWriter, ScriptInput, ScriptResult, ScriptWriter},
    tts::{render_voice_over, GeminiSpeech},
    visualize::LevelMeter,
    NewsroomError,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Gemini API key (defaults to GEMINI_API_KEY / API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Brainstorm out loud with the content director
    Live {
        /// Prebuilt voice for the model's replies
        #[arg(long)]
        voice: Option<String>,
    },
    /// Write a short-form news script from a link or a video
    Script(ScriptArgs),
    /// Export a voice-over WAV for a piece of text
    Speak(SpeakArgs),
}

#[derive(Args, Debug)]
struct ScriptArgs {
    /// Article or video link
    #[arg(long, conflicts_with = "media", required_unless_present = "media")]
    url: Option<String>,

    /// Local video (or audio) file to analyze
    #[arg(long)]
    media: Option<PathBuf>,

    /// MIME type of --media (guessed from the extension otherwise)
    #[arg(long, requires = "media")]
    mime: Option<String>,

    /// Also export the script body as a voice-over
    #[arg(long)]
    speak: bool,

    /// Directory for exported voice-overs
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct SpeakArgs {
    /// Text to speak
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    text: Option<String>,

    /// File holding the text to speak
    #[arg(long)]
    file: Option<PathBuf>,

    /// Prebuilt TTS voice
    #[arg(long)]
    voice: Option<String>,

    /// Directory for the exported WAV
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

fn api_config(cli_key: Option<String>) -> Result<ApiConfig> {
    match cli_key {
        Some(key) => ApiConfig::from_key(key).context("Invalid --api-key"),
        None => load_config().context("Failed to load configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    log::info!("🚀 Initializing nusantara-newsroom");

    let cli = Cli::parse();
    let config = api_config(cli.api_key)?;

    match cli.command {
        Command::Live { voice } => run_live(&config, voice).await,
        Command::Script(args) => run_script(&config, args).await,
        Command::Speak(args) => run_speak(&config, args).await,
    }
}

async fn run_live(config: &ApiConfig, voice: Option<String>) -> Result<()> {
    let mut live_config = LiveConfig::from_env()?;
    if let Some(voice) = voice {
        live_config.persona.voice = voice;
    }

    let connector = GeminiLiveConnector::new(config.gemini_key().to_string(), &live_config);
    let controller =
        LiveSessionController::new(live_config, Arc::new(CpalBackend), Arc::new(connector));

    let meter = Arc::new(Mutex::new(LevelMeter::new()));
    let meter_in_callback = Arc::clone(&meter);

    let session = controller
        .connect(
            move |buffer| {
                if let Ok(mut meter) = meter_in_callback.lock() {
                    meter.observe(buffer);
                }
            },
            |reason| match reason {
                CloseReason::Disconnected => log::info!("🎙️ Session closed"),
                other => eprintln!("\n⚠️  Session ended: {}", other),
            },
        )
        .await
        .map_err(NewsroomError::from)
        .context("Failed to open live session")?;

    println!("🎧 Live newsroom open. Speak to brainstorm, press Ctrl+C to leave.");

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Ok(meter) = meter.lock() {
                    print!("\r🔊 {}", meter.render(40));
                    let _ = std::io::stdout().flush();
                }
            }
            _ = session.closed() => break,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.disconnect().await;
    let stats = session.stats();
    println!(
        "\n👋 Goodbye! Sent {} frames ({} dropped), played {} replies.",
        stats.capture.frames_sent, stats.capture.frames_dropped, stats.buffers_played
    );
    Ok(())
}

async fn run_script(config: &ApiConfig, args: ScriptArgs) -> Result<()> {
    let input = match (args.url, args.media) {
        (Some(url), _) => ScriptInput::Url(url),
        (None, Some(path)) => ScriptInput::media_from_file(&path, args.mime)
            .await
            .map_err(NewsroomError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Pass either --url or --media"),
    };

    let writer = GeminiScriptWriter::with_config(
        config.gemini_key().to_string(),
        ScriptConfig::from_env(),
    )
    .map_err(NewsroomError::from)?;

    println!("📝 Writing script...");
    let result = writer
        .generate(&input)
        .await
        .map_err(NewsroomError::from)?;
    print_script(&result);

    if args.speak {
        export_voice_over(config, &result.script.body, None, &args.out).await?;
    }
    Ok(())
}

async fn run_speak(config: &ApiConfig, args: SpeakArgs) -> Result<()> {
    let text = match (args.text, args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => bail!("Pass either --text or --file"),
    };

    export_voice_over(config, &text, args.voice, &args.out).await
}

async fn export_voice_over(
    config: &ApiConfig,
    text: &str,
    voice: Option<String>,
    out: &Path,
) -> Result<()> {
    let speech_config = SpeechConfig::from_env();
    let voice = voice.unwrap_or_else(|| speech_config.voice.clone());
    let speech = GeminiSpeech::with_config(config.gemini_key().to_string(), speech_config)
        .map_err(NewsroomError::from)?;

    println!("🗣️ Generating voice-over ({})...", voice);
    let voice_over = render_voice_over(&speech, text, &voice)
        .await
        .map_err(NewsroomError::from)?;
    let path = voice_over.save(out).await.map_err(NewsroomError::from)?;

    match voice_over.duration_secs() {
        Ok(seconds) => println!("💾 Saved {} ({:.1}s)", path.display(), seconds),
        Err(_) => println!("💾 Saved {}", path.display()),
    }
    Ok(())
}

fn print_script(result: &ScriptResult) {
    println!("\n📰 {}\n", result.script.headline);
    println!("{}\n", result.script.body);

    if !result.sources.is_empty() {
        println!("🔗 Sources:");
        for source in &result.sources {
            let title = source.title.as_deref().unwrap_or("(untitled)");
            match &source.uri {
                Some(uri) => println!("   - {} <{}>", title, uri),
                None => println!("   - {}", title),
            }
        }
    }
}
