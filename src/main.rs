use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nero_voice::voice::{
    AudioPlayback, Microphone, PLAYBACK_SAMPLE_RATE, SpeakerSynthesizer, SpeechToText,
    TextToSpeech, TranscribingSpotter, calibrate_ambient_noise, list_input_devices,
};
use nero_voice::{ClaudeAgent, Collaborators, Config, SessionController, Synthesizer};

/// Nero - hands-free voice assistant
#[derive(Parser)]
#[command(name = "nero", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "NERO_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Input device name or index (see `list-mics`)
        #[arg(long, env = "NERO_INPUT_DEVICE")]
        device: Option<String>,
    },
    /// List available input devices
    ListMics,
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Olá! Este é um teste do sistema de voz.")]
        text: String,
    },
    /// Print the resolved configuration (secrets redacted)
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env must be loaded before clap reads env-backed flags
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,nero_voice=info",
        1 => "info,nero_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, device } => test_mic(duration, device.as_deref()).await,
            Command::ListMics => list_mics(),
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(config_path, &text).await,
            Command::CheckConfig => check_config(config_path),
        };
    }

    let config = Config::load(config_path)?;
    tracing::debug!(?config, "loaded configuration");

    let microphone = Microphone::open(config.voice.input_device.as_deref())?;
    let feed = microphone.feed();

    let stt = Arc::new(SpeechToText::from_config(&config.voice, &config.api_keys)?);
    let tts = Arc::new(TextToSpeech::from_config(&config.voice, &config.api_keys)?);
    let agent = ClaudeAgent::new(
        config.api_keys.anthropic.clone().unwrap_or_default(),
        &config.agent,
    )?;

    tracing::info!(
        device = microphone.device_name(),
        stt = %config.voice.stt_provider,
        tts = %config.voice.tts_provider,
        model = agent.model(),
        "nero ready"
    );

    let mut spotter = TranscribingSpotter::new(feed.clone(), stt.clone());
    if let Some(window) = config.voice.calibration {
        tracing::info!(?window, "calibrating for ambient noise, stay quiet");
        spotter = spotter.with_threshold(calibrate_ambient_noise(&feed, window).await?);
    }

    let collaborators = Collaborators {
        spotter: Arc::new(spotter),
        audio: Box::new(feed.tap()),
        transcriber: stt,
        agent: Arc::new(agent),
        synthesizer: Arc::new(SpeakerSynthesizer::new(tts)),
    };
    let mut controller = SessionController::new(config.session, collaborators);

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, shutting down");
            on_signal.cancel();
        }
    });

    // Run until interrupted
    controller.run(shutdown).await?;
    drop(microphone);

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64, device: Option<&str>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let microphone = Microphone::open(device)?;
    let mut tap = microphone.feed().tap();

    println!("Device: {}", microphone.device_name());
    println!("Sample rate: {} Hz", nero_voice::voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        let samples = tap
            .read_samples(Duration::from_secs(1))
            .await?
            .unwrap_or_default();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Print input devices with the index accepted by `--device`
fn list_mics() -> anyhow::Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }

    println!("Input devices:");
    for (index, name) in devices.iter().enumerate() {
        println!("  [{index}] {name}");
    }
    println!("\nSet NERO_INPUT_DEVICE (or voice.input_device) to a name or index.");
    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play(samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output through the configured provider
async fn test_tts(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let tts = TextToSpeech::from_config(&config.voice, &config.api_keys)?;

    println!(
        "Synthesizing with {} (voice: {})...",
        config.voice.tts_provider, config.voice.tts_voice
    );

    let synthesizer = SpeakerSynthesizer::new(Arc::new(tts));
    synthesizer.speak(text).await?.await_completion().await?;

    println!("Done!");
    Ok(())
}

/// Print the resolved configuration
fn check_config(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    println!("{config:#?}");
    println!("\nConfiguration is valid.");
    Ok(())
}
