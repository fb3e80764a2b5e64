use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use parley::audio::{AudioCapture, AudioFrame, AudioPlayback, FRAME_SAMPLES};
use parley::catalog::{ASR_MODELS, TTS_VOICES};
use parley::provider::SpeechSynthesizer;
use parley::{Config, ConversationSession, PipelineMode, TtsClient};

/// Parley - full-duplex voice assistant pipeline
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Persona to use (e.g. "xiaoyou")
    #[arg(short, long, env = "PARLEY_PERSONA")]
    persona: Option<String>,

    /// Pipeline shape: "realtime" (one duplex socket) or "split"
    /// (separate ASR/LLM/TTS)
    #[arg(long, env = "PARLEY_PIPELINE")]
    pipeline: Option<String>,

    /// Recognition model for the split pipeline
    #[arg(long)]
    asr_model: Option<String>,

    /// Synthesis voice identifier
    #[arg(long)]
    tts_voice: Option<String>,

    /// Pick the recognition model and voice interactively
    #[arg(short, long)]
    interactive: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "你好，这是语音合成测试。")]
        text: String,
    },
    /// List selectable recognition models and synthesis voices
    ListVoices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(cli.persona.as_deref(), &text).await,
            Command::ListVoices => list_voices(),
        };
    }

    let mut config = Config::load(cli.persona.as_deref())?;

    // CLI overrides
    if let Some(pipeline) = &cli.pipeline {
        config.pipeline = PipelineMode::parse(pipeline)?;
    }
    if let Some(model) = cli.asr_model {
        config.voice.asr_model = model;
    }
    if let Some(voice) = cli.tts_voice {
        config.voice.tts_voice = voice;
    }

    if cli.interactive {
        pick_interactive(&mut config)?;
    }

    tracing::info!(
        persona = %config.persona.name,
        pipeline = %config.pipeline,
        asr_model = %config.voice.asr_model,
        tts_voice = %config.voice.tts_voice,
        "starting parley"
    );

    // Set up shutdown signal
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    let session = ConversationSession::new(config);
    session.run(&mut shutdown_rx).await?;

    Ok(())
}

/// Interactive recognition-model and voice pickers
fn pick_interactive(config: &mut Config) -> anyhow::Result<()> {
    let model_items: Vec<String> = ASR_MODELS
        .iter()
        .map(|m| format!("{} - {}", m.name, m.description))
        .collect();
    let model_idx = dialoguer::Select::new()
        .with_prompt("选择语音识别模型")
        .items(&model_items)
        .default(0)
        .interact()?;
    config.voice.asr_model = ASR_MODELS[model_idx].name.to_string();

    let voice_items: Vec<String> = TTS_VOICES
        .iter()
        .map(|v| format!("{} - {} ({}) [模型: {}]", v.language, v.description, v.name, v.model))
        .collect();
    let voice_idx = dialoguer::Select::new()
        .with_prompt("选择语音合成声音")
        .items(&voice_items)
        .default(0)
        .interact()?;
    config.voice.tts_voice = TTS_VOICES[voice_idx].name.to_string();
    config.voice.tts_model = TTS_VOICES[voice_idx].model.to_string();

    Ok(())
}

/// List selectable models and voices
#[allow(clippy::unnecessary_wraps)]
fn list_voices() -> anyhow::Result<()> {
    println!("Recognition models:");
    for model in ASR_MODELS {
        println!("  {} - {}", model.name, model.description);
    }

    println!("\nSynthesis voices:");
    for voice in TTS_VOICES {
        println!(
            "  {} - {} ({}) [model: {}]",
            voice.language, voice.description, voice.name, voice.model
        );
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(parley::audio::CAPTURE_SAMPLE_RATE, FRAME_SAMPLES)?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let frames = capture.drain();
        let samples: Vec<i16> = frames.iter().flat_map(|f| f.samples.iter().copied()).collect();
        let energy = calculate_rms(&samples);
        let peak = samples
            .iter()
            .map(|s| f32::from(*s).abs() / 32768.0)
            .fold(0.0f32, f32::max);

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

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate normalized RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let f = f32::from(s) / 32768.0;
            f * f
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = parley::audio::PLAYBACK_SAMPLE_RATE;
    let mut playback = AudioPlayback::new(sample_rate)?;
    playback.start()?;
    let queue = playback.queue();

    // Generate 2 seconds of 440Hz sine wave
    let frequency = 440.0_f32;
    let num_samples = (sample_rate * 2) as usize;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let samples: Vec<i16> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let v = (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3;
            (v * 32767.0) as i16
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    let generation = queue.generation();
    let frame_samples = (sample_rate / 10) as usize;
    for (seq, chunk) in samples.chunks(frame_samples).enumerate() {
        queue.enqueue(AudioFrame::new(seq as u64, chunk.to_vec()), generation);
    }

    playback.wait_until_idle(Duration::from_secs(5));
    playback.stop();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output against the configured provider
#[allow(clippy::future_not_send)]
async fn test_tts(persona: Option<&str>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(persona)?;
    let tts = TtsClient::new(
        &config.credentials,
        config.voice.tts_model.clone(),
        config.voice.tts_voice.clone(),
        config.voice.playback_sample_rate,
    )?;

    println!("Synthesizing speech...");
    let samples = tts.synthesize(text).await?;
    println!("Got {} samples of audio", samples.len());

    println!("Playing audio...");
    let mut playback = AudioPlayback::new(config.voice.playback_sample_rate)?;
    playback.start()?;
    let queue = playback.queue();

    let generation = queue.generation();
    let frame_samples = (config.voice.playback_sample_rate / 10) as usize;
    for (seq, chunk) in samples.chunks(frame_samples).enumerate() {
        queue.enqueue(AudioFrame::new(seq as u64, chunk.to_vec()), generation);
    }

    playback.wait_until_idle(Duration::from_secs(30));
    playback.stop();

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
