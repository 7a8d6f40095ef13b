use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use murmur::control::{PromptControl, TurnLimit};
use murmur::orchestrator::{Synthesizer, TurnControl};
use murmur::voice::{AudioCapture, AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_audio};
use murmur::{Config, pipeline};

/// Murmur - talk to a local language model, one turn at a time
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Conversation to open or resume
    #[arg(short, long)]
    conversation: Option<String>,

    /// System message for a new conversation
    #[arg(long)]
    system_message: Option<String>,

    /// Stop after this many turns instead of asking
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    max_turns: Option<usize>,

    /// Path to the config file
    #[arg(long, env = "MURMUR_CONFIG")]
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
    /// Print a conversation's history
    History {
        /// Conversation to print (defaults to the configured one)
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// List stored conversations
    Conversations,
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
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = match cli.verbose {
        0 => "info,murmur=info",
        1 => "info,murmur=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(id) = cli.conversation {
        config.conversation_id = id;
    }
    if let Some(message) = cli.system_message {
        config.system_message = message;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::History { conversation } => show_history(&config, conversation.as_deref()),
            Command::Conversations => list_conversations(&config),
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&config, &text).await,
        }
        .map(|()| ExitCode::SUCCESS);
    }

    let control: Box<dyn TurnControl> = match cli.max_turns {
        Some(n) => Box::new(TurnLimit::new(n)),
        None => Box::new(PromptControl),
    };

    let orchestrator = pipeline::build_orchestrator(&config, control)?;

    println!(
        "Conversation \"{}\" ready. Speak after the prompt; recordings last {}s.",
        config.conversation_id,
        config.voice.record_duration.as_secs()
    );

    let report = orchestrator.run().await;

    let last = report
        .last_sequence
        .map_or_else(|| "none".to_string(), |s| s.to_string());

    if report.termination.is_failure() {
        eprintln!(
            "Conversation \"{}\" ended: {} [{}]; last committed sequence: {last}",
            report.conversation_id,
            report.termination,
            report.termination.kind()
        );
        return Ok(ExitCode::FAILURE);
    }

    println!(
        "Conversation \"{}\" saved ({} new turns, last sequence {last}).",
        report.conversation_id, report.turns_committed
    );
    Ok(ExitCode::SUCCESS)
}

/// Print a conversation as transcript lines
fn show_history(config: &Config, conversation: Option<&str>) -> anyhow::Result<()> {
    let id = conversation.unwrap_or(&config.conversation_id);
    let store = pipeline::open_store(config)?;

    let messages = store.read_all(id)?;
    if messages.is_empty() {
        println!("No messages in conversation \"{id}\"");
        return Ok(());
    }

    for message in messages {
        println!("{:>4}  {}", message.sequence, message.transcript_line());
    }
    Ok(())
}

/// List stored conversations
fn list_conversations(config: &Config) -> anyhow::Result<()> {
    let store = pipeline::open_store(config)?;
    let conversations = store.list_conversations()?;

    if conversations.is_empty() {
        println!("No conversations yet");
        return Ok(());
    }

    for c in conversations {
        println!(
            "{:<24} {:>5} messages  created {}",
            c.id,
            c.message_count,
            c.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let levels = tokio::task::spawn_blocking(move || -> murmur::Result<Vec<(f32, f32)>> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;
        println!("Sample rate: {} Hz", capture.sample_rate());
        println!("---");

        let mut levels = Vec::new();
        for i in 0..duration {
            std::thread::sleep(Duration::from_secs(1));

            let samples = capture.peek_buffer();
            let energy = calculate_rms(&samples);
            let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
            println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);

            levels.push((energy, peak));
            capture.clear_buffer();
        }

        capture.stop();
        Ok(levels)
    })
    .await??;

    println!("\n---");
    if levels.iter().all(|(energy, _)| *energy < 0.001) {
        println!("RMS stayed near 0, check:");
        println!("  1. Is your mic plugged in?");
        println!("  2. Run: pactl info | grep 'Default Source'");
        println!("  3. Run: arecord -l (to list devices)");
    } else {
        println!("Your mic is working!");
    }

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
    #[allow(clippy::cast_precision_loss)]
    let rate = PLAYBACK_SAMPLE_RATE as f32;
    let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE * 2)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_blocking(samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output with the configured provider
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = pipeline::build_synthesizer(config)?;

    println!("Synthesizing speech...");
    let audio = tts.synthesize(text).await?;
    println!("Got {} bytes of audio data", audio.len());

    let (samples, rate) = decode_audio(&audio)?;
    println!("Playing {} samples at {rate} Hz...", samples.len());
    tokio::task::spawn_blocking(move || {
        AudioPlayback::with_sample_rate(rate)?.play_blocking(samples)
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
