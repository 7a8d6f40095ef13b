//! Audio playback to speakers

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::orchestrator::AudioSink;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays audio to the default output device
pub struct AudioPlayback {
    config: StreamConfig,
    sample_rate: u32,
}

impl AudioPlayback {
    /// Create a playback instance at the default TTS sample rate
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        Self::with_sample_rate(PLAYBACK_SAMPLE_RATE)
    }

    /// Create a playback instance at a specific sample rate
    ///
    /// # Errors
    ///
    /// Returns error if no output config supports `sample_rate`
    pub fn with_sample_rate(sample_rate: u32) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| {
                Error::Playback(format!("no output config supports {sample_rate} Hz"))
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            sample_rate,
        })
    }

    /// Play mono samples, blocking until done
    ///
    /// # Errors
    ///
    /// Returns error if the output stream fails
    pub fn play_blocking(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device".to_string()))?;

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Relaxed);
                                0.0
                            });
                            frame.fill(sample);
                            pos = (pos + 1).min(samples.len());
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Playback(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(self.sample_rate);
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();

        while !finished.load(Ordering::Relaxed) {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Small delay to ensure audio finishes
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");

        Ok(())
    }
}

/// Decode WAV or MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns `Playback` if the bytes are not decodable
pub fn decode_audio(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    if data.starts_with(b"RIFF") {
        decode_wav(data)
    } else {
        decode_mp3(data)
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?
        }
    };

    Ok((downmix(&interleaved, channels), spec.sample_rate))
}

fn decode_mp3(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate.get_or_insert(frame.sample_rate);
                let frame_samples: Vec<f32> =
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&frame_samples, frame.channels.max(1)));
            }
            // ID3 tags and junk between frames
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    let sample_rate = sample_rate
        .and_then(|r| u32::try_from(r).ok())
        .ok_or_else(|| Error::Playback("MP3 stream contains no frames".to_string()))?;

    Ok((samples, sample_rate))
}

/// Average interleaved channels down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Plays encoded speech on the default output device
#[derive(Default)]
pub struct SpeakerSink {
    save_to: Option<PathBuf>,
}

impl SpeakerSink {
    #[must_use]
    pub const fn new() -> Self {
        Self { save_to: None }
    }

    /// Also write each played clip to `path`
    #[must_use]
    pub fn with_save_path(mut self, path: Option<PathBuf>) -> Self {
        self.save_to = path;
        self
    }
}

#[async_trait]
impl AudioSink for SpeakerSink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        if let Some(path) = &self.save_to {
            tokio::fs::write(path, audio).await.map_err(|e| {
                Error::Playback(format!("failed to save {}: {e}", path.display()))
            })?;
            tracing::debug!(path = %path.display(), "speech saved");
        }

        let audio = audio.to_vec();
        tokio::task::spawn_blocking(move || {
            let (samples, sample_rate) = decode_audio(&audio)?;
            AudioPlayback::with_sample_rate(sample_rate)?.play_blocking(samples)
        })
        .await
        .map_err(|e| Error::Playback(e.to_string()))?
    }
}
