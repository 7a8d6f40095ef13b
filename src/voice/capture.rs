//! Audio capture from microphone

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};

use crate::orchestrator::AudioSource;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Microphone input at [`SAMPLE_RATE`], downmixed to mono
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// A mono configuration is preferred; otherwise any channel layout that
    /// runs at [`SAMPLE_RATE`] is accepted and averaged down to mono.
    ///
    /// # Errors
    ///
    /// Returns `Capture` if there is no input device or it cannot run at 16 kHz
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Capture("no microphone found".to_string()))?;

        let rate = SampleRate(SAMPLE_RATE);
        let mut candidates: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| Error::Capture(e.to_string()))?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .collect();
        candidates.sort_by_key(SupportedStreamConfigRange::channels);

        let config = candidates
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Capture(format!("microphone cannot record at {SAMPLE_RATE} Hz"))
            })?
            .with_sample_rate(rate)
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            samples: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Begin recording into the internal buffer
    ///
    /// # Errors
    ///
    /// Returns `Capture` if the input stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let samples = Arc::clone(&self.samples);
        let channels = usize::from(self.config.channels.max(1));

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut buf) = samples.lock() else {
                        return;
                    };
                    if channels == 1 {
                        buf.extend_from_slice(data);
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        buf.extend(
                            data.chunks(channels)
                                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                        );
                    }
                },
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(|e| Error::Capture(e.to_string()))?;

        stream.play().map_err(|e| Error::Capture(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop recording; buffered samples are kept
    pub fn stop(&mut self) {
        self.stream = None;
    }

    /// Remove and return everything recorded so far
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.samples
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Copy of everything recorded so far
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.samples
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Drop everything recorded so far
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.clear();
        }
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// Record from the default microphone for a fixed duration
///
/// Blocks the calling thread for `duration`.
///
/// # Errors
///
/// Returns `Capture` if the device cannot be opened or nothing was recorded
pub fn record_blocking(duration: Duration) -> Result<Vec<f32>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    tracing::info!(seconds = duration.as_secs_f32(), "listening");
    std::thread::sleep(duration);
    capture.stop();

    let samples = capture.take_buffer();
    if samples.is_empty() {
        return Err(Error::Capture("no audio captured".to_string()));
    }
    tracing::info!(samples = samples.len(), "finished recording");
    Ok(samples)
}

/// Fixed-length microphone recording as WAV bytes
pub struct MicrophoneSource {
    duration: Duration,
    save_to: Option<PathBuf>,
}

impl MicrophoneSource {
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            save_to: None,
        }
    }

    /// Also write each recording to `path`
    #[must_use]
    pub fn with_save_path(mut self, path: Option<PathBuf>) -> Self {
        self.save_to = path;
        self
    }
}

#[async_trait]
impl AudioSource for MicrophoneSource {
    async fn capture(&self) -> Result<Vec<u8>> {
        let duration = self.duration;
        // cpal streams are not Send; record on a dedicated blocking thread
        let samples = tokio::task::spawn_blocking(move || record_blocking(duration))
            .await
            .map_err(|e| Error::Capture(e.to_string()))??;

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;

        if let Some(path) = &self.save_to {
            tokio::fs::write(path, &wav).await.map_err(|e| {
                Error::Capture(format!("failed to save {}: {e}", path.display()))
            })?;
            tracing::debug!(path = %path.display(), "recording saved");
        }

        Ok(wav)
    }
}

/// Convert f32 samples to 16-bit mono WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Capture(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Capture(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Capture(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
