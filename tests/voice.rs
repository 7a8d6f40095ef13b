//! Voice adapter integration tests
//!
//! Exercises audio encoding and decoding without requiring audio hardware

use std::io::Cursor;

use murmur::Error;
use murmur::orchestrator::AudioSink;
use murmur::voice::{SAMPLE_RATE, SpeakerSink, decode_audio, samples_to_wav};

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[test]
fn test_recording_wav_is_16bit_mono() {
    let samples = generate_sine_samples(440.0, 0.5, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_recording_decodes_for_playback() {
    let samples = generate_sine_samples(440.0, 0.25, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let (decoded, rate) = decode_audio(&wav).unwrap();
    assert_eq!(rate, SAMPLE_RATE);
    assert_eq!(decoded.len(), samples.len());

    let peak = decoded.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    assert!((peak - 0.5).abs() < 0.01, "peak was {peak}");
}

#[test]
fn test_stereo_float_wav_is_downmixed() {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 24000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for (left, right) in [(1.0_f32, 0.0_f32), (0.5, -0.5), (0.2, 0.2)] {
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer.finalize().unwrap();
    }

    let (decoded, rate) = decode_audio(&cursor.into_inner()).unwrap();
    assert_eq!(rate, 24000);
    assert_eq!(decoded.len(), 3);
    assert!((decoded[0] - 0.5).abs() < f32::EPSILON);
    assert!(decoded[1].abs() < f32::EPSILON);
    assert!((decoded[2] - 0.2).abs() < 1e-6);
}

#[test]
fn test_empty_input_is_not_audio() {
    assert!(matches!(decode_audio(&[]), Err(Error::Playback(_))));
}

#[tokio::test]
async fn test_speaker_sink_saves_before_playing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reply.mp3");
    let sink = SpeakerSink::new().with_save_path(Some(path.clone()));

    // Undecodable bytes fail before any device is opened
    let result = sink.play(b"not really mp3").await;

    assert!(matches!(result, Err(Error::Playback(_))));
    assert_eq!(std::fs::read(&path).unwrap(), b"not really mp3");
}
