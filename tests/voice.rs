//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use nero_voice::voice::{
    AudioFeed, ENERGY_THRESHOLD, SAMPLE_RATE, SpeechSegmenter, TranscribingSpotter,
    calibrate_ambient_noise, pcm_to_samples, samples_to_pcm, samples_to_wav,
};
use nero_voice::{
    AudioSource, Error, KeywordSpotter, ListenOutcome, PhraseSet, ReadOutcome, spoken_summary,
};
use tokio::sync::broadcast;

mod common;
use common::RecordingTranscriber;

/// Generate sine wave audio samples
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

#[test]
fn test_phrase_normalization() {
    let phrases = PhraseSet::new(["  NERO, Enviar! ", "nero enviar", "", "Enviar"]);
    assert_eq!(phrases.phrases(), &["nero enviar", "enviar"]);
}

#[test]
fn test_phrase_matching_in_sentences() {
    let stop = PhraseSet::new(["nero enviar", "enviar"]);

    assert_eq!(
        stop.match_transcript("Pode enviar, Nero. Nero enviar!"),
        Some("nero enviar")
    );
    assert_eq!(stop.match_transcript("pode ENVIAR agora"), Some("enviar"));
    assert_eq!(stop.match_transcript("reenviar a mensagem"), None);
    assert_eq!(stop.match_transcript(""), None);
}

#[test]
fn test_segmenter_ignores_silence() {
    let mut segmenter = SpeechSegmenter::new();
    assert!(segmenter.push(&generate_silence(2.0)).is_none());
    assert!(!segmenter.is_speaking());
}

#[test]
fn test_segmenter_closes_utterance() {
    let mut segmenter = SpeechSegmenter::new();

    // Loud samples start an utterance
    assert!(segmenter.push(&generate_sine_samples(440.0, 0.5, 0.3)).is_none());
    assert!(segmenter.is_speaking());

    // Silence afterwards completes it
    let utterance = segmenter.push(&generate_silence(0.6)).unwrap();
    assert!(utterance.len() >= 8000);
    assert!(!segmenter.is_speaking());
}

#[test]
fn test_segmenter_drops_short_blips() {
    let mut segmenter = SpeechSegmenter::new();
    segmenter.push(&generate_sine_samples(440.0, 0.1, 0.3));
    assert!(segmenter.push(&generate_silence(0.6)).is_none());
    assert!(!segmenter.is_speaking());
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");
    assert!(wav_data.len() > 44);
}

#[test]
fn test_wav_readback() {
    let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), samples.len());
    assert_eq!(read_samples[0], 0);
    assert!(read_samples[3] > 32_000);
    assert!(read_samples[4] < -32_000);
}

#[test]
fn test_pcm_conversion_keeps_length() {
    let samples = generate_sine_samples(220.0, 0.05, 0.4);
    let pcm = samples_to_pcm(&samples);
    assert_eq!(pcm.len(), samples.len() * 2);
    assert_eq!(pcm_to_samples(&pcm).len(), samples.len());
}

#[test]
fn test_spoken_summary_for_speech() {
    let long = "A previsão para hoje é de sol com algumas nuvens à tarde e possibilidade \
                de chuva fraca no fim do dia, com temperatura máxima de vinte e oito graus.";
    let summary = spoken_summary(long, 80);
    assert!(summary.ends_with("..."));
    assert!(summary.chars().count() <= 83);
    assert_eq!(spoken_summary("  Bom dia!  ", 80), "Bom dia!");
}

#[tokio::test(start_paused = true)]
async fn test_tap_reads_broadcast_audio() {
    let (tx, _rx) = broadcast::channel::<Arc<[f32]>>(16);
    let feed = AudioFeed::from_sender(&tx);
    let mut tap = feed.tap();

    tx.send(Arc::from(vec![0.5_f32; 160])).unwrap();
    tx.send(Arc::from(vec![-0.5_f32; 160])).unwrap();

    match tap.read(Duration::from_millis(100)).await.unwrap() {
        ReadOutcome::Audio(pcm) => assert_eq!(pcm.len(), 320 * 2),
        ReadOutcome::Timeout => panic!("expected audio"),
    }
    assert!(matches!(
        tap.read(Duration::from_millis(100)).await.unwrap(),
        ReadOutcome::Timeout
    ));
}

#[tokio::test(start_paused = true)]
async fn test_tap_reports_closed_microphone() {
    let (tx, _rx) = broadcast::channel::<Arc<[f32]>>(16);
    let feed = AudioFeed::from_sender(&tx);
    let mut tap = feed.tap();
    drop(tx);

    let result = tap.read(Duration::from_millis(100)).await;
    assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
}

#[tokio::test(start_paused = true)]
async fn test_spotter_detects_phrase_in_utterance() {
    let (tx, _rx) = broadcast::channel::<Arc<[f32]>>(64);
    let feed = AudioFeed::from_sender(&tx);
    let transcriber = Arc::new(RecordingTranscriber::returning("Nero, ouvir."));
    let spotter = TranscribingSpotter::new(feed, transcriber.clone());

    let producer = tx.clone();
    tokio::spawn(async move {
        // Let the spotter subscribe first
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut audio = generate_sine_samples(440.0, 0.6, 0.3);
        audio.extend(generate_silence(0.7));
        for chunk in audio.chunks(1600) {
            let _ = producer.send(Arc::from(chunk));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let phrases = PhraseSet::new(["nero ouvir", "nero"]);
    let outcome = spotter
        .listen(&phrases, Some(Duration::from_secs(5)))
        .await
        .unwrap();

    match outcome {
        ListenOutcome::Detected(detection) => assert_eq!(detection.phrase, "nero ouvir"),
        ListenOutcome::Timeout => panic!("expected detection"),
    }
    assert_eq!(transcriber.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_spotter_times_out_in_silence() {
    let (tx, _rx) = broadcast::channel::<Arc<[f32]>>(64);
    let feed = AudioFeed::from_sender(&tx);
    let transcriber = Arc::new(RecordingTranscriber::returning("nero"));
    let spotter = TranscribingSpotter::new(feed, transcriber.clone());

    let outcome = spotter
        .listen(&PhraseSet::new(["nero"]), Some(Duration::from_secs(2)))
        .await
        .unwrap();

    assert_eq!(outcome, ListenOutcome::Timeout);
    assert_eq!(transcriber.calls(), 0);
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn test_spotter_ignores_other_speech() {
    let (tx, _rx) = broadcast::channel::<Arc<[f32]>>(64);
    let feed = AudioFeed::from_sender(&tx);
    let transcriber = Arc::new(RecordingTranscriber::returning("que dia lindo"));
    let spotter = TranscribingSpotter::new(feed, transcriber.clone());

    let producer = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut audio = generate_sine_samples(440.0, 0.6, 0.3);
        audio.extend(generate_silence(0.7));
        for chunk in audio.chunks(1600) {
            let _ = producer.send(Arc::from(chunk));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let outcome = spotter
        .listen(&PhraseSet::new(["nero"]), Some(Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(outcome, ListenOutcome::Timeout);
    assert_eq!(transcriber.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_calibration_follows_room_noise() {
    let (tx, _rx) = broadcast::channel::<Arc<[f32]>>(64);
    let feed = AudioFeed::from_sender(&tx);

    let producer = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        for _ in 0..8 {
            let _ = producer.send(Arc::from(vec![0.1_f32; 1600]));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let threshold = calibrate_ambient_noise(&feed, Duration::from_secs(1))
        .await
        .unwrap();
    assert!((threshold - 0.15).abs() < 1e-3);

    // A calibrated spotter no longer mistakes that noise for speech
    let mut segmenter = SpeechSegmenter::with_threshold(threshold);
    assert!(segmenter.push(&[0.1; 16_000]).is_none());
    assert!(!segmenter.is_speaking());
}

#[tokio::test(start_paused = true)]
async fn test_calibration_without_audio_keeps_default() {
    let (tx, _rx) = broadcast::channel::<Arc<[f32]>>(16);
    let feed = AudioFeed::from_sender(&tx);

    let threshold = calibrate_ambient_noise(&feed, Duration::from_millis(500))
        .await
        .unwrap();
    assert!((threshold - ENERGY_THRESHOLD).abs() < f32::EPSILON);
    drop(tx);
}
