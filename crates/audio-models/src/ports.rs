use std::path::Path;

use async_trait::async_trait;

use audio_align::SpeakerTurn;
use audio_schemas::TranscriptWord;

use crate::error::Result;
use crate::quality::{QualityInfo, check_audio_quality, denoise};

/// A local audio file in, structured diarization turns out. The model itself —
/// speaker diarization — is an external collaborator; this trait is the seam.
#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<SpeakerTurn>>;
}

/// A local audio file in, a BCP-47 language tag (or none) out.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(&self, audio_path: &Path) -> Result<Option<String>>;
}

/// A local audio file plus an optional language hint in, a word list out.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<Vec<TranscriptWord>>;
}

/// SNR triage and denoise. Unlike the other three ports, this one has a real,
/// non-ML implementation (`SpectralGateEnhancer`) because spectral gating is
/// signal processing, not a learned model.
#[async_trait]
pub trait Enhancer: Send + Sync {
    async fn quality(&self, audio_path: &Path) -> Result<QualityInfo>;
    async fn denoise(&self, input: &Path, output: &Path) -> Result<()>;
}

pub struct SpectralGateEnhancer;

#[async_trait]
impl Enhancer for SpectralGateEnhancer {
    async fn quality(&self, audio_path: &Path) -> Result<QualityInfo> {
        let audio_path = audio_path.to_path_buf();
        tokio::task::spawn_blocking(move || check_audio_quality(&audio_path))
            .await
            .expect("quality check task panicked")
    }

    async fn denoise(&self, input: &Path, output: &Path) -> Result<()> {
        let input = input.to_path_buf();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || denoise(&input, &output))
            .await
            .expect("denoise task panicked")
    }
}

/// Attributes the whole file to a single unidentified speaker. A real diarizer
/// is an external ML collaborator; this keeps the worker wiring exercisable
/// without one.
pub struct PlaceholderDiarizer;

#[async_trait]
impl Diarizer for PlaceholderDiarizer {
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<SpeakerTurn>> {
        let mut reader = hound::WavReader::open(audio_path)?;
        let spec = reader.spec();
        let duration = reader.duration() as f64 / spec.sample_rate as f64;

        Ok(vec![SpeakerTurn {
            speaker: "SPEAKER_00".to_string(),
            start: 0.0,
            end: duration,
        }])
    }
}

pub struct PlaceholderLanguageDetector;

#[async_trait]
impl LanguageDetector for PlaceholderLanguageDetector {
    async fn detect(&self, _audio_path: &Path) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Returns no words. A real recognizer is an external ML collaborator; callers
/// exercising the pipeline end-to-end without one get an empty transcript
/// rather than a crash.
pub struct PlaceholderRecognizer;

#[async_trait]
impl SpeechRecognizer for PlaceholderRecognizer {
    async fn recognize(
        &self,
        _audio_path: &Path,
        _language: Option<&str>,
    ) -> Result<Vec<TranscriptWord>> {
        Ok(Vec::new())
    }
}
