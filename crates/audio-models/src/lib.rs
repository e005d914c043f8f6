mod error;
mod ports;
mod quality;

pub use error::{ModelError, Result};
pub use ports::{
    Diarizer, Enhancer, LanguageDetector, PlaceholderDiarizer, PlaceholderLanguageDetector,
    PlaceholderRecognizer, SpeechRecognizer, SpectralGateEnhancer,
};
pub use quality::{NoiseLevel, QualityInfo, check_audio_quality, denoise, estimate_snr_spectral};
