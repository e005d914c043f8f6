use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use realfft::RealFftPlanner;
use realfft::num_complex::Complex32;

use crate::error::{ModelError, Result};

const FRAME_LEN: usize = 2048;
const HOP_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseLevel {
    Unknown,
    VeryClean,
    Clean,
    LightNoise,
    ModerateNoise,
    HeavyNoise,
}

impl NoiseLevel {
    pub fn from_snr(snr: Option<f64>) -> Self {
        match snr {
            None => Self::Unknown,
            Some(snr) if snr > 20.0 => Self::VeryClean,
            Some(snr) if snr > 15.0 => Self::Clean,
            Some(snr) if snr > 10.0 => Self::LightNoise,
            Some(snr) if snr > 5.0 => Self::ModerateNoise,
            Some(_) => Self::HeavyNoise,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::VeryClean => "VERY_CLEAN",
            Self::Clean => "CLEAN",
            Self::LightNoise => "LIGHT_NOISE",
            Self::ModerateNoise => "MODERATE_NOISE",
            Self::HeavyNoise => "HEAVY_NOISE",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QualityInfo {
    pub snr: f64,
    pub level: NoiseLevel,
    pub need_denoise: bool,
}

fn read_samples(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };
    if samples.is_empty() {
        return Err(ModelError::Empty);
    }
    Ok((samples, spec.sample_rate))
}

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            0.5 * (1.0 - ((2.0 * std::f32::consts::PI * i as f32) / (len - 1) as f32).cos())
        })
        .collect()
}

/// Power spectrogram: one Vec<f32> of `FRAME_LEN/2+1` bins per hop-spaced frame.
fn power_spectrogram(samples: &[f32]) -> Vec<Vec<f32>> {
    let window = hann_window(FRAME_LEN);
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_LEN);

    let mut frames = Vec::new();
    let mut start = 0;
    while start + FRAME_LEN <= samples.len().max(FRAME_LEN) {
        if start + FRAME_LEN > samples.len() {
            break;
        }
        let mut buf: Vec<f32> = samples[start..start + FRAME_LEN]
            .iter()
            .zip(&window)
            .map(|(s, w)| s * w)
            .collect();
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut buf, &mut spectrum).expect("fft size matches plan");

        let power: Vec<f32> = spectrum.iter().map(|c: &Complex32| c.norm_sqr()).collect();
        frames.push(power);

        start += HOP_LEN;
    }

    if frames.is_empty() && samples.len() >= FRAME_LEN / 4 {
        // Shorter-than-one-frame clips still get a single padded frame.
        let mut padded = samples.to_vec();
        padded.resize(FRAME_LEN, 0.0);
        let mut buf: Vec<f32> = padded.iter().zip(&window).map(|(s, w)| s * w).collect();
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut buf, &mut spectrum).expect("fft size matches plan");
        frames.push(spectrum.iter().map(|c: &Complex32| c.norm_sqr()).collect());
    }

    frames
}

fn percentile(sorted: &[f32], pct: f64) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn median(sorted: &[f32]) -> f32 {
    percentile(sorted, 50.0)
}

/// Per-bin 10th-percentile noise floor vs. median signal estimate across frames,
/// averaged over bins whose SNR exceeds -20dB.
pub fn estimate_snr_spectral(samples: &[f32]) -> f64 {
    let frames = power_spectrogram(samples);
    if frames.is_empty() {
        return 0.0;
    }

    let num_bins = frames[0].len();
    let mut snr_values = Vec::with_capacity(num_bins);

    for bin in 0..num_bins {
        let mut values: Vec<f32> = frames.iter().map(|frame| frame[bin]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let noise_floor = percentile(&values, 10.0);
        let signal_estimate = median(&values);
        let snr_db = 10.0 * ((signal_estimate as f64) / (noise_floor as f64 + 1e-10)).log10();
        if snr_db > -20.0 {
            snr_values.push(snr_db);
        }
    }

    if snr_values.is_empty() {
        return 0.0;
    }
    snr_values.iter().sum::<f64>() / snr_values.len() as f64
}

pub fn check_audio_quality(path: &Path) -> Result<QualityInfo> {
    let (samples, _sample_rate) = read_samples(path)?;
    let snr = estimate_snr_spectral(&samples);
    let level = NoiseLevel::from_snr(Some(snr));
    let need_denoise = !matches!(
        level,
        NoiseLevel::VeryClean | NoiseLevel::Clean | NoiseLevel::LightNoise
    );

    Ok(QualityInfo {
        snr,
        level,
        need_denoise,
    })
}

/// Spectral-gate denoise: per bin, estimate the noise floor from the 10th
/// percentile magnitude across frames and attenuate bins near or below it.
pub fn denoise(input: &Path, output: &Path) -> Result<()> {
    let mut reader = WavReader::open(input)?;
    let spec = reader.spec();
    let (samples, _sample_rate) = read_samples(input)?;
    drop(reader);

    let window = hann_window(FRAME_LEN);
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_LEN);
    let ifft = planner.plan_fft_inverse(FRAME_LEN);

    let frames = power_spectrogram(&samples);
    let noise_floor: Vec<f32> = match frames.first() {
        Some(first) => (0..first.len())
            .map(|bin| {
                let mut values: Vec<f32> = frames.iter().map(|f| f[bin].sqrt()).collect();
                values.sort_by(|a, b| a.partial_cmp(b).unwrap());
                percentile(&values, 10.0)
            })
            .collect(),
        None => Vec::new(),
    };

    let mut output_samples = vec![0.0f32; samples.len().max(FRAME_LEN)];
    let mut weight = vec![0.0f32; output_samples.len()];

    let mut start = 0;
    while start + FRAME_LEN <= samples.len() {
        let mut buf: Vec<f32> = samples[start..start + FRAME_LEN]
            .iter()
            .zip(&window)
            .map(|(s, w)| s * w)
            .collect();
        let mut spectrum = fft.make_output_vec();
        fft.process(&mut buf, &mut spectrum).expect("fft size matches plan");

        for (bin, value) in spectrum.iter_mut().enumerate() {
            let floor = noise_floor.get(bin).copied().unwrap_or(0.0);
            let mag = value.norm();
            if mag <= floor * 1.5 {
                *value *= 0.15;
            }
        }

        let mut restored = ifft.make_output_vec();
        ifft.process(&mut spectrum, &mut restored).expect("ifft size matches plan");
        let norm = 1.0 / FRAME_LEN as f32;

        for (i, sample) in restored.iter().enumerate() {
            output_samples[start + i] += sample * norm * window[i];
            weight[start + i] += window[i] * window[i];
        }

        start += HOP_LEN;
    }

    for (sample, w) in output_samples.iter_mut().zip(weight.iter()) {
        if *w > 1e-6 {
            *sample /= w;
        }
    }
    output_samples.truncate(samples.len());

    let out_spec = WavSpec {
        channels: 1,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output, out_spec)?;
    for sample in output_samples {
        let clamped = (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32);
        writer.write_sample(clamped as i16)?;
    }
    writer.finalize()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_level_thresholds_match_original_mapping() {
        assert_eq!(NoiseLevel::from_snr(Some(25.0)), NoiseLevel::VeryClean);
        assert_eq!(NoiseLevel::from_snr(Some(17.0)), NoiseLevel::Clean);
        assert_eq!(NoiseLevel::from_snr(Some(12.0)), NoiseLevel::LightNoise);
        assert_eq!(NoiseLevel::from_snr(Some(7.0)), NoiseLevel::ModerateNoise);
        assert_eq!(NoiseLevel::from_snr(Some(1.0)), NoiseLevel::HeavyNoise);
        assert_eq!(NoiseLevel::from_snr(None), NoiseLevel::Unknown);
    }

    #[test]
    fn clean_tone_has_high_snr() {
        let sr = 16000usize;
        let samples: Vec<f32> = (0..sr * 2)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let snr = estimate_snr_spectral(&samples);
        assert!(snr > 10.0, "expected a clean tone to have high SNR, got {snr}");
    }
}
