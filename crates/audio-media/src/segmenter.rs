use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{MediaError, Result};

const MAX_DURATION_MS: u64 = 60_000;
const MIN_SILENCE_LEN_FLOOR_MS: u64 = 200;
const PAD_MS: u64 = 200;
const DEFAULT_MIN_SILENCE_LEN_MS: u64 = 700;
const DEFAULT_SILENCE_THRESH_DB: f64 = -40.0;
/// Resolution at which dBFS is sampled; matches the coarsest granularity the
/// gap/silence thresholds below still resolve meaningfully.
const WINDOW_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMeta {
    pub index: u32,
    pub local_path: PathBuf,
    pub start_ms: u64,
    pub end_ms: u64,
}

struct Wav {
    samples: Vec<i16>,
    sample_rate: u32,
}

fn read_wav(path: &Path) -> Result<Wav> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;

    let samples: Vec<i16> = match spec.sample_format {
        SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as i16))
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>()?,
    };

    if samples.is_empty() {
        return Err(MediaError::Empty);
    }

    Ok(Wav {
        samples,
        sample_rate,
    })
}

fn window_dbfs(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * (rms / i16::MAX as f64).log10()
    }
}

/// Non-silent `[start_ms, end_ms)` ranges, at `WINDOW_MS` resolution — the
/// native equivalent of `pydub.silence.detect_nonsilent`.
fn detect_nonsilent(
    samples: &[i16],
    sample_rate: u32,
    min_silence_len_ms: u64,
    silence_thresh_db: f64,
) -> Vec<(u64, u64)> {
    let window_samples = ((sample_rate as u64 * WINDOW_MS) / 1000).max(1) as usize;
    let total_windows = samples.len().div_ceil(window_samples);

    let is_silent: Vec<bool> = (0..total_windows)
        .map(|i| {
            let start = i * window_samples;
            let end = (start + window_samples).min(samples.len());
            window_dbfs(&samples[start..end]) < silence_thresh_db
        })
        .collect();

    let min_silence_windows = (min_silence_len_ms / WINDOW_MS).max(1) as usize;

    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut silence_run = 0usize;

    for (i, &silent) in is_silent.iter().enumerate() {
        if silent {
            silence_run += 1;
            if silence_run >= min_silence_windows {
                if let Some(start) = run_start.take() {
                    ranges.push((start, i + 1 - silence_run));
                }
            }
        } else {
            if run_start.is_none() {
                run_start = Some(i);
            }
            silence_run = 0;
        }
    }
    if let Some(start) = run_start {
        ranges.push((start, total_windows));
    }

    ranges
        .into_iter()
        .map(|(s, e)| (s as u64 * WINDOW_MS, (e as u64 * WINDOW_MS).min(total_duration_ms(samples.len(), sample_rate))))
        .collect()
}

fn total_duration_ms(num_samples: usize, sample_rate: u32) -> u64 {
    (num_samples as u64 * 1000) / sample_rate as u64
}

fn recursive_find_ranges(
    samples: &[i16],
    sample_rate: u32,
    offset_ms: u64,
    min_silence_len_ms: u64,
    silence_thresh_db: f64,
) -> Vec<(u64, u64)> {
    let ranges = detect_nonsilent(samples, sample_rate, min_silence_len_ms, silence_thresh_db);
    if ranges.is_empty() {
        return vec![(offset_ms, offset_ms + total_duration_ms(samples.len(), sample_rate))];
    }

    let mut final_ranges = Vec::new();
    for (start_ms, end_ms) in ranges {
        let duration = end_ms - start_ms;
        let start_sample = ((start_ms * sample_rate as u64) / 1000) as usize;
        let end_sample = (((end_ms * sample_rate as u64) / 1000) as usize).min(samples.len());

        if duration > MAX_DURATION_MS && min_silence_len_ms > MIN_SILENCE_LEN_FLOOR_MS {
            let new_min_silence = (min_silence_len_ms.saturating_sub(150)).max(MIN_SILENCE_LEN_FLOOR_MS);
            let sub = &samples[start_sample..end_sample];
            let sub_ranges = recursive_find_ranges(
                sub,
                sample_rate,
                offset_ms + start_ms,
                new_min_silence,
                silence_thresh_db,
            );
            final_ranges.extend(sub_ranges);
        } else if duration > MAX_DURATION_MS {
            let num_parts = duration.div_ceil(MAX_DURATION_MS);
            for i in 0..num_parts {
                let part_start = offset_ms + start_ms + i * MAX_DURATION_MS;
                let part_end = (offset_ms + start_ms + (i + 1) * MAX_DURATION_MS).min(offset_ms + end_ms);
                final_ranges.push((part_start, part_end));
            }
        } else {
            final_ranges.push((offset_ms + start_ms, offset_ms + end_ms));
        }
    }

    final_ranges
}

/// Splits `input_wav` into non-silent chunks (each ≤ 60s, padded by 200ms on
/// either side), writing `chunk_N.wav` into `output_dir`.
pub fn split_audio_smart(input_wav: &Path, output_dir: &Path) -> Result<Vec<ChunkMeta>> {
    std::fs::create_dir_all(output_dir)?;
    let wav = read_wav(input_wav)?;
    let total_ms = total_duration_ms(wav.samples.len(), wav.sample_rate);

    let ranges = recursive_find_ranges(
        &wav.samples,
        wav.sample_rate,
        0,
        DEFAULT_MIN_SILENCE_LEN_MS,
        DEFAULT_SILENCE_THRESH_DB,
    );

    let mut chunks = Vec::with_capacity(ranges.len());
    for (index, (start_ms, end_ms)) in ranges.into_iter().enumerate() {
        let safe_start = start_ms.saturating_sub(PAD_MS);
        let safe_end = (end_ms + PAD_MS).min(total_ms);

        let start_sample = ((safe_start * wav.sample_rate as u64) / 1000) as usize;
        let end_sample = (((safe_end * wav.sample_rate as u64) / 1000) as usize).min(wav.samples.len());

        let local_path = output_dir.join(format!("chunk_{index}.wav"));
        write_chunk(&local_path, &wav.samples[start_sample..end_sample], wav.sample_rate)?;

        chunks.push(ChunkMeta {
            index: index as u32,
            local_path,
            start_ms: safe_start,
            end_ms: safe_end,
        });
    }

    Ok(chunks)
}

fn write_chunk(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(duration_ms: u64, sample_rate: u32, amplitude: i16) -> Vec<i16> {
        let n = (sample_rate as u64 * duration_ms / 1000) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (amplitude as f64 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as i16
            })
            .collect()
    }

    fn silence(duration_ms: u64, sample_rate: u32) -> Vec<i16> {
        vec![0; (sample_rate as u64 * duration_ms / 1000) as usize]
    }

    #[test]
    fn single_loud_range_with_no_silence_yields_one_range() {
        let sr = 16000;
        let samples = tone(1000, sr, 20000);
        let ranges = detect_nonsilent(&samples, sr, DEFAULT_MIN_SILENCE_LEN_MS, DEFAULT_SILENCE_THRESH_DB);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].0, 0);
    }

    #[test]
    fn silence_gap_splits_into_two_ranges() {
        let sr = 16000;
        let mut samples = tone(500, sr, 20000);
        samples.extend(silence(1000, sr));
        samples.extend(tone(500, sr, 20000));

        let ranges = detect_nonsilent(&samples, sr, DEFAULT_MIN_SILENCE_LEN_MS, DEFAULT_SILENCE_THRESH_DB);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn short_silence_below_floor_does_not_split() {
        let sr = 16000;
        let mut samples = tone(500, sr, 20000);
        samples.extend(silence(100, sr));
        samples.extend(tone(500, sr, 20000));

        let ranges = detect_nonsilent(&samples, sr, DEFAULT_MIN_SILENCE_LEN_MS, DEFAULT_SILENCE_THRESH_DB);
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn long_range_is_split_at_max_duration() {
        let sr = 8000;
        let samples = tone(65_000, sr, 20000);
        let ranges = recursive_find_ranges(&samples, sr, 0, DEFAULT_MIN_SILENCE_LEN_MS, DEFAULT_SILENCE_THRESH_DB);
        assert!(ranges.len() >= 2);
        for (start, end) in &ranges {
            assert!(end - start <= MAX_DURATION_MS);
        }
    }
}
