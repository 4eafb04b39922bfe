use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use strum::{Display, EnumString};
use tokio::{fs, io::AsyncWriteExt, process};

use crate::errors::ConversionError;

/// Whether the converted video keeps its audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AudioMode {
    Audio,
    NoAudio,
}

impl AudioMode {
    fn file_suffix(self) -> &'static str {
        match self {
            AudioMode::Audio => "",
            AudioMode::NoAudio => "_noaudio",
        }
    }
}

/// Deterministic output location for a source: `<dir>/<hash><suffix>.mp4`
pub fn output_path(dir: &Path, content_hash: &str, mode: AudioMode) -> PathBuf {
    dir.join(format!("{}{}.mp4", content_hash, mode.file_suffix()))
}

/// Out-of-process conversion of fetched media into an mp4 file
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: Vec<u8>,
        output: &Path,
        mode: AudioMode,
    ) -> Result<(), ConversionError>;
}

/// Runs ffmpeg with the source piped through stdin
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: Vec<u8>,
        output: &Path,
        mode: AudioMode,
    ) -> Result<(), ConversionError> {
        let mut cmd = process::Command::new(&self.program);
        cmd.args(["-y", "-i", "pipe:0"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            // Even dimensions are required by yuv420p
            .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"]);

        match mode {
            AudioMode::Audio => cmd.args(["-c:a", "aac"]),
            AudioMode::NoAudio => cmd.arg("-an"),
        };

        cmd.args(["-movflags", "+faststart"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ConversionError::transcode_failed(format!("failed to spawn {}: {}", self.program, e))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConversionError::transcode_failed("transcoder stdin unavailable"))?;

        let writer = tokio::spawn(async move {
            // The transcoder may exit before consuming all input; its exit status decides
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let result = child.wait_with_output().await.map_err(|e| {
            ConversionError::transcode_failed(format!("waiting for {}: {}", self.program, e))
        })?;
        let _ = writer.await;

        if !result.status.success() {
            return Err(ConversionError::transcode_failed(format!(
                "{} exited with {} - stderr: {}",
                self.program,
                result.status,
                String::from_utf8_lossy(&result.stderr)
            )));
        }

        if !fs::try_exists(output).await.unwrap_or(false) {
            return Err(ConversionError::transcode_failed(format!(
                "{} produced no file at {}",
                self.program,
                output.display()
            )));
        }

        Ok(())
    }
}
