//! ffmpeg / ImageMagick subprocess backend

use super::{EncodeInput, EncodeResult, EncodeSpec, VideoEncodingBackend};
use crate::config::EncoderConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Stderr kept in an `EncodeResult`; ffmpeg can be very chatty
const MAX_STDERR_BYTES: usize = 4096;

/// Backend driving the `ffmpeg` and `convert` executables.
///
/// Children are spawned with `kill_on_drop`, so a caller that times out and
/// drops the future also terminates the encoder.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    config: EncoderConfig,
}

impl FfmpegBackend {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Arguments for an encode job, without the binary.
    pub fn encode_args(spec: &EncodeSpec) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];

        let EncodeInput::ColorCard { color } = &spec.input;
        push_all(&mut args, &["-f", "lavfi", "-i"]);
        args.push(
            format!(
                "color=c={}:s={}x{}:d={}",
                color, spec.width, spec.height, spec.duration_secs
            )
            .into(),
        );

        if let Some(text) = spec.overlay_text.as_deref().filter(|t| !t.is_empty()) {
            args.push("-vf".into());
            args.push(
                format!(
                    "drawtext=text='{}':x=(w-tw)/2:y=(h-th)/2:fontsize=24:fontcolor=white",
                    escape_drawtext(text)
                )
                .into(),
            );
        }

        let q = &spec.quality;
        push_all(
            &mut args,
            &[
                "-c:v",
                "libx264",
                "-preset",
                q.preset.as_str(),
                "-tune",
                "fastdecode",
                "-pix_fmt",
                "yuv420p",
                "-profile:v",
                "baseline",
                "-crf",
            ],
        );
        args.push(q.crf.to_string().into());
        args.push("-r".into());
        args.push(spec.frame_rate.to_string().into());
        args.push("-t".into());
        args.push(spec.duration_secs.to_string().into());
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push("-threads".into());
        args.push(q.threads.to_string().into());
        args.push(spec.output_path.as_os_str().to_owned());
        args
    }

    /// Arguments extracting the first frame of `input`.
    pub fn extract_frame_args(input: &Path, output_image: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        push_all(&mut args, &["-vframes", "1", "-f", "image2", "-threads", "1"]);
        args.push(output_image.as_os_str().to_owned());
        args
    }

    /// ImageMagick arguments drawing `text` on a black card.
    ///
    /// `text` is always drawn literally, never read from a file or expanded.
    pub fn render_still_args(
        text: &str,
        width: u32,
        height: u32,
        output_image: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        args.push("-size".into());
        args.push(format!("{}x{}", width, height).into());
        push_all(
            &mut args,
            &[
                "xc:black",
                "-gravity",
                "center",
                "-pointsize",
                "20",
                "-fill",
                "white",
                "-annotate",
                "0",
            ],
        );
        args.push(escape_annotate(text).into());
        args.push(output_image.as_os_str().to_owned());
        args
    }

    async fn run(&self, binary: &str, args: Vec<OsString>) -> EncodeResult {
        tracing::debug!(binary = binary, args = ?args, "Spawning encoder process");

        let output = Command::new(binary)
            .args(&args)
            .env("MALLOC_ARENA_MAX", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let stderr = truncate_stderr(&output.stderr);
                if output.status.success() {
                    EncodeResult {
                        success: true,
                        stderr,
                    }
                } else {
                    tracing::debug!(
                        binary = binary,
                        status = ?output.status.code(),
                        "Encoder process failed"
                    );
                    EncodeResult::failed(stderr)
                }
            }
            Err(e) => EncodeResult::failed(format!("Failed to spawn {}: {}", binary, e)),
        }
    }
}

#[async_trait]
impl VideoEncodingBackend for FfmpegBackend {
    async fn encode(&self, spec: &EncodeSpec) -> EncodeResult {
        let args = Self::encode_args(spec);
        self.run(&self.config.ffmpeg_binary, args).await
    }

    async fn extract_frame(&self, input: &Path, output_image: &Path) -> bool {
        let args = Self::extract_frame_args(input, output_image);
        let result = self.run(&self.config.ffmpeg_binary, args).await;
        if !result.success {
            tracing::debug!(
                input = %input.display(),
                stderr = %result.stderr,
                "Frame extraction failed"
            );
        }
        result.success && non_empty_file(output_image)
    }

    async fn render_still(
        &self,
        text: &str,
        width: u32,
        height: u32,
        output_image: &Path,
    ) -> bool {
        let args = Self::render_still_args(text, width, height, output_image);
        let result = self.run(&self.config.convert_binary, args).await;
        result.success && non_empty_file(output_image)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Resolve an executable name against `PATH`; absolute or relative paths
/// are checked directly.
pub fn resolve_binary(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

fn push_all(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(|s| OsString::from(*s)));
}

fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | '%' | ',') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// ImageMagick reads `-annotate` text from a file when it starts with `@`
/// and expands `%` escapes anywhere in it.
fn escape_annotate(text: &str) -> String {
    text.trim_start_matches('@').replace('%', "%%")
}

fn truncate_stderr(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.len() <= MAX_STDERR_BYTES {
        return text.to_string();
    }
    let mut end = MAX_STDERR_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

fn non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
