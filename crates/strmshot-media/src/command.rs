//! FFmpeg command builder and runner.
//!
//! Commands are always built as an argument vector and handed to the
//! process directly; nothing is ever passed through a shell, so file names
//! and URLs cannot inject extra arguments.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Protocols ffmpeg and ffprobe may open for a remote input. Keeps a hostile
/// server from bouncing the demuxer into `file:` or `concat:` sources.
pub const REMOTE_PROTOCOLS: &str = "http,https,tcp,tls";

/// Whether `input` is fetched over the network rather than read from disk.
pub fn is_remote_input(input: &str) -> bool {
    let lower = input.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Input options applied to every remote input.
pub fn remote_input_args() -> [String; 2] {
    ["-protocol_whitelist".to_string(), REMOTE_PROTOCOLS.to_string()]
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or URL
    input: String,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command. `input` may be a local path or a URL.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_string_lossy().to_string(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Restrict the protocols a remote input may open. No-op for local files.
    pub fn restrict_protocols(mut self) -> Self {
        if is_remote_input(&self.input) {
            self.input_args.extend(remote_input_args());
        }
        self
    }

    /// Set seek position (before input, fast keyframe seek).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Set the MJPEG quality scale (2 best, 31 worst).
    pub fn jpeg_quality(self, qscale: u8) -> Self {
        self.output_arg("-q:v").output_arg(qscale.clamp(2, 31).to_string())
    }

    /// Force the output muxer.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Refuse to overwrite an existing output.
    pub fn no_overwrite(mut self) -> Self {
        self.overwrite = false;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Output path this command writes.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push(if self.overwrite { "-y" } else { "-n" }.to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Never wait for keyboard input
        args.push("-nostdin".to_string());

        args.extend(self.input_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with a hard timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout for the whole process
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let ffmpeg = check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let stderr_task = tokio::spawn(read_tail(stderr, STDERR_TAIL_LINES));

        let result = self.wait_for_completion(&mut child).await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        match result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                status.code(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Wait for child process, killing it when the timeout elapses.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<std::process::ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!("FFmpeg timed out after {:?}, killing process", timeout);
                let _ = child.kill().await;
                Err(MediaError::timeout("frame extraction", timeout))
            }
        }
    }
}

/// Collect the last `max_lines` lines of a child's output stream.
pub(crate) async fn read_tail<R>(stream: R, max_lines: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut tail = std::collections::VecDeque::with_capacity(max_lines);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("https://cdn.example.com/movie.mkv", "/out/movie-thumb.jpg")
            .seek(60.0)
            .single_frame()
            .jpeg_quality(4)
            .format("image2");

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        assert!(args.contains(&"-nostdin".to_string()));

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i, "seek must come before the input for fast seeking");
        assert_eq!(args[ss + 1], "60.000");
        assert_eq!(args[i + 1], "https://cdn.example.com/movie.mkv");
        assert_eq!(args.last().unwrap(), "/out/movie-thumb.jpg");
    }

    #[test]
    fn test_hostile_names_stay_single_arguments() {
        let input = "/media/a; rm -rf ~ $(reboot).strm";
        let cmd = FfmpegCommand::new(input, "/out/x.jpg");
        let args = cmd.build_args();
        assert!(args.contains(&input.to_string()));
    }

    #[test]
    fn test_no_overwrite_and_quality_clamp() {
        let args = FfmpegCommand::new("in.mp4", "out.jpg")
            .no_overwrite()
            .jpeg_quality(99)
            .build_args();
        assert_eq!(args[0], "-n");
        let q = args.iter().position(|a| a == "-q:v").unwrap();
        assert_eq!(args[q + 1], "31");
    }

    #[test]
    fn test_restrict_protocols_only_for_remote_inputs() {
        let args = FfmpegCommand::new("https://cdn.example.com/movie.mkv", "/out/x.jpg")
            .restrict_protocols()
            .build_args();
        let w = args.iter().position(|a| a == "-protocol_whitelist").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(w < i);
        assert_eq!(args[w + 1], "http,https,tcp,tls");

        let local = FfmpegCommand::new("/work/sample.bin", "/out/x.jpg")
            .restrict_protocols()
            .build_args();
        assert!(!local.contains(&"-protocol_whitelist".to_string()));
    }

    #[test]
    fn test_is_remote_input() {
        assert!(is_remote_input("https://cdn.example.com/a.mkv"));
        assert!(is_remote_input("HTTP://cdn.example.com/a.mkv"));
        assert!(!is_remote_input("/work/sample.bin"));
        assert!(!is_remote_input("file:///etc/passwd"));
    }

    #[tokio::test]
    async fn test_read_tail_keeps_last_lines() {
        let data: &[u8] = b"one\ntwo\nthree\nfour\n";
        let tail = read_tail(data, 2).await;
        assert_eq!(tail, "three\nfour");
    }
}
