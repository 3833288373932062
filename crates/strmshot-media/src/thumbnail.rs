//! Thumbnail generation.

use std::path::Path;
use std::time::Duration;

use tokio::fs;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Parameters for extracting one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    /// Seek offset in seconds
    pub offset: f64,
    /// Maximum output width in pixels
    pub max_width: u32,
    /// Maximum output height in pixels
    pub max_height: u32,
    /// MJPEG quality scale (2 best, 31 worst)
    pub qscale: u8,
}

impl FrameSpec {
    /// Scale filter that only ever shrinks, preserving aspect ratio.
    pub fn scale_filter(&self) -> String {
        format!(
            "scale='min({w},iw)':'min({h},ih)':force_original_aspect_ratio=decrease",
            w = self.max_width,
            h = self.max_height
        )
    }
}

/// Build the ffmpeg command that writes one JPEG frame of `input`.
pub fn thumbnail_command(input: &str, output_path: &Path, spec: &FrameSpec) -> FfmpegCommand {
    FfmpegCommand::new(input, output_path)
        .restrict_protocols()
        .seek(spec.offset)
        .single_frame()
        .video_filter(spec.scale_filter())
        .jpeg_quality(spec.qscale)
        .format("image2")
        .log_level("error")
}

/// Generate a thumbnail from a video file or URL.
pub async fn generate_thumbnail(
    input: &str,
    output_path: impl AsRef<Path>,
    spec: &FrameSpec,
    timeout: Duration,
) -> MediaResult<()> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let cmd = thumbnail_command(input, output_path, spec);
    FfmpegRunner::new().with_timeout(timeout).run(&cmd).await
}

/// Check that a produced thumbnail is at least `min_bytes` long.
///
/// Returns the file size on success.
pub async fn validate_thumbnail(path: impl AsRef<Path>, min_bytes: u64) -> MediaResult<u64> {
    let path = path.as_ref();

    let size = match fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if size < min_bytes {
        return Err(MediaError::OutputTooSmall {
            path: path.to_path_buf(),
            size,
            min: min_bytes,
        });
    }

    Ok(size)
}
