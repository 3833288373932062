//! End-to-end tests against real ffmpeg/ffprobe binaries.

use std::time::Duration;

use strmshot_media::{
    check_ffmpeg, generate_thumbnail, probe_duration, validate_thumbnail, FfmpegCommand,
    FfmpegRunner, FrameSpec,
};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(60);

/// Render a short synthetic clip with ffmpeg's built-in test source.
async fn synthetic_clip(dir: &TempDir, seconds: u32) -> String {
    let output = dir.path().join("clip.mkv");
    let cmd = FfmpegCommand::new(
        format!("testsrc=duration={}:size=640x360:rate=10", seconds),
        &output,
    )
    .input_arg("-f")
    .input_arg("lavfi")
    .output_arg("-c:v")
    .output_arg("mpeg4");

    FfmpegRunner::new()
        .with_timeout(TIMEOUT)
        .run(&cmd)
        .await
        .expect("Failed to render synthetic clip");
    output.to_string_lossy().to_string()
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_probe_synthetic_clip() {
    check_ffmpeg().expect("ffmpeg not installed");
    let dir = TempDir::new().unwrap();
    let clip = synthetic_clip(&dir, 4).await;

    let duration = probe_duration(&clip, TIMEOUT).await.unwrap();
    assert!((duration - 4.0).abs() < 0.5, "unexpected duration {}", duration);
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_extract_scaled_frame() {
    check_ffmpeg().expect("ffmpeg not installed");
    let dir = TempDir::new().unwrap();
    let clip = synthetic_clip(&dir, 4).await;
    let thumb = dir.path().join("out/clip-thumb.jpg");

    let spec = FrameSpec {
        offset: 2.0,
        max_width: 320,
        max_height: 320,
        qscale: 4,
    };
    generate_thumbnail(&clip, &thumb, &spec, TIMEOUT).await.unwrap();

    let size = validate_thumbnail(&thumb, 512).await.unwrap();
    assert!(size >= 512);
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe"]
async fn test_probe_garbage_fails() {
    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("bogus.mkv");
    std::fs::write(&bogus, b"definitely not a video").unwrap();

    assert!(probe_duration(&bogus.to_string_lossy(), TIMEOUT).await.is_err());
}
