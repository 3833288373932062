//! FFprobe duration probing.
//!
//! Inputs may be remote URLs or local sample files; ffprobe handles both.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::command::{check_ffprobe, is_remote_input, remote_input_args};
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the duration of `input` in seconds.
///
/// The process is killed if it has not finished within `timeout`.
pub async fn probe_duration(input: &str, timeout: Duration) -> MediaResult<f64> {
    let ffprobe = check_ffprobe()?;

    debug!(input = %input, "Probing duration");

    let child = Command::new(ffprobe)
        .args(probe_args(input))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // Dropping the future on timeout drops the child, which kills it
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| MediaError::timeout("duration probe", timeout))??;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            "FFprobe failed",
            Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        ));
    }

    parse_duration(&output.stdout)
}

/// Build the ffprobe argument vector for `input`.
pub fn probe_args(input: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-v", "error", "-show_entries", "format=duration", "-of", "json"]
        .iter()
        .map(|a| a.to_string())
        .collect();
    if is_remote_input(input) {
        args.extend(remote_input_args());
    }
    args.push(input.to_string());
    args
}

/// Extract a positive, finite duration from ffprobe JSON output.
pub fn parse_duration(stdout: &[u8]) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let raw = probe
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| MediaError::InvalidVideo("no duration reported".to_string()))?;

    let duration: f64 = raw
        .trim()
        .parse()
        .map_err(|_| MediaError::InvalidVideo(format!("unparsable duration '{}'", raw)))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaError::InvalidVideo(format!(
            "non-positive duration {}",
            duration
        )));
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_args_restrict_remote_protocols() {
        let args = probe_args("https://cdn.example.com/a.mkv");
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-protocol_whitelist" && w[1] == "http,https,tcp,tls"));
        assert_eq!(args.last().unwrap(), "https://cdn.example.com/a.mkv");

        let local = probe_args("/work/sample.bin");
        assert!(!local.contains(&"-protocol_whitelist".to_string()));
    }

    #[test]
    fn test_parse_duration() {
        let out = br#"{"format": {"duration": "7265.120000"}}"#;
        assert!((parse_duration(out).unwrap() - 7265.12).abs() < 1e-6);
    }

    #[test]
    fn test_parse_duration_rejects_bad_values() {
        assert!(parse_duration(br#"{"format": {"duration": "N/A"}}"#).is_err());
        assert!(parse_duration(br#"{"format": {"duration": "0.0"}}"#).is_err());
        assert!(parse_duration(br#"{"format": {"duration": "-4"}}"#).is_err());
        assert!(parse_duration(br#"{"format": {"duration": "nan"}}"#).is_err());
        assert!(parse_duration(br#"{"format": {}}"#).is_err());
        assert!(parse_duration(br#"{}"#).is_err());
        assert!(matches!(
            parse_duration(b"not json"),
            Err(MediaError::JsonParse(_))
        ));
    }
}
