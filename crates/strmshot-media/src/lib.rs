//! FFmpeg CLI wrapper and remote media helpers for thumbnail extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg/FFprobe invocation (argument vectors, never a shell)
//! - Duration probing and single-frame extraction with hard timeouts
//! - HTTP reachability checks and byte-range sample downloads
//! - The URL safety gate (SSRF protection)
//! - `.nfo` sidecar rendering
//! - The [`MediaBackend`] trait the job pipeline is written against

pub mod backend;
pub mod command;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod nfo;
pub mod probe;
pub mod security;
pub mod thumbnail;

pub use backend::{FfmpegBackend, MediaBackend};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use download::{check_reachable, download_sample};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{remove_if_exists, write_atomic};
pub use nfo::{render_sidecar, write_sidecar, SidecarMetadata};
pub use probe::{parse_duration, probe_duration};
pub use security::{ensure_public_host, is_forbidden_ip, validate_media_url};
pub use thumbnail::{generate_thumbnail, validate_thumbnail, FrameSpec};
