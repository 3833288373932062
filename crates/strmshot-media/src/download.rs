//! Remote media HTTP helpers.
//!
//! - A cheap reachability check (HEAD, falling back to a one-byte ranged GET
//!   for servers that reject HEAD).
//! - A byte-range sample download used when ffprobe cannot read the remote
//!   resource directly.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};

fn map_request_error(url: &Url, operation: &'static str, timeout: Duration, e: reqwest::Error) -> MediaError {
    if e.is_timeout() {
        MediaError::timeout(operation, timeout)
    } else {
        MediaError::unreachable(url.as_str(), e.to_string())
    }
}

/// Verify the remote resource exists.
///
/// Any 2xx (or 206) answer counts as reachable. Servers answering HEAD with
/// 405 or 501 are retried with `GET` and `Range: bytes=0-0`.
pub async fn check_reachable(client: &Client, url: &Url, timeout: Duration) -> MediaResult<()> {
    let response = client
        .head(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_request_error(url, "reachability check", timeout, e))?;

    let status = response.status();
    let status = if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
        debug!(url = %url, status = %status, "HEAD rejected, retrying with ranged GET");
        client
            .get(url.clone())
            .header(RANGE, "bytes=0-0")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error(url, "reachability check", timeout, e))?
            .status()
    } else {
        status
    };

    if status.is_success() {
        Ok(())
    } else {
        Err(MediaError::unreachable(
            url.as_str(),
            format!("server answered {}", status),
        ))
    }
}

/// Download at most `max_bytes` from the start of `url` into `dest`.
///
/// Returns the number of bytes written. Servers that ignore the `Range`
/// header are cut off after `max_bytes`.
pub async fn download_sample(
    client: &Client,
    url: &Url,
    dest: &Path,
    max_bytes: u64,
    timeout: Duration,
) -> MediaResult<u64> {
    let work = async {
        let response = client
            .get(url.clone())
            .header(RANGE, format!("bytes=0-{}", max_bytes.saturating_sub(1)))
            .send()
            .await
            .map_err(|e| map_request_error(url, "sample download", timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!(
                "sample request answered {}",
                status
            )));
        }

        let mut file = File::create(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MediaError::download_failed(e.to_string()))?;
            let remaining = max_bytes - written;
            let take = (chunk.len() as u64).min(remaining) as usize;
            file.write_all(&chunk[..take]).await?;
            written += take as u64;
            if written >= max_bytes {
                break;
            }
        }

        file.flush().await?;
        Ok(written)
    };

    let written = tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| MediaError::timeout("sample download", timeout))??;

    if written == 0 {
        warn!(url = %url, "Sample download returned no data");
        return Err(MediaError::download_failed("sample download returned no data"));
    }

    debug!(url = %url, bytes = written, "Downloaded sample");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn test_reachable_head_ok() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/movie.mkv"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        check_reachable(&client, &url(&server, "/movie.mkv"), Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reachable_falls_back_to_ranged_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=0-0"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0u8]))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new();
        check_reachable(&client, &url(&server, "/movie.mkv"), Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let err = check_reachable(&client, &url(&server, "/gone.mkv"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Unreachable { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_reachability_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = Client::new();
        let err = check_reachable(&client, &url(&server, "/slow.mkv"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_download_sample_caps_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movie.mkv"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 10_000]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("sample.bin");
        let client = Client::new();

        let written = download_sample(
            &client,
            &url(&server, "/movie.mkv"),
            &dest,
            4096,
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_download_sample_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let client = Client::new();
        let err = download_sample(
            &client,
            &url(&server, "/movie.mkv"),
            &dir.path().join("s.bin"),
            1024,
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }
}
