use crate::config::NodeSourceConfig;
use std::fs;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("could not write cache file: {0}")]
    Cache(#[from] std::io::Error),
}

/// Single GET of the node document. No retries.
pub async fn fetch(uri: &str) -> Result<Vec<u8>, FetchError> {
    let response = reqwest::get(uri).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let body = response.bytes().await?;
    Ok(body.to_vec())
}

/// Download the node document and overwrite the cache file with the raw bytes.
pub async fn refresh_cache(config: &NodeSourceConfig) -> Result<usize, FetchError> {
    info!("Downloading nodes.json from {}", config.uri);
    let body = fetch(&config.uri).await?;

    if let Some(parent) = config.cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&config.cache_path, &body)?;

    info!("Cached {} bytes at {:?}", body.len(), config.cache_path);
    Ok(body.len())
}

/// Refresh the cache, falling back to whatever is already on disk.
/// Returns whether fresh data was written.
pub async fn refresh_or_fallback(config: &NodeSourceConfig) -> bool {
    match refresh_cache(config).await {
        Ok(_) => true,
        Err(e) => {
            warn!("nodes.json download failed: {}", e);
            warn!("Using cached data at {:?} (if available)...", config.cache_path);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Nothing listens on port 1 on the loopback interface.
    const UNREACHABLE: &str = "http://127.0.0.1:1/nodes.json";

    /// Answer exactly one request on a loopback port with a canned response.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/nodes.json")
    }

    #[tokio::test]
    async fn successful_fetch_overwrites_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("nodes.json");
        fs::write(&cache_path, b"stale").unwrap();

        let config = NodeSourceConfig {
            uri: serve_once("200 OK", r#"{"nodes":[]}"#).await,
            cache_path: cache_path.clone(),
        };

        assert_eq!(refresh_cache(&config).await.unwrap(), 12);
        assert_eq!(fs::read(&cache_path).unwrap(), br#"{"nodes":[]}"#);
    }

    #[tokio::test]
    async fn successful_fetch_creates_cache_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeSourceConfig {
            uri: serve_once("200 OK", r#"{"nodes":[{"name":"ac-1","geo":null}]}"#).await,
            cache_path: dir.path().join("data").join("ffac").join("nodes.json"),
        };

        assert!(refresh_or_fallback(&config).await);
        let cached = fs::read_to_string(&config.cache_path).unwrap();
        assert_eq!(cached, r#"{"nodes":[{"name":"ac-1","geo":null}]}"#);
    }

    #[tokio::test]
    async fn error_status_is_reported_and_cache_kept() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("nodes.json");
        fs::write(&cache_path, b"{\"nodes\":[]}").unwrap();

        let config = NodeSourceConfig {
            uri: serve_once("404 Not Found", "not here").await,
            cache_path: cache_path.clone(),
        };

        match refresh_cache(&config).await {
            Err(FetchError::Status(status)) => assert_eq!(status, reqwest::StatusCode::NOT_FOUND),
            other => panic!("expected a status error, got {:?}", other),
        }
        assert_eq!(fs::read(&cache_path).unwrap(), b"{\"nodes\":[]}");
    }

    #[tokio::test]
    async fn error_status_does_not_create_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeSourceConfig {
            uri: serve_once("503 Service Unavailable", "").await,
            cache_path: dir.path().join("nodes.json"),
        };

        assert!(!refresh_or_fallback(&config).await);
        assert!(!config.cache_path.exists());
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let err = fetch(UNREACHABLE).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("nodes.json");
        fs::write(&cache_path, b"{\"nodes\":[]}").unwrap();

        let config = NodeSourceConfig {
            uri: UNREACHABLE.to_string(),
            cache_path: cache_path.clone(),
        };

        assert!(!refresh_or_fallback(&config).await);
        assert_eq!(fs::read(&cache_path).unwrap(), b"{\"nodes\":[]}");
    }

    #[tokio::test]
    async fn failed_fetch_does_not_create_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeSourceConfig {
            uri: UNREACHABLE.to_string(),
            cache_path: dir.path().join("data").join("nodes.json"),
        };

        assert!(refresh_cache(&config).await.is_err());
        assert!(!config.cache_path.exists());
    }
}
