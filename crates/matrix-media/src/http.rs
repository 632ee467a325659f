use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{FetchError, MediaFetcher, MediaSource, MxcUri};

/// Homeserver connection settings used for media downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeserverConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    /// Use the authenticated client media API instead of the legacy one.
    pub authenticated_media: bool,
    pub request_timeout_secs: u64,
}

impl Default for HomeserverConfig {
    fn default() -> Self {
        Self {
            base_url: "https://matrix.allgram.me".to_string(),
            access_token: None,
            authenticated_media: true,
            request_timeout_secs: 30,
        }
    }
}

/// Fetches media from a homeserver over HTTP.
pub struct HttpMediaFetcher {
    client: Client,
    config: HomeserverConfig,
}

impl HttpMediaFetcher {
    pub fn new(config: HomeserverConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn download(&self, uri: &MxcUri) -> Result<Vec<u8>, FetchError> {
        let url = uri.download_url(&self.config.base_url, self.config.authenticated_media);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let res = request.send().await.map_err(map_request_error)?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let message = res.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, message });
        }

        let bytes = res.bytes().await.map_err(map_request_error)?;
        debug!("downloaded {} ({} bytes)", uri, bytes.len());
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(
        &self,
        source: &MediaSource,
        destination: &Path,
    ) -> Result<PathBuf, FetchError> {
        let uri = MxcUri::parse(source.content_uri())?;
        let body = self.download(&uri).await?;

        let plaintext = match source {
            MediaSource::Plain { .. } => body,
            MediaSource::Encrypted(file) => file.decrypt(&body)?,
        };

        tokio::fs::write(destination, &plaintext).await?;
        Ok(destination.to_path_buf())
    }
}

fn map_request_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::TimedOut
    } else {
        FetchError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecryptError, EncryptedFile, JsonWebKey};
    use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
    use base64::Engine;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response and return the base url.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
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
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fetcher(base_url: String) -> HttpMediaFetcher {
        HttpMediaFetcher::new(HomeserverConfig {
            base_url,
            access_token: Some("secret".to_string()),
            authenticated_media: true,
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn writes_plain_media_to_destination() {
        let base = serve_once("200 OK", b"RIFF plain voice".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.wav");
        let source = MediaSource::Plain {
            url: "mxc://example.org/voice".to_string(),
        };

        let path = fetcher(base).fetch(&source, &dest).await.unwrap();
        assert_eq!(path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"RIFF plain voice");
    }

    #[tokio::test]
    async fn surfaces_http_status() {
        let base = serve_once("404 Not Found", b"{\"errcode\":\"M_NOT_FOUND\"}".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let source = MediaSource::Plain {
            url: "mxc://example.org/missing".to_string(),
        };

        let err = fetcher(base)
            .fetch(&source, &dir.path().join("missing.ogg"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn corrupted_encrypted_media_is_not_written() {
        let base = serve_once("200 OK", b"not the uploaded ciphertext".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("voice.ogg");
        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_string(), STANDARD_NO_PAD.encode([9u8; 32]));
        let source = MediaSource::Encrypted(Box::new(EncryptedFile {
            url: "mxc://example.org/encrypted".to_string(),
            key: JsonWebKey {
                kty: "oct".to_string(),
                key_ops: vec!["decrypt".to_string()],
                alg: "A256CTR".to_string(),
                k: URL_SAFE_NO_PAD.encode([3u8; 32]),
                ext: true,
            },
            iv: STANDARD_NO_PAD.encode([0u8; 16]),
            hashes,
            v: "v2".to_string(),
        }));

        let err = fetcher(base).fetch(&source, &dest).await.unwrap_err();
        assert_eq!(err, FetchError::Decrypt(DecryptError::HashMismatch));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn invalid_content_uri_fails_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let source = MediaSource::Plain {
            url: "https://example.org/voice".to_string(),
        };
        let err = fetcher("http://127.0.0.1:9".to_string())
            .fetch(&source, &dir.path().join("voice.ogg"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUri(_)));
    }
}
