//! Bounded image download
//!
//! Provider results live at short-lived URLs and user uploads may arrive as
//! data URLs. Both are resolved to raw bytes here, with a hard timeout on
//! network fetches.

use crate::error::{Error, Result};
use base64::Engine;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, warn};
use url::{Host, Url};

/// Default fetch timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Fallback MIME type when the source does not say
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Downloaded image bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Raw bytes
    pub bytes: Vec<u8>,
    /// MIME type
    pub content_type: String,
}

/// HTTP(S) and data URL image fetcher
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    http: reqwest::Client,
    timeout: Duration,
}

impl Default for ImageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }
}

impl ImageFetcher {
    /// Fetcher with the given timeout
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Fetcher reusing an existing HTTP client
    #[must_use]
    pub fn with_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Configured timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `source` to bytes
    pub async fn fetch(&self, source: &str) -> Result<FetchedImage> {
        if source.starts_with("data:") {
            return decode_data_url(source);
        }

        let url = Url::parse(source).map_err(|e| Error::Fetch {
            url: source.to_string(),
            reason: format!("invalid URL: {e}"),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Fetch {
                url: source.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if is_internal_host(&url) {
            warn!(url = %source, "Refusing to fetch internal address");
            return Err(Error::Fetch {
                url: source.to_string(),
                reason: "internal addresses are not allowed".to_string(),
            });
        }

        debug!(url = %source, timeout_secs = self.timeout.as_secs(), "Fetching image");

        let download = async {
            let response = self.http.get(url).send().await?.error_for_status()?;
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((bytes.to_vec(), content_type))
        };

        match tokio::time::timeout(self.timeout, download).await {
            Ok(Ok((bytes, content_type))) => Ok(FetchedImage {
                bytes,
                content_type: content_type
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            }),
            Ok(Err(e)) if e.is_timeout() => Err(self.timeout_error(source)),
            Ok(Err(e)) => {
                warn!(url = %source, error = %e, "Image fetch failed");
                Err(Error::Fetch {
                    url: source.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => Err(self.timeout_error(source)),
        }
    }

    fn timeout_error(&self, source: &str) -> Error {
        warn!(url = %source, "Image fetch timed out");
        Error::FetchTimeout {
            url: source.to_string(),
            secs: self.timeout.as_secs(),
        }
    }
}

/// Loopback, private, link-local and unspecified targets
fn is_internal_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => is_internal_v4(ip),
        Some(Host::Ipv6(ip)) => is_internal_v6(ip),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        None => true,
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64)
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local, fe80::/10 link-local
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || ip.to_ipv4_mapped().is_some_and(is_internal_v4)
}

/// Decode `data:<mime>;base64,<payload>`
pub fn decode_data_url(source: &str) -> Result<FetchedImage> {
    let invalid = |reason: &str| Error::Fetch {
        url: "data URL".to_string(),
        reason: reason.to_string(),
    };

    let rest = source
        .strip_prefix("data:")
        .ok_or_else(|| invalid("missing data: prefix"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing payload separator"))?;
    let (content_type, encoding) = match meta.split_once(';') {
        Some((ct, enc)) => (ct, Some(enc)),
        None => (meta, None),
    };
    if encoding != Some("base64") {
        return Err(invalid("only base64 data URLs are supported"));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| invalid(&format!("invalid base64: {e}")))?;

    Ok(FetchedImage {
        bytes,
        content_type: if content_type.is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            content_type.to_string()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let image = decode_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(&image.bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_decode_data_url_rejects_plain_encoding() {
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(decode_data_url("data:image/png;base64").is_err());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http_schemes() {
        let fetcher = ImageFetcher::default();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("file:///etc/passwd"));
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_names_url() {
        // .invalid never resolves
        let fetcher = ImageFetcher::new(Duration::from_secs(5));
        let err = fetcher
            .fetch("http://unreachable.invalid/missing.png")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Failed to fetch image from http://unreachable.invalid/missing.png"));
    }

    #[tokio::test]
    async fn test_fetch_refuses_internal_addresses() {
        let fetcher = ImageFetcher::default();
        for source in [
            "http://127.0.0.1/latest/meta-data",
            "http://169.254.169.254/latest/meta-data/",
            "http://10.0.0.8/admin",
            "http://192.168.1.1/",
            "http://100.64.0.1/",
            "http://0.0.0.0:6379/",
            "http://localhost:8080/health",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[::ffff:127.0.0.1]/",
        ] {
            let err = fetcher.fetch(source).await.unwrap_err();
            assert!(
                err.to_string().contains("internal addresses are not allowed"),
                "{source} was not refused: {err}"
            );
        }
    }

    #[test]
    fn test_public_hosts_are_not_internal() {
        for source in [
            "https://v3.fal.media/files/x.jpg",
            "https://8.8.8.8/",
            "https://[2606:4700::1111]/",
        ] {
            let url = Url::parse(source).unwrap();
            assert!(!is_internal_host(&url), "{source}");
        }
    }

    #[test]
    fn test_timeout_message() {
        let fetcher = ImageFetcher::default();
        let err = fetcher.timeout_error("https://slow.example/x.png");
        assert_eq!(
            err.to_string(),
            "Failed to fetch image from https://slow.example/x.png: timed out after 30s"
        );
    }
}
