//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building one HTTP client per egress proxy
//! - Rotating the user agent and proxy per request
//! - Enforcing the textual content type contract
//! - Streaming HTML bodies into the page parser chunk by chunk
//! - Error classification

use crate::identity::{Identity, ProxyOption};
use crate::page::{parse_stream, Page};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Body chunks buffered between the network reader and the parser thread
const CHUNK_BUFFER: usize = 16;

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Unsupported content type '{content_type}' at {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to parse {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    /// Whether trying the same request again later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::UnsupportedContentType { .. } | Self::Client(_) | Self::Parse { .. } => false,
        }
    }

    fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

/// Result of a successful fetch
#[derive(Debug)]
pub enum Fetched {
    /// An HTML page, parsed
    Html(Page),
    /// A non-HTML textual response; the body is not read
    Text { content_type: String },
}

/// HTTP settings shared by every client a fetcher builds
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub request_timeout: Duration,
    /// Bytes of an HTML body fed to the parser; the rest is ignored
    pub max_body_bytes: u64,
    /// Sent when no user agent rotator is configured
    pub default_user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 10 * 1024 * 1024,
            default_user_agent: concat!("mycelium/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `settings` - Timeouts and the fallback user agent
/// * `proxy` - Egress proxy for every request sent by this client
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client or parse the proxy
///
/// # Example
///
/// ```no_run
/// use mycelium::crawler::{build_http_client, FetchSettings};
///
/// let client = build_http_client(&FetchSettings::default(), None).unwrap();
/// ```
pub fn build_http_client(
    settings: &FetchSettings,
    proxy: Option<&ProxyOption>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(settings.default_user_agent.as_str())
        .timeout(settings.request_timeout)
        .connect_timeout(settings.request_timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.url.as_str())?);
    }

    builder.build()
}

/// Issues page requests with a rotated identity
pub struct PageFetcher {
    direct: Client,
    proxied: HashMap<ProxyOption, Client>,
    identity: Identity,
    settings: FetchSettings,
}

impl PageFetcher {
    /// Builds a direct client plus one client per configured proxy
    pub fn new(identity: Identity, settings: FetchSettings) -> Result<Self, FetchError> {
        let direct = build_http_client(&settings, None)?;

        let mut proxied = HashMap::new();
        if let Some(proxies) = &identity.proxies {
            for option in proxies.options() {
                proxied.insert(option.clone(), build_http_client(&settings, Some(option))?);
            }
        }

        Ok(Self {
            direct,
            proxied,
            identity,
            settings,
        })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches one page
    ///
    /// # Request Flow
    ///
    /// 1. Pick a user agent and an egress proxy from the identity rotators
    /// 2. Send the GET, following up to 10 redirects
    /// 3. Reject non-2xx statuses
    /// 4. Reject content types outside `text/*`
    /// 5. Stream `text/html` bodies into the parser; report other text types
    ///    without reading their body
    ///
    /// The returned page is located at `url` even after redirects; its links
    /// resolve against the final response URL.
    pub async fn fetch(&self, url: &Url) -> Result<Fetched, FetchError> {
        let user_agent = self
            .identity
            .pick_user_agent()
            .unwrap_or(self.settings.default_user_agent.as_str());

        let proxy = self.identity.pick_proxy();
        let client = proxy
            .and_then(|p| self.proxied.get(p))
            .unwrap_or(&self.direct);

        tracing::debug!(
            url = %url,
            user_agent = %user_agent,
            proxy = %proxy.map(ToString::to_string).unwrap_or_else(|| "direct".to_string()),
            "Fetching"
        );

        let response = client
            .get(url.clone())
            .header(USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let mime = media_type(content_type);

        if !mime.starts_with("text/") {
            return Err(FetchError::UnsupportedContentType {
                url: url.to_string(),
                content_type: content_type.to_string(),
            });
        }
        if mime != "text/html" {
            return Ok(Fetched::Text { content_type: mime });
        }

        self.stream_html(url, response).await.map(Fetched::Html)
    }

    /// Feeds the body to a parser thread as chunks arrive, up to the byte limit
    async fn stream_html(&self, url: &Url, mut response: Response) -> Result<Page, FetchError> {
        let base = response.url().clone();
        let location = url.clone();
        let limit = self.settings.max_body_bytes;

        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let parser = tokio::task::spawn_blocking(move || parse_stream(rx, location, base));

        let mut received: u64 = 0;
        let mut read_error = None;
        while received < limit {
            match response.chunk().await {
                Ok(Some(mut chunk)) => {
                    let remaining = limit - received;
                    if chunk.len() as u64 > remaining {
                        chunk.truncate(remaining as usize);
                        tracing::debug!(url = %url, limit, "Body exceeds limit, ignoring the rest");
                    }
                    received += chunk.len() as u64;
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    read_error = Some(FetchError::from_reqwest(url, e));
                    break;
                }
            }
        }
        drop(tx);

        let page = parser.await.map_err(|e| FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        match read_error {
            Some(e) => Err(e),
            None => Ok(page),
        }
    }
}

/// Lowercased media type without parameters
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
