//! Hardened HTTP client (spec §4.1): URL validation, DNS pinning against
//! rebinding, a manual redirect loop that re-validates every hop, bounded
//! retries with jittered backoff, and a streamed response-size cap.
//!
//! Grounded in the `send_with_pinning`/`fetch` shape of
//! `rootsignal-api::link_preview` (redirect::Policy::none() plus manual
//! redirect handling) and the DNS-pin-then-stream-with-cap loop in
//! `danielchristiancazares-forge/tools/src/webfetch/http.rs`.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::error::{HttpError, Result};
use crate::redact::{is_sensitive_key, redact_header, redact_url};
use crate::security::UrlValidator;

const MAX_REDIRECTS: u32 = 5;
const MAX_RETRIES: u32 = 4;
const BASE_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF_PER_ATTEMPT: Duration = Duration::from_secs(60);
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// A request to issue through the hardened client.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub method: reqwest::Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
    pub max_response_bytes: u64,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: reqwest::Method::GET,
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_secs(25),
            max_response_bytes: 10 * 1024 * 1024,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    pub fn max_response_bytes(mut self, n: u64) -> Self {
        self.max_response_bytes = n;
        self
    }
}

/// The outcome of a successful fetch: status, headers and a
/// size-bounded body.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub final_url: String,
}

impl Response {
    pub fn header_str(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

pub struct HardenedClient {
    validator: UrlValidator,
    user_agent: String,
}

impl HardenedClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            validator: UrlValidator::new(),
            user_agent: user_agent.into(),
        }
    }

    /// Issue a request, retrying transport failures and retryable status
    /// codes with jittered exponential backoff, honouring `Retry-After`
    /// when present.
    pub async fn execute(&self, request: &Request) -> Result<Response> {
        let deadline = Instant::now() + request.timeout;
        let mut attempt = 0u32;
        loop {
            match self.execute_once(request, deadline).await {
                Ok(response) => {
                    if RETRYABLE_STATUSES.contains(&response.status) && attempt < MAX_RETRIES {
                        let wait = retry_after(&response).unwrap_or_else(|| backoff(attempt));
                        if Instant::now() + wait >= deadline {
                            return Ok(response);
                        }
                        debug!(attempt, status = response.status, ?wait, "retrying after status");
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    let wait = backoff(attempt);
                    if Instant::now() + wait >= deadline {
                        return Err(err);
                    }
                    debug!(attempt, error = %redact_error(&err), ?wait, "retrying after transport error");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(&self, request: &Request, deadline: Instant) -> Result<Response> {
        let mut current = Url::parse(&request.url)
            .map_err(|e| HttpError::UrlRejected(format!("invalid URL: {e}")))?;
        self.validator.validate(&current)?;

        let mut headers = request.headers.clone();
        let origin_host = current.host_str().map(str::to_string);
        let origin_port = current.port_or_known_default();
        let origin_scheme = current.scheme().to_string();

        for hop in 0..=MAX_REDIRECTS {
            if Instant::now() >= deadline {
                return Err(HttpError::Timeout(request.timeout));
            }

            let host = current
                .host_str()
                .ok_or_else(|| HttpError::UrlRejected("URL has no host".to_string()))?
                .to_string();
            let port = current.port_or_known_default().unwrap_or(443);
            let ips = self.validator.resolve_and_check(&host, port).await?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HttpError::Timeout(request.timeout));
            }

            let client = build_pinned_client(&self.user_agent, &host, ips[0], port, remaining)?;
            let mut builder = client.request(request.method.clone(), current.clone());
            for (name, value) in &headers {
                if let (Ok(n), Ok(v)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    builder = builder.header(n, v);
                }
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let sent = timeout(remaining, builder.send())
                .await
                .map_err(|_| HttpError::Timeout(request.timeout))?
                .map_err(|e| HttpError::Transport(redact_url(&e.to_string())))?;

            let peer = sent.remote_addr().map(|a| a.ip());
            if let Some(peer_ip) = peer {
                self.validator.check_connected_peer(peer_ip)?;
            }

            let status = sent.status().as_u16();

            if matches!(status, 301 | 302 | 303 | 307 | 308) {
                if !redirect_allowed(hop) {
                    return Err(HttpError::RedirectRejected(format!(
                        "exceeded {MAX_REDIRECTS} redirects"
                    )));
                }

                let location = sent
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        HttpError::RedirectRejected("redirect missing Location header".to_string())
                    })?
                    .to_string();
                let next = current.join(&location).map_err(|_| {
                    HttpError::RedirectRejected(format!(
                        "redirect target could not be resolved: {}",
                        redact_url(&location)
                    ))
                })?;
                self.validator.validate(&next)?;

                if is_cross_origin(origin_host.as_deref(), origin_port, &origin_scheme, &next) {
                    headers.retain(|(name, _)| !is_sensitive_key(name));
                    warn!(
                        to = %redact_url(next.as_str()),
                        "stripped sensitive headers on cross-origin redirect"
                    );
                }
                current = next;
                continue;
            }

            let body = read_capped_body(sent, request.max_response_bytes).await?;
            return Ok(Response {
                status,
                headers: body.1,
                body: body.0,
                final_url: current.to_string(),
            });
        }

        Err(HttpError::RedirectRejected(format!(
            "exceeded {MAX_REDIRECTS} redirects"
        )))
    }
}

async fn read_capped_body(
    response: reqwest::Response,
    limit: u64,
) -> Result<(Vec<u8>, HeaderMap)> {
    if let Some(len) = response.content_length() {
        if len > limit {
            return Err(HttpError::ResponseTooLarge { limit });
        }
    }
    let headers = response.headers().clone();
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HttpError::Transport(redact_url(&e.to_string())))?;
        if body.len() as u64 + chunk.len() as u64 > limit {
            return Err(HttpError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, headers))
}

fn build_pinned_client(
    user_agent: &str,
    host: &str,
    ip: IpAddr,
    port: u16,
    remaining: Duration,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .user_agent(user_agent)
        .no_proxy()
        .timeout(remaining)
        .resolve(host, SocketAddr::new(ip, port))
        .build()
        .map_err(|e| HttpError::Transport(e.to_string()))
}

/// Whether a redirect may still be followed at this hop. `hop` is the
/// zero-based ordinal of the request that just came back with a 3xx
/// status; once `MAX_REDIRECTS` redirects have already been followed, the
/// next one must be rejected rather than treated as a final response.
fn redirect_allowed(hop: u32) -> bool {
    hop < MAX_REDIRECTS
}

/// A redirect is cross-origin if scheme, host or port differs from the
/// request's original origin (spec §4.1/§8 fixture 5) — host alone is not
/// enough, since `https://host:8443` and `https://host:9443` are different
/// origins.
fn is_cross_origin(origin_host: Option<&str>, origin_port: Option<u16>, origin_scheme: &str, next: &Url) -> bool {
    next.host_str() != origin_host || next.port_or_known_default() != origin_port || next.scheme() != origin_scheme
}

fn backoff(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF.saturating_mul(1 << attempt.min(6));
    let jitter_ms = rand::random::<u64>() % 200;
    (exp + Duration::from_millis(jitter_ms)).min(MAX_BACKOFF_PER_ATTEMPT)
}

/// Parse `Retry-After` as either delta-seconds or an HTTP-date, capped at
/// 60s so a hostile upstream cannot stall a worker indefinitely.
fn retry_after(response: &Response) -> Option<Duration> {
    let raw = response.header_str("retry-after")?;
    if let Ok(secs) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs).min(MAX_BACKOFF_PER_ATTEMPT));
    }
    let at = chrono::DateTime::parse_from_rfc2822(raw.trim()).ok()?;
    let now = chrono::Utc::now();
    let delta = at.with_timezone(&chrono::Utc) - now;
    delta
        .to_std()
        .ok()
        .map(|d| d.min(MAX_BACKOFF_PER_ATTEMPT))
}

fn redact_error(err: &HttpError) -> String {
    redact_url(&err.to_string())
}

#[allow(dead_code)]
fn redact_response_header(name: &str, value: &str) -> String {
    redact_header(name, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let b0 = backoff(0);
        let b5 = backoff(5);
        assert!(b5 >= b0);
        assert!(b5 <= MAX_BACKOFF_PER_ATTEMPT);
    }

    #[test]
    fn retry_after_parses_seconds() {
        let response = Response {
            status: 429,
            headers: {
                let mut h = HeaderMap::new();
                h.insert("retry-after", HeaderValue::from_static("7"));
                h
            },
            body: Vec::new(),
            final_url: "https://example.com/".to_string(),
        };
        assert_eq!(retry_after(&response), Some(Duration::from_secs(7)));
    }

    #[test]
    fn redirect_allowed_up_to_max_then_rejected() {
        assert!(redirect_allowed(0));
        assert!(redirect_allowed(MAX_REDIRECTS - 1));
        assert!(!redirect_allowed(MAX_REDIRECTS));
    }

    #[test]
    fn cross_origin_detects_port_change_with_same_host_and_scheme() {
        // spec §8 fixture 5: https://example.com:8443/y -> https://example.com:9443/x
        let next: Url = "https://example.com:9443/x".parse().unwrap();
        assert!(is_cross_origin(Some("example.com"), Some(8443), "https", &next));
    }

    #[test]
    fn cross_origin_detects_scheme_change_with_same_host_and_port() {
        let next: Url = "http://example.com/x".parse().unwrap();
        assert!(is_cross_origin(Some("example.com"), Some(443), "https", &next));
    }

    #[test]
    fn cross_origin_detects_host_change() {
        let next: Url = "https://other.example.com/x".parse().unwrap();
        assert!(is_cross_origin(Some("example.com"), Some(443), "https", &next));
    }

    #[test]
    fn same_origin_is_not_cross_origin() {
        let next: Url = "https://example.com/x".parse().unwrap();
        assert!(!is_cross_origin(Some("example.com"), Some(443), "https", &next));
    }

    #[test]
    fn retry_after_caps_long_delta() {
        let response = Response {
            status: 503,
            headers: {
                let mut h = HeaderMap::new();
                h.insert("retry-after", HeaderValue::from_static("3600"));
                h
            },
            body: Vec::new(),
            final_url: "https://example.com/".to_string(),
        };
        assert_eq!(retry_after(&response), Some(MAX_BACKOFF_PER_ATTEMPT));
    }
}
