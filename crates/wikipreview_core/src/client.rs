use std::env;
use std::str::FromStr;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::WikiConfig;
use crate::request::ParseRequest;

/// The MediaWiki Action API as seen by the preview workflows. Responses are
/// returned undecoded, API-level `error` objects included; interpreting them
/// is the decoder's job.
pub trait WikiApi {
    fn parse(&mut self, request: &ParseRequest) -> Result<Value>;
    fn query_source(&mut self, title: &str, follow_redirects: bool) -> Result<Value>;
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn logout(&mut self) -> Result<()>;
    fn edit(&mut self, title: &str, text: &str, summary: &str) -> Result<Value>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    /// Returns None when no wiki host is configured.
    pub fn from_config(config: &WikiConfig) -> Option<Self> {
        let api_url = config.api_url()?;
        Some(Self {
            api_url,
            user_agent: config.user_agent(),
            timeout_ms: env_value("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value("WIKI_RATE_LIMIT_READ", 0),
            rate_limit_write_ms: env_value("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value("WIKI_HTTP_RETRY_DELAY_MS", 500),
        })
    }
}

pub struct MediaWikiClient {
    client: Client,
    endpoint: Url,
    config: MediaWikiClientConfig,
    last_sent: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.api_url)
            .with_context(|| format!("invalid wiki API URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            config,
            last_sent: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    /// Send one API call, GET parameters in the query string and POST
    /// parameters as a form body. Retryable HTTP statuses and transport
    /// errors are retried with backoff; writes get their own retry budget.
    fn send(&mut self, method: Method, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        let pairs = with_format(params);
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };

        let mut attempt = 0;
        loop {
            self.throttle(is_write);
            let request = self
                .client
                .request(method.clone(), self.endpoint.clone())
                .header(USER_AGENT, self.config.user_agent.as_str());
            let request = if method == Method::GET {
                request.query(&pairs)
            } else {
                request.form(&pairs)
            };

            match request.send() {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json()
                        .context("failed to decode MediaWiki API JSON response");
                }
                Ok(response) => {
                    let status = response.status();
                    if attempt >= max_retries || !is_retryable_status(status) {
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }
                }
                Err(error) => {
                    if attempt >= max_retries || !is_retryable_error(&error) {
                        return Err(error).context("failed to call MediaWiki API");
                    }
                }
            }
            self.backoff(attempt, is_write);
            attempt += 1;
        }
    }

    fn get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        self.send(Method::GET, params, false)
    }

    fn post(&mut self, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        self.send(Method::POST, params, is_write)
    }

    fn throttle(&mut self, is_write: bool) {
        let gap = Duration::from_millis(if is_write {
            self.config.rate_limit_write_ms
        } else {
            self.config.rate_limit_read_ms
        });
        if let Some(remaining) = self
            .last_sent
            .and_then(|last| gap.checked_sub(last.elapsed()))
        {
            sleep(remaining);
        }
        self.last_sent = Some(Instant::now());
        self.request_count += 1;
    }

    fn backoff(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let factor = if is_write { 2 } else { 1 };
        let delay = base.saturating_mul(factor).saturating_add(jitter);
        debug!(attempt, delay_ms = delay, "retrying MediaWiki request");
        sleep(Duration::from_millis(delay));
    }

    fn fetch_token(&mut self, kind: &str) -> Result<String> {
        let mut params = vec![
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ];
        if kind != "csrf" {
            params.push(("type", kind.to_string()));
        }
        let response = self.get(&params)?;
        token_from(&response, kind)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki {kind} token"))
    }

    fn csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let token = self.fetch_token("csrf")?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl WikiApi for MediaWikiClient {
    fn parse(&mut self, request: &ParseRequest) -> Result<Value> {
        debug!(prop = %request.prop(), "issuing parse request");
        // Raw wikitext can be long; POST keeps it out of the URL.
        self.post(&request.to_params(), false)
    }

    fn query_source(&mut self, title: &str, follow_redirects: bool) -> Result<Value> {
        let mut params = vec![
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content|timestamp|ids".to_string()),
            ("rvslots", "main".to_string()),
        ];
        if follow_redirects {
            params.push(("redirects", "1".to_string()));
        }
        self.get(&params)
    }

    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let login_token = self.fetch_token("login")?;
        let response = self.post(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let result = response.pointer("/login/result").and_then(Value::as_str);
        if result == Some("Success") {
            self.csrf_token = None;
            return Ok(());
        }
        let reason = response
            .pointer("/login/reason")
            .and_then(Value::as_str)
            .or(result)
            .unwrap_or("unknown error");
        bail!("MediaWiki login failed: {reason}")
    }

    fn logout(&mut self) -> Result<()> {
        let token = self.csrf_token()?;
        self.post(&[("action", "logout".to_string()), ("token", token)], true)?;
        self.csrf_token = None;
        Ok(())
    }

    fn edit(&mut self, title: &str, text: &str, summary: &str) -> Result<Value> {
        let token = self.csrf_token()?;
        self.post(
            &[
                ("action", "edit".to_string()),
                ("title", title.to_string()),
                ("text", text.to_string()),
                ("summary", summary.to_string()),
                ("bot", "1".to_string()),
                ("token", token),
            ],
            true,
        )
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Prefix the response format. Every value is sent as given, empty ones
/// included: an empty `text` blanks a page on edit.
fn with_format(params: &[(&str, String)]) -> Vec<(String, String)> {
    [("format", "json"), ("formatversion", "2")]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .chain(
            params
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone())),
        )
        .collect()
}

/// `kind` is `csrf` or `login`; the reply key is `<kind>token`.
fn token_from(response: &Value, kind: &str) -> Option<String> {
    response
        .pointer(&format!("/query/tokens/{kind}token"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn env_value<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
