use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;

use crate::config::Config;

const REQUEST_TIMEOUT_SECS: u64 = 25;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const RATE_LIMIT_BACKOFF_CAP_SECS: f64 = 120.0;
const SERVER_ERROR_BACKOFF_CAP_SECS: f64 = 60.0;
const RATE_LIMIT_JITTER_MAX_SECS: f64 = 0.5;
const SERVER_ERROR_JITTER_MAX_SECS: f64 = 0.25;

static CLIENT: OnceCell<Client> = OnceCell::new();

/// One blocking client for the whole process; pagination loops hammer the
/// same host, so connection reuse matters.
fn shared_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// Injected so retry behavior is testable without real delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, dur: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

/// Blocking client for the provider's JSON collection endpoints. The token
/// string goes into the Authorization header as-is (no Bearer prefix).
pub struct ApiClient {
    base_url: String,
    token: String,
    max_retries: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            token: cfg.api_token.clone(),
            max_retries: cfg.max_retries,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Single GET with rate-limit and server-error retries. Other 4xx and
    /// transport errors propagate immediately.
    pub fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let client = shared_client()?;
        let mut rate_limit_backoff = 1.0f64;
        let mut server_backoff = 1.0f64;
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 0..self.max_retries {
            let resp = client
                .get(&url)
                .header("Accept", "application/json")
                .header("Authorization", &self.token)
                .query(params)
                .send()
                .with_context(|| format!("GET {url} failed"))?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                last_err = Some(anyhow!("http {status} for {url}"));
                if attempt + 1 < self.max_retries {
                    let retry_after = resp
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<f64>().ok());
                    let delay = rate_limit_delay(retry_after, rate_limit_backoff)
                        + rand::thread_rng().gen_range(0.0..RATE_LIMIT_JITTER_MAX_SECS);
                    self.sleeper.sleep(Duration::from_secs_f64(delay));
                    rate_limit_backoff = next_rate_limit_backoff(rate_limit_backoff);
                    continue;
                }
                break;
            }

            if status.is_server_error() {
                last_err = Some(anyhow!("http {status} for {url}"));
                if attempt + 1 < self.max_retries {
                    let delay = server_backoff
                        + rand::thread_rng().gen_range(0.0..SERVER_ERROR_JITTER_MAX_SECS);
                    self.sleeper.sleep(Duration::from_secs_f64(delay));
                    server_backoff = next_server_error_backoff(server_backoff);
                    continue;
                }
                break;
            }

            let body = resp.text().with_context(|| format!("reading body of {url}"))?;
            if !status.is_success() {
                return Err(anyhow!("http {status} for {url}: {body}"));
            }
            return serde_json::from_str(body.trim())
                .with_context(|| format!("invalid json from {url}"));
        }

        Err(last_err
            .unwrap_or_else(|| anyhow!("GET {url} gave up after {} attempts", self.max_retries)))
    }

    /// One page of a collection endpoint: its `data` items and whether the
    /// provider signals more pages.
    pub fn get_page(
        &self,
        path: &str,
        params: &[(String, String)],
        page: u64,
    ) -> Result<(Vec<Value>, bool)> {
        let mut params = params.to_vec();
        params.push(("page".to_string(), page.to_string()));
        let obj = self.get(path, &params)?;
        let items = obj
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();
        let has_more = page_has_more(&obj);
        Ok((items, has_more))
    }

    /// Lazy page walk over a collection endpoint's `data` arrays.
    pub fn get_paginated(&self, path: &str, params: &[(String, String)]) -> Paginated<'_> {
        Paginated {
            client: self,
            path: path.to_string(),
            params: params.to_vec(),
            page: 1,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }

    pub fn search_leagues(&self, query: &str) -> Result<Vec<Value>> {
        let obj = self.get(&format!("leagues/search/{query}"), &[])?;
        Ok(obj
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default())
    }

    pub fn get_league(&self, league_id: i64) -> Result<Value> {
        let obj = self.get(&format!("leagues/{league_id}"), &[])?;
        Ok(obj.get("data").cloned().unwrap_or(Value::Null))
    }

    pub fn get_league_with_seasons(&self, league_id: i64) -> Result<Value> {
        let params = vec![("include".to_string(), "seasons".to_string())];
        let obj = self.get(&format!("leagues/{league_id}"), &params)?;
        Ok(obj.get("data").cloned().unwrap_or(Value::Null))
    }

    pub fn teams_by_season(&self, season_id: i64) -> Paginated<'_> {
        let params = vec![("per_page".to_string(), "50".to_string())];
        self.get_paginated(&format!("teams/seasons/{season_id}"), &params)
    }

    pub fn fixtures_by_season(&self, season_id: i64) -> Paginated<'_> {
        let params = vec![
            (
                "filters".to_string(),
                format!("fixtureSeasons:{season_id}"),
            ),
            ("per_page".to_string(), "100".to_string()),
            (
                "include".to_string(),
                "participants;state;scores;round;stage;group".to_string(),
            ),
        ];
        self.get_paginated("fixtures", &params)
    }

    /// State id -> upper-cased state code.
    pub fn states_map(&self) -> Result<HashMap<i64, String>> {
        let obj = self.get("states", &[])?;
        let mut out = HashMap::new();
        for s in obj.get("data").and_then(|d| d.as_array()).into_iter().flatten() {
            let Some(id) = s.get("id").and_then(|v| v.as_i64()) else {
                continue;
            };
            let code = s
                .get("code")
                .or_else(|| s.get("state"))
                .or_else(|| s.get("name"))
                .and_then(|v| v.as_str());
            if let Some(code) = code {
                out.insert(id, code.trim().to_ascii_uppercase());
            }
        }
        Ok(out)
    }
}

pub struct Paginated<'a> {
    client: &'a ApiClient,
    path: String,
    params: Vec<(String, String)>,
    page: u64,
    buffer: std::vec::IntoIter<Value>,
    done: bool,
}

impl Iterator for Paginated<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Result<Value>> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            let (items, has_more) = match self.client.get_page(&self.path, &self.params, self.page)
            {
                Ok(page) => page,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            if items.is_empty() {
                self.done = true;
                continue;
            }
            if !has_more {
                self.done = true;
            }
            self.page += 1;
            self.buffer = items.into_iter();
        }
    }
}

/// Pagination flags move around between `pagination`, `meta` and the root.
fn page_has_more(obj: &Value) -> bool {
    for key in ["pagination", "meta"] {
        if let Some(block) = obj.get(key) {
            for flag in ["has_more", "has_more_pages"] {
                if let Some(b) = block.get(flag).and_then(|v| v.as_bool()) {
                    return b;
                }
            }
        }
    }
    obj.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false)
}

fn rate_limit_delay(retry_after: Option<f64>, backoff: f64) -> f64 {
    retry_after
        .unwrap_or(backoff)
        .clamp(0.5, RATE_LIMIT_BACKOFF_CAP_SECS)
}

fn next_rate_limit_backoff(backoff: f64) -> f64 {
    (backoff * 2.0).min(RATE_LIMIT_BACKOFF_CAP_SECS)
}

fn next_server_error_backoff(backoff: f64) -> f64 {
    (backoff * 2.0).min(SERVER_ERROR_BACKOFF_CAP_SECS)
}
