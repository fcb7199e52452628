//! Rate-limit-aware HTTP client for the OpenAQ API.
//!
//! The client owns pacing and nothing else: it waits out the quota
//! window before a request when the budget runs low, sleeps a fixed
//! cooldown after a 429, and then hands the error up. Whether an entity
//! gets re-attempted is the orchestrator's call.

use std::time::Duration;

use serde::de::DeserializeOwned;

use aquiline_core::http::{ApiError, blocking_get};
use aquiline_core::ratelimit::RateLimitState;

use crate::fetcher::{PageQuery, PageSource};
use crate::page::Page;

/// Maximum length of the response body preview included in HTTP errors.
const BODY_PREVIEW_LEN: usize = 500;

/// Cooldown after the server answers 429 despite the pre-emptive wait.
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Fixed page size sent with every request.
    pub page_limit: u32,
    pub cooldown: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openaq.org/v3".to_string(),
            api_key: std::env::var("OPENAQ_API_KEY").ok(),
            page_limit: 1000,
            cooldown: RATE_LIMIT_COOLDOWN,
        }
    }
}

/// The single shared client instance for a run. Sequential use only —
/// the quota it tracks is global to the process.
#[derive(Debug)]
pub struct RateLimitedClient {
    config: ClientConfig,
    limits: RateLimitState,
}

impl RateLimitedClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            limits: RateLimitState::default(),
        }
    }

    /// Current quota counters, as last reported by the server.
    pub fn limits(&self) -> &RateLimitState {
        &self.limits
    }

    /// How long the next request should wait before being issued, if
    /// the remaining budget is under the watermark.
    fn pre_wait(&self) -> Option<Duration> {
        self.limits
            .nearly_exhausted()
            .then(|| self.limits.wait_duration())
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Issue one GET for one page. Updates quota state from the response
    /// headers on every exchange, including errors.
    pub fn request<T: DeserializeOwned>(
        &mut self,
        path: &str,
        params: &[(String, String)],
        page: u32,
    ) -> Result<Page<T>, ApiError> {
        if let Some(wait) = self.pre_wait() {
            log::info!(
                "quota low ({}), waiting {}s for reset",
                self.limits,
                wait.as_secs()
            );
            std::thread::sleep(wait);
            self.limits.assume_fresh();
        }

        let mut query: Vec<(String, String)> = params.to_vec();
        query.push(("page".into(), page.to_string()));
        query.push(("limit".into(), self.config.page_limit.to_string()));

        let mut headers: Vec<(&'static str, String)> = Vec::new();
        if let Some(key) = &self.config.api_key {
            headers.push(("X-API-Key", key.clone()));
        }

        let response = blocking_get(&self.url_for(path), &query, &headers)?;
        self.limits.update_from_headers(&response.headers);

        match response.status {
            200..=299 => serde_json::from_str(&response.body).map_err(|e| ApiError::Decode {
                message: e.to_string(),
            }),
            429 => {
                let reset_seconds = RateLimitState::reset_hint(&response.headers);
                log::warn!(
                    "rate limit hit on {path} page {page}, cooling down {}s",
                    self.config.cooldown.as_secs()
                );
                std::thread::sleep(self.config.cooldown);
                Err(ApiError::RateLimited { reset_seconds })
            }
            status => Err(ApiError::Http {
                status,
                body: body_preview(&response.body),
            }),
        }
    }
}

impl<T: DeserializeOwned> PageSource<T> for RateLimitedClient {
    fn fetch_page(&mut self, query: &PageQuery, page: u32) -> Result<Page<T>, ApiError> {
        self.request(&query.path, &query.params, page)
    }
}

fn body_preview(body: &str) -> String {
    if body.len() > BODY_PREVIEW_LEN {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < BODY_PREVIEW_LEN)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
