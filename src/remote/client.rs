// ABOUTME: HTTP status source that reads a platform's job status export endpoint
// ABOUTME: Maps transport and HTTP failures onto CollectorError variants

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::models::{extract_page, Continuation};
use crate::collector::StatusSource;
use crate::error::CollectorError;
use crate::models::Platform;
use crate::normalize::RawJobRecord;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Keeps error messages readable when a proxy returns an HTML error page.
const MAX_ERROR_BODY: usize = 512;

/// Listings longer than this are cut off with a warning.
pub const MAX_PAGES: usize = 50;

pub struct HttpStatusSource {
    client: Client,
    platform: Platform,
    url: String,
}

impl HttpStatusSource {
    pub fn new(platform: Platform, url: String, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("pipeline-health-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            platform,
            url,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}

fn classify_status(status: StatusCode, body: &str) -> CollectorError {
    let detail = format!("{}: {}", status, truncate(body.trim()));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollectorError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => CollectorError::RateLimited(detail),
        _ => CollectorError::Response(detail),
    }
}

fn classify_transport(error: &reqwest::Error) -> CollectorError {
    if error.is_timeout() {
        CollectorError::Connection(format!("request timed out: {}", error))
    } else {
        CollectorError::Connection(error.to_string())
    }
}

/// Request for one page: the URL to GET and, for token-paged APIs, the token.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PageRequest {
    url: String,
    page_token: Option<String>,
}

fn next_request(
    current: &PageRequest,
    base_url: &str,
    next: Continuation,
) -> Result<PageRequest, CollectorError> {
    match next {
        Continuation::Link(link) => {
            let url = Url::parse(&current.url)
                .and_then(|base| base.join(&link))
                .map_err(|e| {
                    CollectorError::Response(format!("invalid next page link '{}': {}", link, e))
                })?;
            Ok(PageRequest {
                url: url.to_string(),
                page_token: None,
            })
        }
        Continuation::PageToken(token) => Ok(PageRequest {
            url: base_url.to_string(),
            page_token: Some(token),
        }),
    }
}

/// Follow a platform listing page by page, up to `MAX_PAGES`.
async fn collect_pages<F, Fut>(
    platform: Platform,
    base_url: &str,
    mut get_page: F,
) -> Result<Vec<RawJobRecord>, CollectorError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Value, CollectorError>>,
{
    let mut request = PageRequest {
        url: base_url.to_string(),
        page_token: None,
    };
    let mut records = Vec::new();

    for page_number in 1..=MAX_PAGES {
        let body = get_page(request.clone()).await?;
        let page = extract_page(platform, body)?;
        debug!(
            platform = %platform,
            page = page_number,
            records = page.records.len(),
            "Fetched status page"
        );
        records.extend(page.records);

        match page.next {
            Some(next) => request = next_request(&request, base_url, next)?,
            None => return Ok(records),
        }
    }

    warn!(
        platform = %platform,
        pages = MAX_PAGES,
        records = records.len(),
        "Stopped following status pages at the page limit"
    );
    Ok(records)
}

impl HttpStatusSource {
    async fn get_page(&self, request: PageRequest) -> Result<Value, CollectorError> {
        let mut builder = self.client.get(&request.url);
        if let Some(token) = &request.page_token {
            builder = builder.query(&[("page_token", token)]);
        }

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| CollectorError::Response(format!("Failed to parse status response: {}", e)))
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Result<Vec<RawJobRecord>, CollectorError> {
        debug!(platform = %self.platform, url = %self.url, "Requesting job statuses");
        collect_pages(self.platform, &self.url, |request| self.get_page(request)).await
    }
}
