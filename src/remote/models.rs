// ABOUTME: List envelopes returned by platform status endpoints
// ABOUTME: Unwrapped into raw job records before they reach the normalizer

use serde::Deserialize;
use serde_json::Value;

use crate::error::CollectorError;
use crate::models::Platform;
use crate::normalize::RawJobRecord;

#[derive(Debug, Clone, Deserialize)]
pub struct AirbyteJobsPage {
    #[serde(default)]
    pub data: Vec<Value>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabricksRunsPage {
    #[serde(default)]
    pub runs: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerAutomateRunsPage {
    #[serde(default)]
    pub value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskHistoryPage {
    #[serde(default, alias = "data")]
    pub rows: Vec<Value>,
}

/// Where the next page of a listing lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Absolute or relative link to the next page.
    Link(String),
    /// Token to send back as `page_token` against the original URL.
    PageToken(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<RawJobRecord>,
    pub next: Option<Continuation>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Pull the job records and the continuation out of a status endpoint body. A
/// bare JSON array is accepted for every platform and is always the last page.
pub fn extract_page(platform: Platform, body: Value) -> Result<Page, CollectorError> {
    if let Value::Array(records) = body {
        return Ok(Page { records, next: None });
    }

    let shape_error = |e: serde_json::Error| {
        CollectorError::Response(format!("unexpected {} response shape: {}", platform, e))
    };

    let page = match platform {
        Platform::Airbyte => {
            let page: AirbyteJobsPage = serde_json::from_value(body).map_err(shape_error)?;
            Page {
                records: page.data,
                next: non_empty(page.next).map(Continuation::Link),
            }
        }
        Platform::Databricks => {
            let page: DatabricksRunsPage = serde_json::from_value(body).map_err(shape_error)?;
            let next = if page.has_more {
                non_empty(page.next_page_token).map(Continuation::PageToken)
            } else {
                None
            };
            Page {
                records: page.runs,
                next,
            }
        }
        Platform::PowerAutomate => {
            let page: PowerAutomateRunsPage = serde_json::from_value(body).map_err(shape_error)?;
            Page {
                records: page.value,
                next: non_empty(page.next_link).map(Continuation::Link),
            }
        }
        Platform::SnowflakeTask => {
            let page: TaskHistoryPage = serde_json::from_value(body).map_err(shape_error)?;
            Page {
                records: page.rows,
                next: None,
            }
        }
    };

    Ok(page)
}
