// ABOUTME: Power Automate flow run normalization
// ABOUTME: Flow context (id, display name, state) is attached to each run by the platform client

use serde::Deserialize;
use serde_json::Value;

use super::{duration_between, lenient, map_status, scalar_metadata, scalar_text, timestamp_value, Draft, StatusTable};
use crate::error::NormalizationDrop;
use crate::models::{JobStatus, MetadataValue};

const STATUS_TABLE: StatusTable = &[
    ("succeeded", JobStatus::Success),
    ("failed", JobStatus::Failed),
    ("cancelled", JobStatus::Cancelled),
    ("running", JobStatus::Running),
    ("waiting", JobStatus::Pending),
    ("suspended", JobStatus::Pending),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowRun {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    properties: Option<FlowRunProperties>,
    #[serde(default, deserialize_with = "lenient")]
    flow_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    flow_display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    flow_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowRunProperties {
    status: Option<Value>,
    start_time: Option<Value>,
    end_time: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    error: Option<FlowRunError>,
    #[serde(default, deserialize_with = "lenient")]
    trigger: Option<FlowRunTrigger>,
    #[serde(default, deserialize_with = "lenient")]
    workflow: Option<FlowReference>,
}

#[derive(Debug, Deserialize)]
struct FlowRunError {
    code: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlowRunTrigger {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
}

/// The flow a run belongs to, as embedded in the run resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowReference {
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    display_name: Option<String>,
}

/// Last path segment of an ARM-style resource name or id.
fn last_segment(path: &str) -> Option<&str> {
    path.rsplit('/').find(|segment| !segment.is_empty())
}

/// Flow id embedded in `.../flows/{flow}/runs/{run}`.
fn flow_from_resource_id(id: &str) -> Option<&str> {
    let mut segments = id.split('/');
    segments.find(|s| s.eq_ignore_ascii_case("flows"))?;
    segments.next().filter(|s| !s.is_empty())
}

pub(super) fn normalize(raw: &Value) -> Result<Draft, NormalizationDrop> {
    let run = FlowRun::deserialize(raw)
        .map_err(|e| NormalizationDrop::new(format!("power automate run shape: {}", e)))?;

    let run_id = run
        .name
        .as_deref()
        .and_then(last_segment)
        .or_else(|| run.id.as_deref().and_then(last_segment))
        .map(str::to_string)
        .ok_or_else(|| NormalizationDrop::new("power automate run has neither name nor id"))?;

    let properties = run.properties.unwrap_or_default();
    let workflow = properties.workflow.as_ref();

    let flow_id = run
        .flow_id
        .clone()
        .or_else(|| workflow.and_then(|w| w.name.clone()))
        .or_else(|| run.id.as_deref().and_then(flow_from_resource_id).map(str::to_string));

    let job_id = match &flow_id {
        Some(flow) => format!("powerautomate_{}_{}", flow, run_id),
        None => format!("powerautomate_{}", run_id),
    };

    let job_name = [
        run.flow_display_name.clone(),
        workflow.and_then(|w| w.display_name.clone()),
        flow_id.clone(),
    ]
    .into_iter()
    .flatten()
    .find(|name| !name.trim().is_empty())
    .unwrap_or_else(|| format!("Flow run {}", run_id));

    let raw_status = properties.status.as_ref().and_then(scalar_text);
    let status = raw_status.as_deref().and_then(|s| map_status(STATUS_TABLE, s));

    let started = timestamp_value(properties.start_time.as_ref());
    let ended = timestamp_value(properties.end_time.as_ref());

    let (error_code, error_message) = match properties.error {
        Some(error) => (error.code, error.message),
        None => (None, None),
    };

    let mut draft = Draft {
        job_id,
        job_name,
        status,
        raw_status,
        last_run_time: started,
        duration_seconds: duration_between(started, ended),
        error_message,
        ..Draft::default()
    };

    let metadata = &mut draft.metadata;
    metadata.insert("flow_id".into(), flow_id.into());
    metadata.insert("run_id".into(), MetadataValue::Text(run_id));
    metadata.insert("flow_state".into(), run.flow_state.into());
    if error_code.is_some() {
        metadata.insert("error_code".into(), scalar_metadata(error_code.as_ref()));
    }
    if let Some(trigger) = properties.trigger.and_then(|t| t.name) {
        metadata.insert("trigger".into(), trigger.into());
    }

    Ok(draft)
}
