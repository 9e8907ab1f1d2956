use serde_json::Value;
use tracing::debug;

use crate::config::VerdictTable;
use crate::error::{ExtractionError, ShapeError};

/// Payload of the homework statuses endpoint after structural checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// Most recent record first.
    pub homeworks: Vec<Value>,
    pub current_date: i64,
}

/// Message extracted from one homework record.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub homework_name: String,
    pub text: String,
}

/// Check that `response` matches the documented API shape.
///
/// Both keys are checked for presence before their types, so a payload that
/// is missing `current_date` reports that even if `homeworks` is malformed.
pub fn validate(response: Value) -> Result<ApiResponse, ShapeError> {
    let Value::Object(mut map) = response else {
        return Err(ShapeError::NotAMapping);
    };

    let homeworks = map
        .remove("homeworks")
        .ok_or(ShapeError::MissingKey("homeworks"))?;
    let current_date = map
        .remove("current_date")
        .ok_or(ShapeError::MissingKey("current_date"))?;

    let Value::Array(homeworks) = homeworks else {
        return Err(ShapeError::NotASequence);
    };
    let current_date = current_date.as_i64().ok_or(ShapeError::NotATimestamp)?;

    debug!(
        "API response validated: {} homework(s), current_date={}",
        homeworks.len(),
        current_date
    );
    Ok(ApiResponse {
        homeworks,
        current_date,
    })
}

/// Turn one homework record into a status-change message.
pub fn extract(record: &Value, verdicts: &VerdictTable) -> Result<StatusMessage, ExtractionError> {
    let record = record.as_object().ok_or(ExtractionError::NotAMapping)?;

    let name = record
        .get("homework_name")
        .and_then(Value::as_str)
        .ok_or(ExtractionError::MissingName)?;

    let status = record.get("status").and_then(Value::as_str);
    let verdict = status
        .and_then(|s| verdicts.verdict(s))
        .ok_or_else(|| ExtractionError::UnknownStatus(status.map(str::to_string)))?;

    debug!("Extracted status {:?} for homework {:?}", status, name);
    Ok(StatusMessage {
        homework_name: name.to_string(),
        text: format!("Changed review status of \"{}\". {}", name, verdict),
    })
}
