//! Scheduled-task tools exposed to the agent
//!
//! Each tool validates its arguments, issues at most one scheduler RPC and
//! renders the host's answer as a text content block. Every failure, from a
//! missing argument to a host-side rejection, becomes an `isError` result
//! rather than a protocol error.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::{json, Map, Value as JsonValue};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};

use scheduler_bridge_protocol::{CreateTaskParams, IntervalUnit, SchedulerMethod};

use crate::error::{BridgeError, BridgeResult, ToolError};

/// Seam between the tools and the transport that reaches the host
#[async_trait]
pub trait SchedulerRpc: Send + Sync {
    /// Issue one scheduler RPC and return its result
    async fn call(&self, method: SchedulerMethod, params: JsonValue) -> BridgeResult<JsonValue>;
}

/// Tools in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ScheduleTask,
    ListScheduledTasks,
    CancelScheduledTask,
}

impl ToolName {
    /// Catalog order, as returned by `tools/list`
    pub const ALL: [ToolName; 3] = [
        ToolName::ScheduleTask,
        ToolName::ListScheduledTasks,
        ToolName::CancelScheduledTask,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScheduleTask => "schedule_task",
            Self::ListScheduledTasks => "list_scheduled_tasks",
            Self::CancelScheduledTask => "cancel_scheduled_task",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::ScheduleTask => {
                "Schedule a prompt to run later in this conversation. Use delay_minutes for a \
                 single run after a delay, or interval_value with interval_unit for a recurring \
                 task. schedule_time (HH:MM) pins daily tasks to a time of day."
            }
            Self::ListScheduledTasks => "List the scheduled tasks of this conversation.",
            Self::CancelScheduledTask => "Cancel a scheduled task by its id.",
        }
    }

    fn input_schema(self) -> JsonValue {
        match self {
            Self::ScheduleTask => json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Short display name for the task"
                    },
                    "prompt": {
                        "type": "string",
                        "description": "Prompt delivered to the agent when the task fires"
                    },
                    "delay_minutes": {
                        "type": "number",
                        "description": "Run once after this many minutes. Not combinable with interval_value or interval_unit"
                    },
                    "interval_value": {
                        "type": "number",
                        "description": "Repeat every interval_value units"
                    },
                    "interval_unit": {
                        "type": "string",
                        "enum": IntervalUnit::ALL,
                        "description": "Unit of interval_value"
                    },
                    "one_shot": {
                        "type": "boolean",
                        "description": "Stop after the first run (default false)"
                    },
                    "schedule_time": {
                        "type": "string",
                        "pattern": "^([01][0-9]|2[0-3]):[0-5][0-9]$",
                        "description": "Time of day HH:MM, only used when interval_unit is days"
                    }
                },
                "required": ["name", "prompt"]
            }),
            Self::ListScheduledTasks => json!({
                "type": "object",
                "properties": {}
            }),
            Self::CancelScheduledTask => json!({
                "type": "object",
                "properties": {
                    "task_id": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Id of the task to cancel"
                    }
                },
                "required": ["task_id"]
            }),
        }
    }

    /// Catalog entry for this tool
    pub fn definition(self) -> Tool {
        let schema = match self.input_schema() {
            JsonValue::Object(map) => Arc::new(map),
            _ => Arc::new(JsonObject::new()),
        };

        Tool {
            name: Cow::Borrowed(self.as_str()),
            description: Some(Cow::Borrowed(self.description())),
            input_schema: schema,
            output_schema: None,
            annotations: None,
            title: None,
            icons: None,
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The static tool catalog
pub fn catalog() -> Vec<Tool> {
    ToolName::ALL.into_iter().map(ToolName::definition).collect()
}

/// Run one tool and render the outcome as a tool result. Never fails.
pub async fn call_tool<S>(rpc: &S, name: &str, arguments: JsonValue) -> CallToolResult
where
    S: SchedulerRpc + ?Sized,
{
    match dispatch(rpc, name, arguments).await {
        Ok(result) => {
            debug!(tool = name, "Tool call succeeded");
            text_result(result.to_string(), false)
        }
        Err(error) => {
            warn!(tool = name, kind = %error.kind(), "Tool call failed: {}", error);
            text_result(error.to_string(), true)
        }
    }
}

/// Single text block; `is_error` marks a failed call.
///
/// Successful results carry no `isError` key at all.
pub fn text_result(text: impl Into<String>, is_error: bool) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text)],
        structured_content: None,
        is_error: is_error.then_some(true),
        meta: None,
    }
}

async fn dispatch<S>(rpc: &S, name: &str, arguments: JsonValue) -> Result<JsonValue, ToolError>
where
    S: SchedulerRpc + ?Sized,
{
    let tool = ToolName::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

    match tool {
        ToolName::ScheduleTask => {
            let params = build_create_params(&arguments)?;
            let params = serde_json::to_value(&params)
                .map_err(|e| BridgeError::Encode(e.to_string()))?;
            Ok(rpc.call(SchedulerMethod::Create, params).await?)
        }
        ToolName::ListScheduledTasks => Ok(rpc.call(SchedulerMethod::List, json!({})).await?),
        ToolName::CancelScheduledTask => {
            let task_id = parse_task_id(&arguments)?;
            Ok(rpc
                .call(SchedulerMethod::Cancel, json!({ "task_id": task_id }))
                .await?)
        }
    }
}

fn arguments_object(arguments: &JsonValue) -> Result<Map<String, JsonValue>, ToolError> {
    match arguments {
        JsonValue::Object(map) => Ok(map.clone()),
        JsonValue::Null => Ok(Map::new()),
        _ => Err(ToolError::validation("Tool arguments must be a JSON object")),
    }
}

/// Present and not `null`
fn field<'a>(args: &'a Map<String, JsonValue>, key: &str) -> Option<&'a JsonValue> {
    args.get(key).filter(|value| !value.is_null())
}

fn required_text(args: &Map<String, JsonValue>, key: &str) -> Result<String, ToolError> {
    match field(args, key) {
        Some(JsonValue::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(JsonValue::String(_)) | None => {
            Err(ToolError::validation(format!("{key} is required and must not be empty")))
        }
        Some(_) => Err(ToolError::validation(format!("{key} must be a string"))),
    }
}

fn optional_number(args: &Map<String, JsonValue>, key: &str) -> Result<Option<f64>, ToolError> {
    match field(args, key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .filter(|number| number.is_finite())
            .map(Some)
            .ok_or_else(|| ToolError::validation(format!("{key} must be a number"))),
    }
}

fn optional_bool(args: &Map<String, JsonValue>, key: &str) -> Result<Option<bool>, ToolError> {
    match field(args, key) {
        None => Ok(None),
        Some(JsonValue::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(ToolError::validation(format!("{key} must be a boolean"))),
    }
}

fn optional_text<'a>(
    args: &'a Map<String, JsonValue>,
    key: &str,
) -> Result<Option<&'a str>, ToolError> {
    match field(args, key) {
        None => Ok(None),
        Some(JsonValue::String(text)) => Ok(Some(text.as_str())),
        Some(_) => Err(ToolError::validation(format!("{key} must be a string"))),
    }
}

/// `HH:MM` on a 24-hour clock
fn parse_time_of_day(value: &str) -> Option<String> {
    let value = value.trim();
    let (hours, minutes) = value.split_once(':')?;
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return None;
    }
    let hours: u8 = hours.parse().ok()?;
    let minutes: u8 = minutes.parse().ok()?;
    (hours < 24 && minutes < 60).then(|| value.to_string())
}

/// Whole minutes for a one-off delay: rounded, never below one
fn delay_to_minutes(delay: f64) -> u64 {
    delay.round().max(1.0) as u64
}

/// Normalize `schedule_task` arguments into a create request.
///
/// Exactly one trigger must be given: `delay_minutes` alone (a one-shot
/// run), or `interval_value` together with `interval_unit`.
pub fn build_create_params(arguments: &JsonValue) -> Result<CreateTaskParams, ToolError> {
    let args = arguments_object(arguments)?;

    let name = required_text(&args, "name")?;
    let prompt = required_text(&args, "prompt")?;

    let delay = optional_number(&args, "delay_minutes")?;
    let interval_value = optional_number(&args, "interval_value")?;
    let interval_unit = match optional_text(&args, "interval_unit")? {
        None => None,
        Some(unit) => Some(IntervalUnit::parse(unit.trim()).ok_or_else(|| {
            ToolError::validation(format!(
                "interval_unit must be one of {}, got '{}'",
                IntervalUnit::ALL.join(", "),
                unit
            ))
        })?),
    };
    let one_shot = optional_bool(&args, "one_shot")?;
    let schedule_time = optional_text(&args, "schedule_time")?;

    match (delay, interval_value, interval_unit) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(ToolError::validation(
            "Use either delay_minutes or interval_value with interval_unit, not both",
        )),
        (Some(delay), None, None) => Ok(CreateTaskParams {
            name,
            prompt,
            interval_value: delay_to_minutes(delay),
            interval_unit: IntervalUnit::Minutes,
            one_shot: true,
            schedule_time: None,
        }),
        (None, Some(value), Some(unit)) => {
            if value < 1.0 {
                return Err(ToolError::validation("interval_value must be at least 1"));
            }

            let schedule_time = match (unit, schedule_time) {
                (IntervalUnit::Days, Some(time)) => Some(parse_time_of_day(time).ok_or_else(|| {
                    ToolError::validation(format!("schedule_time must be HH:MM, got '{time}'"))
                })?),
                (_, Some(time)) => {
                    debug!(schedule_time = time, "Ignoring schedule_time for non-daily interval");
                    None
                }
                (_, None) => None,
            };

            Ok(CreateTaskParams {
                name,
                prompt,
                interval_value: value.round() as u64,
                interval_unit: unit,
                one_shot: one_shot.unwrap_or(false),
                schedule_time,
            })
        }
        (None, Some(_), None) => Err(ToolError::validation(
            "interval_unit is required when interval_value is set",
        )),
        (None, None, Some(_)) => Err(ToolError::validation(
            "interval_value is required when interval_unit is set",
        )),
        (None, None, None) => Err(ToolError::validation(
            "A trigger is required: set delay_minutes, or interval_value with interval_unit",
        )),
    }
}

/// Extract a positive task id from integer or numeric-string input
pub fn parse_task_id(arguments: &JsonValue) -> Result<u64, ToolError> {
    let args = arguments_object(arguments)?;

    let task_id = match field(&args, "task_id") {
        Some(JsonValue::Number(number)) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Some(JsonValue::String(text)) => text.trim().parse::<u64>().ok(),
        _ => None,
    };

    task_id
        .filter(|id| *id > 0)
        .ok_or_else(|| ToolError::validation("task_id is required and must be a positive integer"))
}
