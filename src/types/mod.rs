use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form property/trait map attached to events.
pub type Properties = HashMap<String, serde_json::Value>;

/// A resolved feature flag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    String(String),
    Number(f64),
    Null,
    Json(serde_json::Value),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FlagValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FlagValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FlagValue::Null)
    }

    /// Whether this value switches a feature on.
    ///
    /// `true` and every string other than `"false"` and `"control"` are
    /// enabled. Numbers, objects and null never are.
    pub fn is_enabled(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::String(s) => s != "false" && s != "control",
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FlagValue::Bool(b) => serde_json::Value::Bool(*b),
            FlagValue::String(s) => serde_json::Value::String(s.clone()),
            FlagValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FlagValue::Null => serde_json::Value::Null,
            FlagValue::Json(v) => v.clone(),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::String(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::String(value.to_string())
    }
}

impl From<f64> for FlagValue {
    fn from(value: f64) -> Self {
        FlagValue::Number(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Number(value as f64)
    }
}

impl From<i32> for FlagValue {
    fn from(value: i32) -> Self {
        FlagValue::Number(value as f64)
    }
}

impl From<serde_json::Value> for FlagValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => FlagValue::Bool(b),
            serde_json::Value::String(s) => FlagValue::String(s),
            serde_json::Value::Number(n) => FlagValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::Null => FlagValue::Null,
            other => FlagValue::Json(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

/// One frame of a parsed stack trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colno: Option<u32>,
    pub in_app: bool,
}

/// Structured description of a captured error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    /// Error type name, e.g. `std::io::Error`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Rendered error message.
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<StackFrame>,
    /// Messages of the `source()` chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ExceptionInfo {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
            frames: Vec::new(),
            causes: Vec::new(),
        }
    }

    pub fn frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    pub event: String,
    pub distinct_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyEvent {
    pub distinct_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Properties>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEvent {
    pub group_id: String,
    pub distinct_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Properties>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionEvent {
    pub event_id: String,
    pub level: Severity,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    pub exception: ExceptionInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Properties>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Properties>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub event_id: String,
    pub level: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    pub timestamp: String,
}

/// A telemetry record, immutable once queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Track(TrackEvent),
    Identify(IdentifyEvent),
    Group(GroupEvent),
    Exception(ExceptionEvent),
    Message(MessageEvent),
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Event {
    pub fn track(
        distinct_id: impl Into<String>,
        event: impl Into<String>,
        properties: Option<Properties>,
    ) -> Self {
        Event::Track(TrackEvent {
            event: event.into(),
            distinct_id: distinct_id.into(),
            properties,
            timestamp: now_rfc3339(),
        })
    }

    pub fn identify(distinct_id: impl Into<String>, traits: Option<Properties>) -> Self {
        Event::Identify(IdentifyEvent {
            distinct_id: distinct_id.into(),
            traits,
            timestamp: now_rfc3339(),
        })
    }

    pub fn group(
        distinct_id: impl Into<String>,
        group_id: impl Into<String>,
        traits: Option<Properties>,
    ) -> Self {
        Event::Group(GroupEvent {
            group_id: group_id.into(),
            distinct_id: distinct_id.into(),
            traits,
            timestamp: now_rfc3339(),
        })
    }

    pub fn message(
        message: impl Into<String>,
        level: Severity,
        tags: HashMap<String, String>,
    ) -> Self {
        Event::Message(MessageEvent {
            event_id: new_event_id(),
            level,
            message: message.into(),
            tags,
            timestamp: now_rfc3339(),
        })
    }

    /// Wire tag of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Track(_) => "track",
            Event::Identify(_) => "identify",
            Event::Group(_) => "group",
            Event::Exception(_) => "exception",
            Event::Message(_) => "message",
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            Event::Track(e) => &e.timestamp,
            Event::Identify(e) => &e.timestamp,
            Event::Group(e) => &e.timestamp,
            Event::Exception(e) => &e.timestamp,
            Event::Message(e) => &e.timestamp,
        }
    }

    /// Id of `exception` and `message` records.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Event::Exception(e) => Some(&e.event_id),
            Event::Message(e) => Some(&e.event_id),
            _ => None,
        }
    }

    /// Event name for `track` records.
    pub fn name(&self) -> Option<&str> {
        match self {
            Event::Track(e) => Some(&e.event),
            _ => None,
        }
    }
}
