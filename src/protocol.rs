//! Wire protocol for the status stream.
//!
//! Every inbound frame is a `{ "type": string, "data": object }` envelope.
//! Recognized types map onto a closed [`StreamMessage`] union; anything
//! with a `type` the dashboard does not know decodes to `Unrecognized` so
//! the caller can count it as a no-op. A frame missing `type` or `data`,
//! or whose payload does not deserialize, is a [`DecodeError`] — dropped
//! with a diagnostic, never fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{ExperimentSettings, RunningUpdate, ScoreRecord, StatusSnapshot};

pub const STATUS_ENDPOINT: &str = "/ws/status";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Closed union of inbound stream messages.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Status(StatusSnapshot),
    Config(ExperimentSettings),
    Running(Vec<RunningUpdate>),
    Scores(Vec<ScoreRecord>),
    Heartbeat(Heartbeat),
    Unrecognized { kind: String },
}

impl StreamMessage {
    pub fn kind(&self) -> &str {
        match self {
            StreamMessage::Status(_) => "status_update",
            StreamMessage::Config(_) => "experiment_config",
            StreamMessage::Running(_) => "running_update",
            StreamMessage::Scores(_) => "scores_overview",
            StreamMessage::Heartbeat(_) => "heartbeat",
            StreamMessage::Unrecognized { .. } => "unrecognized",
        }
    }
}

#[derive(Debug)]
pub enum DecodeError {
    /// Not JSON at all.
    NotJson(serde_json::Error),
    /// Envelope missing `type` or `data`.
    MissingField(&'static str),
    /// Recognized `type` whose payload does not fit its schema.
    BadPayload { kind: String, err: serde_json::Error },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::NotJson(err) => write!(f, "frame is not json: {}", err),
            DecodeError::MissingField(field) => write!(f, "envelope missing `{}`", field),
            DecodeError::BadPayload { kind, err } => {
                write!(f, "bad `{}` payload: {}", kind, err)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode one text frame into a stream message.
pub fn decode(text: &str) -> Result<StreamMessage, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::NotJson)?;
    let kind = envelope.kind.ok_or(DecodeError::MissingField("type"))?;
    let data = envelope.data.ok_or(DecodeError::MissingField("data"))?;

    let msg = match kind.as_str() {
        "status_update" => serde_json::from_value(data).map(StreamMessage::Status),
        "experiment_config" => serde_json::from_value(data).map(StreamMessage::Config),
        "running_update" => serde_json::from_value(data).map(StreamMessage::Running),
        "scores_overview" => serde_json::from_value(data).map(StreamMessage::Scores),
        "heartbeat" => serde_json::from_value(data).map(StreamMessage::Heartbeat),
        _ => return Ok(StreamMessage::Unrecognized { kind }),
    };
    msg.map_err(|err| DecodeError::BadPayload { kind, err })
}

/// Outbound control frame, sent only while the socket is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlMessage {
    pub action: String,
    pub payload: Option<Value>,
}

impl ControlMessage {
    pub fn run() -> Self {
        Self { action: "run".to_string(), payload: None }
    }

    pub fn stop() -> Self {
        Self { action: "stop".to_string(), payload: None }
    }

    /// The `{"type":"experiment_control","data":{...}}` wire form.
    pub fn to_frame(&self) -> String {
        serde_json::json!({
            "type": "experiment_control",
            "data": { "action": self.action, "payload": self.payload },
        })
        .to_string()
    }
}
