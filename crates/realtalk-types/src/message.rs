//! Control-channel wire messages.
//!
//! Every frame on the data channel is a UTF-8 JSON object whose `type`
//! string is the only discriminator. Inbound frames are parsed into
//! [`ServerEvent`]; a `type` this client does not know becomes
//! [`ServerEvent::Unknown`] instead of an error. Outbound frames are only
//! ever produced from [`ClientEvent`], so nothing malformed can be sent.

use crate::tool::ToolCallRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages received from the realtime endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "speech.start", alias = "input_audio_buffer.speech_started")]
    SpeechStart,

    #[serde(rename = "speech.end", alias = "input_audio_buffer.speech_stopped")]
    SpeechEnd,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<ServerErrorDetail>,
    },

    #[serde(rename = "response.create", alias = "response.created")]
    ResponseCreate,

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<ResponseBody>,
    },

    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Parses one text frame.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpeechStart => "speech.start",
            Self::SpeechEnd => "speech.end",
            Self::Error { .. } => "error",
            Self::ResponseCreate => "response.create",
            Self::ResponseDone { .. } => "response.done",
            Self::Unknown => "unknown",
        }
    }

    /// The first `function_call` output item of a `response.done`, if any.
    pub fn function_call(&self) -> Option<ToolCallRequest> {
        let Self::ResponseDone {
            response: Some(response),
        } = self
        else {
            return None;
        };

        response.output.iter().find_map(|item| match item {
            OutputItem::FunctionCall {
                name,
                call_id,
                arguments,
            } => Some(ToolCallRequest::from_raw_arguments(name, call_id, arguments)),
            OutputItem::Other => None,
        })
    }

    /// Human-readable message carried by an `error` event.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Error { error } => Some(
                error
                    .as_ref()
                    .and_then(|detail| detail.message.clone())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            _ => None,
        }
    }
}

/// Body of an `error` event. Accepts a detail object, a bare string or
/// anything else; fields of the wrong shape are left empty.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "Value")]
pub struct ServerErrorDetail {
    pub message: Option<String>,
    pub code: Option<String>,
    pub kind: Option<String>,
}

impl From<Value> for ServerErrorDetail {
    fn from(value: Value) -> Self {
        match value {
            Value::String(message) => Self {
                message: Some(message),
                ..Self::default()
            },
            Value::Object(map) => {
                let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
                Self {
                    message: text("message"),
                    code: text("code"),
                    kind: text("type"),
                }
            }
            _ => Self::default(),
        }
    }
}

/// Body of a `response.done` event. An `output` that is not a list is
/// treated as empty.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "Value")]
pub struct ResponseBody {
    pub id: Option<String>,
    pub status: Option<String>,
    pub output: Vec<OutputItem>,
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };
        let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);
        let output = match map.remove("output") {
            Some(Value::Array(items)) => items.into_iter().map(OutputItem::from).collect(),
            _ => Vec::new(),
        };
        Self {
            id: text(map.get("id")),
            status: text(map.get("status")),
            output,
        }
    }
}

/// One entry of a response's output list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum OutputItem {
    FunctionCall {
        name: String,
        call_id: String,
        /// JSON-encoded argument object. An argument object sent inline
        /// is re-encoded.
        arguments: String,
    },
    Other,
}

impl From<Value> for OutputItem {
    fn from(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::Other;
        };
        if map.get("type").and_then(Value::as_str) != Some("function_call") {
            return Self::Other;
        }
        let (Some(name), Some(call_id)) = (
            map.get("name").and_then(Value::as_str),
            map.get("call_id").and_then(Value::as_str),
        ) else {
            return Self::Other;
        };
        let arguments = match map.get("arguments") {
            Some(Value::String(raw)) => raw.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self::FunctionCall {
            name: name.to_string(),
            call_id: call_id.to_string(),
            arguments,
        }
    }
}

/// Messages sent to the realtime endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseOptions>,
    },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    /// Best-effort keep-alive.
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl ClientEvent {
    /// A `response.create` with no overrides, resuming the assistant's turn.
    pub fn resume_response() -> Self {
        Self::ResponseCreate { response: None }
    }

    /// A `response.create` carrying turn-specific instructions.
    pub fn response_with_instructions(instructions: impl Into<String>) -> Self {
        Self::ResponseCreate {
            response: Some(ResponseOptions {
                instructions: Some(instructions.into()),
            }),
        }
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::ResponseCreate { .. } => "response.create",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
            Self::Heartbeat => "heartbeat",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Session-level configuration pushed once the data channel opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionConfig {
    pub instructions: String,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// A function the model may call, described with a JSON Schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_types_parse_as_unknown() {
        let event = ServerEvent::parse(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn frames_without_a_type_are_rejected() {
        assert!(ServerEvent::parse(r#"{"response":{}}"#).is_err());
        assert!(ServerEvent::parse("not json").is_err());
    }

    #[test]
    fn speech_markers_accept_native_names() {
        assert_eq!(
            ServerEvent::parse(r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":12}"#)
                .unwrap(),
            ServerEvent::SpeechStart
        );
        assert_eq!(
            ServerEvent::parse(r#"{"type":"speech.end"}"#).unwrap(),
            ServerEvent::SpeechEnd
        );
        assert_eq!(
            ServerEvent::parse(r#"{"type":"response.created","response":{"id":"r1"}}"#).unwrap(),
            ServerEvent::ResponseCreate
        );
    }

    #[test]
    fn error_event_exposes_message_or_fallback() {
        let event = ServerEvent::parse(r#"{"type":"error","error":{"message":"bad audio"}}"#).unwrap();
        assert_eq!(event.error_message().as_deref(), Some("bad audio"));

        let bare = ServerEvent::parse(r#"{"type":"error"}"#).unwrap();
        assert_eq!(bare.error_message().as_deref(), Some("Unknown error"));
    }

    #[test]
    fn response_done_yields_first_function_call() {
        let frame = json!({
            "type": "response.done",
            "response": {
                "output": [
                    {"type": "message", "content": []},
                    {
                        "type": "function_call",
                        "name": "save_message",
                        "call_id": "abc",
                        "arguments": "{\"name\":\"Jane\",\"message\":\"hi\"}"
                    },
                    {
                        "type": "function_call",
                        "name": "get_work_experience",
                        "call_id": "def",
                        "arguments": "{}"
                    }
                ]
            }
        })
        .to_string();

        let call = ServerEvent::parse(&frame).unwrap().function_call().unwrap();
        assert_eq!(call.name, "save_message");
        assert_eq!(call.call_id, "abc");
        assert_eq!(call.argument_str("name"), Some("Jane"));
    }

    #[test]
    fn error_detail_accepts_a_bare_string() {
        let event = ServerEvent::parse(r#"{"type":"error","error":"rate limited"}"#).unwrap();
        assert_eq!(event.error_message().as_deref(), Some("rate limited"));

        let event = ServerEvent::parse(r#"{"type":"error","error":{"message":42}}"#).unwrap();
        assert_eq!(event.error_message().as_deref(), Some("Unknown error"));

        let event = ServerEvent::parse(r#"{"type":"error","error":[1,2]}"#).unwrap();
        assert_eq!(event.error_message().as_deref(), Some("Unknown error"));
    }

    #[test]
    fn odd_output_items_do_not_reject_the_frame() {
        let untyped = ServerEvent::parse(
            r#"{"type":"response.done","response":{"output":[{"content":[]}]}}"#,
        )
        .unwrap();
        assert_eq!(untyped.kind(), "response.done");
        assert!(untyped.function_call().is_none());

        let not_a_list =
            ServerEvent::parse(r#"{"type":"response.done","response":{"output":"none"}}"#).unwrap();
        assert!(not_a_list.function_call().is_none());

        let inline = ServerEvent::parse(
            r#"{"type":"response.done","response":{"output":[{"type":"function_call","name":"save_message","call_id":"c9","arguments":{"name":"Jane","message":"hi"}}]}}"#,
        )
        .unwrap();
        let call = inline.function_call().unwrap();
        assert_eq!(call.call_id, "c9");
        assert_eq!(call.argument_str("name"), Some("Jane"));
    }

    #[test]
    fn response_done_without_output_has_no_call() {
        let event = ServerEvent::parse(r#"{"type":"response.done"}"#).unwrap();
        assert!(event.function_call().is_none());
        assert_eq!(event.kind(), "response.done");
    }

    #[test]
    fn outbound_shapes_match_the_wire_format() {
        let heartbeat = serde_json::to_value(ClientEvent::Heartbeat).unwrap();
        assert_eq!(heartbeat, json!({"type": "heartbeat"}));

        let resume = serde_json::to_value(ClientEvent::resume_response()).unwrap();
        assert_eq!(resume, json!({"type": "response.create"}));

        let output = serde_json::to_value(ClientEvent::function_call_output("abc", "{}")).unwrap();
        assert_eq!(
            output,
            json!({
                "type": "conversation.item.create",
                "item": {"type": "function_call_output", "call_id": "abc", "output": "{}"}
            })
        );
    }

    #[test]
    fn session_update_carries_tools_and_choice() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: "be brief".to_string(),
                tools: vec![ToolSchema::function("ping", "Ping", json!({"type": "object"}))],
                tool_choice: "auto".to_string(),
                voice: None,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["tool_choice"], "auto");
        assert_eq!(value["session"]["tools"][0]["type"], "function");
        assert!(value["session"].get("voice").is_none());
    }
}
