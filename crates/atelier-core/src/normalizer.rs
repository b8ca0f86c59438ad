//! Message normalizer
//!
//! Chat history arrives as UI messages made of typed parts. Before the model
//! sees a user turn, its text, attached images and selected styles are
//! folded into one JSON context object so the model always gets the same
//! shape regardless of what the UI attached.

use crate::error::{Error, Result};
use atelier_llm::{Message, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// Wire types
// ============================================================================

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user
    User,
    /// The assistant
    Assistant,
    /// System instructions
    System,
}

/// One message of the chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message id assigned by the UI
    #[serde(default)]
    pub id: String,
    /// Author
    pub role: Role,
    /// Ordered content parts
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    /// Message with the given parts
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: id.into(),
            role,
            parts,
        }
    }

    /// Single-part user text message
    #[must_use]
    pub fn user_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, vec![MessagePart::text(text)])
    }
}

/// Style selected in the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoraSelection {
    /// Style id
    #[serde(default)]
    pub id: String,
    /// Display name
    pub name: String,
    /// LoRA weights URL, empty when the style has none
    #[serde(default)]
    pub lora_url: String,
    /// Word that activates the style in a prompt
    #[serde(default)]
    pub trigger_word: String,
}

/// A past tool invocation kept in assistant history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPart {
    /// Tool name, taken from the `tool-<name>` tag
    #[serde(skip)]
    pub tool_name: String,
    /// Tool call id
    pub tool_call_id: String,
    /// UI state (`input-available`, `output-available`, `output-error`, ...)
    #[serde(default)]
    pub state: String,
    /// Arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

/// One content part of a chat message, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum MessagePart {
    /// `text`
    Text {
        /// The text
        text: String,
    },
    /// `file`: an attached image
    File {
        /// Image URL (http(s) or data URL)
        url: String,
        /// Original file name
        filename: Option<String>,
        /// MIME type
        media_type: Option<String>,
    },
    /// `data-lora-selection`
    LoraSelection(LoraSelection),
    /// `data-image-generation`
    ImageGeneration {
        /// Tool call id
        id: Option<String>,
        /// Status payload
        data: Value,
    },
    /// `data-image-description`
    ImageDescription {
        /// Tool call id
        id: Option<String>,
        /// Description payload
        data: Value,
    },
    /// `tool-<name>`
    Tool(ToolPart),
    /// `step-start`
    StepStart,
    /// Anything else; kept verbatim and ignored by the model conversion
    Other(Value),
}

impl MessagePart {
    /// `text` part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// `file` part with only a URL
    #[must_use]
    pub fn file(url: impl Into<String>) -> Self {
        Self::File {
            url: url.into(),
            filename: None,
            media_type: None,
        }
    }

    /// Wire tag of this part
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::Text { .. } => "text".to_string(),
            Self::File { .. } => "file".to_string(),
            Self::LoraSelection(_) => "data-lora-selection".to_string(),
            Self::ImageGeneration { .. } => "data-image-generation".to_string(),
            Self::ImageDescription { .. } => "data-image-description".to_string(),
            Self::Tool(part) => format!("tool-{}", part.tool_name),
            Self::StepStart => "step-start".to_string(),
            Self::Other(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFields {
    url: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
}

#[derive(Deserialize)]
struct DataFields<T> {
    #[serde(default)]
    id: Option<String>,
    data: T,
}

impl TryFrom<Value> for MessagePart {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(name) = kind.strip_prefix("tool-") {
            let mut part: ToolPart = serde_json::from_value(value)?;
            part.tool_name = name.to_string();
            return Ok(Self::Tool(part));
        }

        Ok(match kind.as_str() {
            "text" => Self::Text {
                text: value
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            "file" => {
                let f: FileFields = serde_json::from_value(value)?;
                Self::File {
                    url: f.url,
                    filename: f.filename,
                    media_type: f.media_type,
                }
            }
            "data-lora-selection" => {
                let d: DataFields<LoraSelection> = serde_json::from_value(value)?;
                Self::LoraSelection(d.data)
            }
            "data-image-generation" => {
                let d: DataFields<Value> = serde_json::from_value(value)?;
                Self::ImageGeneration {
                    id: d.id,
                    data: d.data,
                }
            }
            "data-image-description" => {
                let d: DataFields<Value> = serde_json::from_value(value)?;
                Self::ImageDescription {
                    id: d.id,
                    data: d.data,
                }
            }
            "step-start" => Self::StepStart,
            _ => Self::Other(value),
        })
    }
}

impl From<MessagePart> for Value {
    fn from(part: MessagePart) -> Self {
        match part {
            MessagePart::Text { text } => json!({ "type": "text", "text": text }),
            MessagePart::File {
                url,
                filename,
                media_type,
            } => {
                let mut value = json!({ "type": "file", "url": url });
                if let Some(name) = filename {
                    value["filename"] = json!(name);
                }
                if let Some(media_type) = media_type {
                    value["mediaType"] = json!(media_type);
                }
                value
            }
            MessagePart::LoraSelection(sel) => json!({
                "type": "data-lora-selection",
                "data": {
                    "id": sel.id,
                    "name": sel.name,
                    "loraUrl": sel.lora_url,
                    "triggerWord": sel.trigger_word,
                }
            }),
            MessagePart::ImageGeneration { id, data } => {
                data_part("data-image-generation", id, data)
            }
            MessagePart::ImageDescription { id, data } => {
                data_part("data-image-description", id, data)
            }
            MessagePart::Tool(part) => {
                let mut value = json!({
                    "type": format!("tool-{}", part.tool_name),
                    "toolCallId": part.tool_call_id,
                    "state": part.state,
                });
                if let Some(input) = part.input {
                    value["input"] = input;
                }
                if let Some(output) = part.output {
                    value["output"] = output;
                }
                if let Some(error_text) = part.error_text {
                    value["errorText"] = json!(error_text);
                }
                value
            }
            MessagePart::StepStart => json!({ "type": "step-start" }),
            MessagePart::Other(value) => value,
        }
    }
}

fn data_part(kind: &str, id: Option<String>, data: Value) -> Value {
    let mut value = json!({ "type": kind, "data": data });
    if let Some(id) = id {
        value["id"] = json!(id);
    }
    value
}

// ============================================================================
// Normalization
// ============================================================================

/// Context object the model receives for every user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    /// Text parts joined with single spaces
    pub user_prompt: String,
    /// Attached image URLs, `null` when none
    pub image_attached: Option<Vec<String>>,
    /// Selected styles, `null` when none
    pub lora_selected: Option<Vec<LoraContext>>,
}

/// Selected style as the model sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoraContext {
    /// Display name
    pub name: String,
    /// LoRA weights URL
    pub lora_url: Option<String>,
    /// Trigger word
    pub lora_trigger_word: Option<String>,
}

impl TurnContext {
    /// Collect the context of one user message
    #[must_use]
    pub fn from_parts(parts: &[MessagePart]) -> Self {
        let mut texts = Vec::new();
        let mut images = Vec::new();
        let mut loras = Vec::new();

        for part in parts {
            match part {
                MessagePart::Text { text } => texts.push(text.as_str()),
                MessagePart::File { url, .. } => images.push(url.clone()),
                MessagePart::LoraSelection(sel) => loras.push(LoraContext {
                    name: sel.name.clone(),
                    lora_url: non_empty(&sel.lora_url),
                    lora_trigger_word: non_empty(&sel.trigger_word),
                }),
                _ => {}
            }
        }

        Self {
            user_prompt: texts.join(" "),
            image_attached: (!images.is_empty()).then_some(images),
            lora_selected: (!loras.is_empty()).then_some(loras),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Fold every user message into a single text part holding its [`TurnContext`]
///
/// Assistant and system messages pass through unchanged.
///
/// # Errors
///
/// Returns `Error::Internal` if a context cannot be serialized.
pub fn normalize_messages(messages: &[ChatMessage]) -> Result<Vec<ChatMessage>> {
    messages
        .iter()
        .map(|msg| {
            if msg.role != Role::User {
                return Ok(msg.clone());
            }
            let context = TurnContext::from_parts(&msg.parts);
            let text = serde_json::to_string(&context)
                .map_err(|e| Error::Internal(format!("Failed to serialize turn context: {}", e)))?;
            Ok(ChatMessage::new(
                msg.id.clone(),
                Role::User,
                vec![MessagePart::text(text)],
            ))
        })
        .collect()
}

// ============================================================================
// Model conversion
// ============================================================================

/// Convert chat history into provider messages
///
/// Each `step-start` in an assistant message opens a new model step. A step
/// becomes one assistant message (its text and tool calls) followed by one
/// tool message per finished call. Data parts never reach the model.
#[must_use]
pub fn to_model_messages(messages: &[ChatMessage]) -> Vec<Message> {
    let mut out = Vec::new();

    for msg in messages {
        match msg.role {
            Role::User => out.push(Message::user(join_text(&msg.parts))),
            Role::System => out.push(Message::system(join_text(&msg.parts))),
            Role::Assistant => {
                for step in msg.parts.split(|p| matches!(p, MessagePart::StepStart)) {
                    push_assistant_step(&mut out, step);
                }
            }
        }
    }

    out
}

fn join_text(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_assistant_step(out: &mut Vec<Message>, parts: &[MessagePart]) {
    let mut text = String::new();
    let mut calls = Vec::new();
    let mut results = Vec::new();

    for part in parts {
        match part {
            MessagePart::Text { text: t } => text.push_str(t),
            MessagePart::Tool(tool) => {
                let content = match (&tool.output, &tool.error_text) {
                    (Some(output), _) => output.to_string(),
                    (None, Some(err)) => json!({ "error": err }).to_string(),
                    // never finished; the model must not see a dangling call
                    (None, None) => continue,
                };
                let arguments = tool
                    .input
                    .as_ref()
                    .map_or_else(|| "{}".to_string(), Value::to_string);
                calls.push(ToolCall::new(&tool.tool_call_id, &tool.tool_name, arguments));
                results.push(Message::tool_response(&tool.tool_call_id, content));
            }
            _ => {}
        }
    }

    if calls.is_empty() {
        if !text.is_empty() {
            out.push(Message::assistant(text));
        }
        return;
    }

    out.push(Message::assistant_with_tool_calls(text, calls));
    out.extend(results);
}
