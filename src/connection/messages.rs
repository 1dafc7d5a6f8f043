use serde::{Deserialize, Serialize};

/// Event message received from the wake word backend
///
/// The backend sends `{"type": "...", "message": "..."}`; `message` is
/// optional and unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DetectionEvent {
    pub fn wake_word() -> Self {
        Self {
            kind: "WakeWord".to_string(),
            message: Some("detected".to_string()),
        }
    }

    /// Parse one inbound text frame
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Only `{"type":"WakeWord","message":"detected"}` triggers the chat surface
    pub fn is_wake_word(&self) -> bool {
        self.kind == "WakeWord" && self.message.as_deref() == Some("detected")
    }
}
