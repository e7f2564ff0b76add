use serde::{Deserialize, Serialize};

use crate::tone::Tone;

pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to rewrite. Please try again.";

/// Messages exchanged between the content script and the background context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionMessage {
    RequestRewrite { text: String, mode: Tone },
    OpenRewritePopup { text: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponseMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RewriteResponseMessage {
    pub fn success(rewritten_text: impl Into<String>) -> Self {
        Self {
            rewritten_text: Some(rewritten_text.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            rewritten_text: None,
            error: Some(error.into()),
        }
    }

    /// An `error` wins over text; a response carrying neither is a generic failure.
    pub fn into_outcome(self) -> Result<String, String> {
        if let Some(error) = self.error {
            return Err(error);
        }

        match self.rewritten_text {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(GENERIC_FAILURE_MESSAGE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_message_uses_wire_tag() {
        let message = ExtensionMessage::RequestRewrite {
            text: "hello".to_string(),
            mode: Tone::Clarity,
        };
        let serialized = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            serialized,
            serde_json::json!({"type": "REQUEST_REWRITE", "text": "hello", "mode": "clarity"})
        );
    }

    #[test]
    fn open_popup_message_parses_from_wire() {
        let parsed: ExtensionMessage =
            serde_json::from_str(r#"{"type":"OPEN_REWRITE_POPUP","text":"draft"}"#)
                .expect("parse");
        assert_eq!(
            parsed,
            ExtensionMessage::OpenRewritePopup {
                text: "draft".to_string()
            }
        );
    }

    #[test]
    fn response_outcome_prefers_error() {
        let response = RewriteResponseMessage {
            rewritten_text: Some("text".to_string()),
            error: Some("boom".to_string()),
        };
        assert_eq!(response.into_outcome(), Err("boom".to_string()));
        assert_eq!(
            RewriteResponseMessage::default().into_outcome(),
            Err(GENERIC_FAILURE_MESSAGE.to_string())
        );
    }

    #[test]
    fn success_response_omits_error_field() {
        let serialized =
            serde_json::to_string(&RewriteResponseMessage::success("done")).expect("serialize");
        assert_eq!(serialized, r#"{"rewrittenText":"done"}"#);
    }
}
