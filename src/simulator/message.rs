use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the simulated user sends
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// Plain typed text
    Text { body: String },
    /// Selection from an interactive list
    ListReply { id: String, title: String },
    /// Tap on an interactive reply button
    ButtonReply { id: String, title: String },
}

/// A single inbound message from the simulated user
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedMessage {
    /// Sender phone number. `None` uses the simulator's default sender.
    pub sender: Option<String>,
    pub kind: MessageKind,
}

impl SimulatedMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            sender: None,
            kind: MessageKind::Text { body: body.into() },
        }
    }

    /// Interactive list selection. The title falls back to the id.
    pub fn list_reply(id: impl Into<String>, title: Option<&str>) -> Self {
        let id = id.into();
        let title = title.map(str::to_string).unwrap_or_else(|| id.clone());
        Self {
            sender: None,
            kind: MessageKind::ListReply { id, title },
        }
    }

    /// Interactive button selection. The title falls back to the id.
    pub fn button_reply(id: impl Into<String>, title: Option<&str>) -> Self {
        let id = id.into();
        let title = title.map(str::to_string).unwrap_or_else(|| id.clone());
        Self {
            sender: None,
            kind: MessageKind::ButtonReply { id, title },
        }
    }

    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Human readable text of the message (body or selection title)
    pub fn display_text(&self) -> &str {
        match &self.kind {
            MessageKind::Text { body } => body,
            MessageKind::ListReply { title, .. } | MessageKind::ButtonReply { title, .. } => title,
        }
    }

    /// Convert to the provider's inbound message shape
    pub fn to_provider(&self, default_sender: &str) -> ProviderMessage {
        let from = self
            .sender
            .clone()
            .unwrap_or_else(|| default_sender.to_string());

        match &self.kind {
            MessageKind::Text { body } => ProviderMessage {
                from,
                kind: "text".to_string(),
                text: Some(TextBody { body: body.clone() }),
                interactive: None,
            },
            MessageKind::ListReply { id, title } => ProviderMessage {
                from,
                kind: "interactive".to_string(),
                text: None,
                interactive: Some(Interactive {
                    kind: "list_reply".to_string(),
                    list_reply: Some(Selection {
                        id: id.clone(),
                        title: title.clone(),
                    }),
                    button_reply: None,
                }),
            },
            MessageKind::ButtonReply { id, title } => ProviderMessage {
                from,
                kind: "interactive".to_string(),
                text: None,
                interactive: Some(Interactive {
                    kind: "button_reply".to_string(),
                    list_reply: None,
                    button_reply: Some(Selection {
                        id: id.clone(),
                        title: title.clone(),
                    }),
                }),
            },
        }
    }
}

/// WhatsApp Cloud API style webhook notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeValue {
    pub messages: Vec<ProviderMessage>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<Interactive>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interactive {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_reply: Option<Selection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_reply: Option<Selection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub id: String,
    pub title: String,
}

impl WebhookEnvelope {
    /// Wrap one message for the given channel (`phone_number_id`)
    pub fn wrap(message: ProviderMessage, channel_id: &str) -> Self {
        Self {
            entry: vec![Entry {
                changes: vec![Change {
                    value: ChangeValue {
                        messages: vec![message],
                        metadata: Metadata {
                            phone_number_id: channel_id.to_string(),
                        },
                    },
                }],
            }],
        }
    }
}

/// Reply content as the Dor app hands it to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyContent {
    #[serde(rename = "type", default = "default_reply_kind")]
    pub kind: String,
    pub content: String,
    /// Remaining provider fields (buttons, sections, business, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_reply_kind() -> String {
    "text".to_string()
}

impl ReplyContent {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: default_reply_kind(),
            content: content.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Locally synthesized stand-in used when the app gives no test-mode echo
    pub fn fallback_for(message: &SimulatedMessage) -> Self {
        let mut reply = Self::text(format!("Response to: {}", message.display_text()));
        reply
            .extra
            .insert("synthesized".to_string(), Value::Bool(true));
        reply
    }
}

/// Reply decoded once from the webhook response body
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The app echoed its real reply (test mode)
    Genuine(ReplyContent),
    /// No echo; content was synthesized by the harness and proves nothing
    Fallback(ReplyContent),
    /// The app sent a `response` without the expected shape
    Malformed(Value),
}

impl Reply {
    /// Decode a successful webhook response body
    pub fn decode(body: &[u8], message: &SimulatedMessage) -> Self {
        let parsed: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(_) => return Reply::Fallback(ReplyContent::fallback_for(message)),
        };

        match parsed.get("response") {
            None | Some(Value::Null) => Reply::Fallback(ReplyContent::fallback_for(message)),
            Some(raw) => match serde_json::from_value::<ReplyContent>(raw.clone()) {
                Ok(content) => Reply::Genuine(content),
                Err(_) => Reply::Malformed(raw.clone()),
            },
        }
    }

    pub fn is_test_mode(&self) -> bool {
        matches!(self, Reply::Genuine(_))
    }

    /// Content suitable for capture (genuine or synthesized)
    pub fn content(&self) -> Option<&ReplyContent> {
        match self {
            Reply::Genuine(c) | Reply::Fallback(c) => Some(c),
            Reply::Malformed(_) => None,
        }
    }

    pub fn genuine(&self) -> Option<&ReplyContent> {
        match self {
            Reply::Genuine(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_envelope_shape() {
        let msg = SimulatedMessage::text("Hi");
        let envelope = WebhookEnvelope::wrap(msg.to_provider("1234567890"), "123456789");
        let json = serde_json::to_value(&envelope).unwrap();

        let message = json.pointer("/entry/0/changes/0/value/messages/0").unwrap();
        assert_eq!(message["from"], "1234567890");
        assert_eq!(message["type"], "text");
        assert_eq!(message["text"]["body"], "Hi");
        assert!(message.get("interactive").is_none());
        assert_eq!(
            json.pointer("/entry/0/changes/0/value/metadata/phone_number_id")
                .unwrap(),
            "123456789"
        );
    }

    #[test]
    fn test_interactive_envelope_shapes() {
        let list = SimulatedMessage::list_reply("service_1", None).to_provider("1");
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["type"], "interactive");
        assert_eq!(json["interactive"]["type"], "list_reply");
        assert_eq!(json["interactive"]["list_reply"]["id"], "service_1");
        assert_eq!(json["interactive"]["list_reply"]["title"], "service_1");

        let button = SimulatedMessage::button_reply("main_book", Some("Book"))
            .from_sender("0535305225")
            .to_provider("1");
        let json = serde_json::to_value(&button).unwrap();
        assert_eq!(json["from"], "0535305225");
        assert_eq!(json["interactive"]["type"], "button_reply");
        assert_eq!(json["interactive"]["button_reply"]["title"], "Book");
        assert!(json["interactive"].get("list_reply").is_none());
    }

    #[test]
    fn test_decode_genuine_reply() {
        let body = br#"{"testMode":true,"response":{"type":"text","content":"Welcome! Please enter your name:"}}"#;
        let reply = Reply::decode(body, &SimulatedMessage::text("Hi"));
        assert!(reply.is_test_mode());
        assert_eq!(
            reply.genuine().unwrap().content,
            "Welcome! Please enter your name:"
        );
    }

    #[test]
    fn test_decode_keeps_extra_fields() {
        let body = br#"{"testMode":true,"response":{"type":"interactive","content":"Pick one","buttons":[{"id":"a"}]}}"#;
        let reply = Reply::decode(body, &SimulatedMessage::text("1"));
        let content = reply.genuine().unwrap();
        assert_eq!(content.kind, "interactive");
        assert!(content.extra.contains_key("buttons"));
    }

    #[test]
    fn test_decode_missing_content_is_malformed() {
        let body = br#"{"testMode":true,"response":{"type":"text"}}"#;
        let reply = Reply::decode(body, &SimulatedMessage::text("Hi"));
        assert!(matches!(reply, Reply::Malformed(_)));
        assert!(reply.content().is_none());
    }

    #[test]
    fn test_decode_without_echo_is_fallback() {
        let msg = SimulatedMessage::text("hello");
        for body in [&b"EVENT_RECEIVED"[..], &br#"{"status":"ok"}"#[..]] {
            let reply = Reply::decode(body, &msg);
            assert!(!reply.is_test_mode());
            match reply {
                Reply::Fallback(c) => assert_eq!(c.content, "Response to: hello"),
                other => panic!("expected fallback, got {:?}", other),
            }
        }
    }
}
