//! Notification collaborator
//!
//! The surface may ask the host to show a notification
//! (`call-vscode-message-api`), and the view reports provider-side OAuth
//! errors the same way. The level string from the wire maps onto a fixed
//! `MessageLevel`; anything else is rejected.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    #[serde(alias = "information")]
    Info,
    Warning,
    Error,
}

/// One notification request: a message, optional modality, and the action
/// items offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageApiCall {
    pub level: MessageLevel,
    pub message: String,
    pub modal: bool,
    pub items: Vec<String>,
}

impl MessageApiCall {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            message: message.into(),
            modal: false,
            items: Vec::new(),
        }
    }

    /// Parse the `{level, args}` payload of a `call-vscode-message-api` request.
    ///
    /// `args` is `[message, ...rest]` where each rest element is either an item
    /// label or an options object (`{"modal": true}`).
    pub fn from_data(data: Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct Raw {
            level: MessageLevel,
            #[serde(default)]
            args: Vec<Value>,
        }

        let raw: Raw = serde_json::from_value(data)
            .map_err(|e| Error::Protocol(format!("invalid message api call: {e}")))?;

        let mut args = raw.args.into_iter();
        let message = match args.next() {
            Some(Value::String(message)) => message,
            _ => {
                return Err(Error::Protocol(
                    "message api call needs a message string".into(),
                ));
            }
        };

        let mut modal = false;
        let mut items = Vec::new();
        for arg in args {
            match arg {
                Value::String(item) => items.push(item),
                Value::Object(options) => {
                    modal |= options.get("modal").and_then(Value::as_bool).unwrap_or(false);
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unsupported message api argument: {other}"
                    )));
                }
            }
        }

        Ok(Self {
            level: raw.level,
            message,
            modal,
            items,
        })
    }
}

/// Host notification API.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Notifier>`).
pub trait Notifier: Send + Sync {
    /// Show a notification. Resolves with the item the user picked, if any.
    fn show<'a>(
        &'a self,
        call: &'a MessageApiCall,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_message_and_items() {
        let call = MessageApiCall::from_data(json!({
            "level": "warning",
            "args": ["Token is about to run out", "Retry", "Cancel"]
        }))
        .unwrap();

        assert_eq!(call.level, MessageLevel::Warning);
        assert_eq!(call.message, "Token is about to run out");
        assert_eq!(call.items, vec!["Retry", "Cancel"]);
        assert!(!call.modal);
    }

    #[test]
    fn options_object_sets_modal() {
        let call = MessageApiCall::from_data(json!({
            "level": "info",
            "args": ["Signed in", { "modal": true }, "OK"]
        }))
        .unwrap();

        assert_eq!(call.level, MessageLevel::Info);
        assert!(call.modal);
        assert_eq!(call.items, vec!["OK"]);
    }

    #[test]
    fn information_alias_is_accepted() {
        let call =
            MessageApiCall::from_data(json!({ "level": "information", "args": ["hi"] })).unwrap();
        assert_eq!(call.level, MessageLevel::Info);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let result = MessageApiCall::from_data(json!({ "level": "shout", "args": ["hi"] }));
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn missing_message_is_rejected() {
        let result = MessageApiCall::from_data(json!({ "level": "error", "args": [] }));
        assert!(matches!(result, Err(Error::Protocol(_))));

        let result = MessageApiCall::from_data(json!({ "level": "error", "args": [42] }));
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
