//! Message protocol between the UI surface and the view
//!
//! Requests arrive as `{id, type, data?}` JSON. Each known `type` maps to one
//! `Request` variant; unknown types and malformed `data` are rejected so the
//! caller can log and drop them. Replies echo `id` and `type` and carry the
//! result in `data`. `token-changed` is pushed without an `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::notify::MessageApiCall;

pub const GET_NOTICE: &str = "get-notice";
pub const GET_TOKEN: &str = "get-token";
pub const SET_TOKEN: &str = "set-token";
pub const VALIDATE_TOKEN: &str = "validate-token";
pub const CONNECT_TO_GITHUB: &str = "connect-to-github";
pub const CALL_MESSAGE_API: &str = "call-vscode-message-api";
pub const TOKEN_CHANGED: &str = "token-changed";

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetNotice,
    GetToken,
    /// Missing `data` stores the empty token
    SetToken(String),
    /// `None` validates the stored token; `Some("")` probes anonymously
    ValidateToken(Option<String>),
    ConnectToGithub,
    CallMessageApi(MessageApiCall),
}

impl Request {
    /// Wire `type` of this request, echoed in the reply.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetNotice => GET_NOTICE,
            Request::GetToken => GET_TOKEN,
            Request::SetToken(_) => SET_TOKEN,
            Request::ValidateToken(_) => VALIDATE_TOKEN,
            Request::ConnectToGithub => CONNECT_TO_GITHUB,
            Request::CallMessageApi(_) => CALL_MESSAGE_API,
        }
    }
}

/// A parsed inbound message: the caller's correlation id plus the request.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: Value,
    pub request: Request,
}

impl Envelope {
    /// Parse a raw surface message.
    ///
    /// `data: null` is treated the same as an omitted `data`.
    pub fn parse(raw: Value) -> Result<Self> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            id: Value,
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            data: Option<Value>,
        }

        let raw: Raw = serde_json::from_value(raw)
            .map_err(|e| Error::Protocol(format!("malformed message: {e}")))?;

        let request = match raw.kind.as_str() {
            GET_NOTICE => Request::GetNotice,
            GET_TOKEN => Request::GetToken,
            SET_TOKEN => Request::SetToken(optional_string(raw.data, SET_TOKEN)?.unwrap_or_default()),
            VALIDATE_TOKEN => Request::ValidateToken(optional_string(raw.data, VALIDATE_TOKEN)?),
            CONNECT_TO_GITHUB => Request::ConnectToGithub,
            CALL_MESSAGE_API => {
                let data = raw
                    .data
                    .ok_or_else(|| Error::Protocol(format!("{CALL_MESSAGE_API} needs data")))?;
                Request::CallMessageApi(MessageApiCall::from_data(data)?)
            }
            other => return Err(Error::Protocol(format!("unknown message type: {other}"))),
        };

        Ok(Self {
            id: raw.id,
            request,
        })
    }
}

fn optional_string(data: Option<Value>, kind: &str) -> Result<Option<String>> {
    match data {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(Error::Protocol(format!(
            "{kind} expects a string, got {other}"
        ))),
    }
}

/// Message posted from the view to the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "type")]
    pub kind: String,
    /// `None` omits the field; `Some(Value::Null)` sends an explicit null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl OutboundMessage {
    pub fn reply(id: Value, kind: &str, data: Option<Value>) -> Self {
        Self {
            id: Some(id),
            kind: kind.to_owned(),
            data,
        }
    }

    pub fn token_changed(token: &str) -> Self {
        Self {
            id: None,
            kind: TOKEN_CHANGED.to_owned(),
            data: Some(Value::String(token.to_owned())),
        }
    }
}
