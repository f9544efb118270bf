//! Message - the unit routed by dispatchers
//!
//! A message wraps at most one tagged payload. The payload kind is checked on
//! extraction, so asking for the wrong type yields `None` or a
//! [`HandlerError::UnexpectedPayload`] instead of reading garbage.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::HandlerError;

/// Payload carried by a [`Message`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Opaque binary blob (zero-copy clone)
    Bytes(Bytes),
    /// Structured data
    Json(serde_json::Value),
}

impl Payload {
    /// Kind tag of this payload
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Bool(_) => PayloadKind::Bool,
            Self::Int(_) => PayloadKind::Int,
            Self::Float(_) => PayloadKind::Float,
            Self::Text(_) => PayloadKind::Text,
            Self::Bytes(_) => PayloadKind::Bytes,
            Self::Json(_) => PayloadKind::Json,
        }
    }
}

/// Payload kind, used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Message carries no payload
    Empty,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

macro_rules! impl_payload_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$variant(value.into())
                }
            }

            impl From<$ty> for Message {
                fn from(value: $ty) -> Self {
                    Message::new(value)
                }
            }
        )*
    };
}

impl_payload_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    &str => Text,
    Bytes => Bytes,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
}

/// Immutable message with an optional payload
///
/// Once built the payload is never mutated; replace the whole message instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    content: Option<Payload>,
}

impl Message {
    /// Create a message without payload
    pub fn empty() -> Self {
        Self { content: None }
    }

    /// Create a message wrapping `value`
    pub fn new(value: impl Into<Payload>) -> Self {
        Self {
            content: Some(value.into()),
        }
    }

    /// Whether the message carries a payload
    pub fn is_valid(&self) -> bool {
        self.content.is_some()
    }

    /// Read-only access to the payload
    pub fn content(&self) -> Option<&Payload> {
        self.content.as_ref()
    }

    /// Kind of the wrapped payload ([`PayloadKind::Empty`] when none)
    pub fn kind(&self) -> PayloadKind {
        self.content
            .as_ref()
            .map_or(PayloadKind::Empty, Payload::kind)
    }

    /// Consume the message and return its payload
    pub fn into_content(self) -> Option<Payload> {
        self.content
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.content {
            Some(Payload::Bool(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.content {
            Some(Payload::Int(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.content {
            Some(Payload::Float(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            Some(Payload::Text(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.content {
            Some(Payload::Bytes(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match &self.content {
            Some(Payload::Json(v)) => Some(v),
            _ => None,
        }
    }

    /// Text payload, or an `UnexpectedPayload` error naming `key`
    pub fn expect_text(&self, key: &str) -> Result<&str, HandlerError> {
        self.as_text()
            .ok_or_else(|| self.unexpected(key, PayloadKind::Text))
    }

    /// Integer payload, or an `UnexpectedPayload` error naming `key`
    pub fn expect_int(&self, key: &str) -> Result<i64, HandlerError> {
        self.as_int()
            .ok_or_else(|| self.unexpected(key, PayloadKind::Int))
    }

    /// JSON payload, or an `UnexpectedPayload` error naming `key`
    pub fn expect_json(&self, key: &str) -> Result<&serde_json::Value, HandlerError> {
        self.as_json()
            .ok_or_else(|| self.unexpected(key, PayloadKind::Json))
    }

    fn unexpected(&self, key: &str, expected: PayloadKind) -> HandlerError {
        HandlerError::UnexpectedPayload {
            key: key.to_string(),
            expected,
            actual: self.kind(),
        }
    }
}

impl From<Payload> for Message {
    fn from(payload: Payload) -> Self {
        Self {
            content: Some(payload),
        }
    }
}
