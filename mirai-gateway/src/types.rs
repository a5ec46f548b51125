// ABOUTME: Payload and roster types exchanged with the mirai gateway.
// ABOUTME: Inbound items stay opaque JSON tagged with a normalized type discriminator.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Chat message kinds the gateway tags with a fixed enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageItemType {
    GroupMessage,
    FriendMessage,
    TempMessage,
}

impl MessageItemType {
    /// Wire name, also used as the dispatch key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GroupMessage => "GroupMessage",
            Self::FriendMessage => "FriendMessage",
            Self::TempMessage => "TempMessage",
        }
    }

    /// Resolve a wire name into a message kind, if it is one
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "GroupMessage" => Some(Self::GroupMessage),
            "FriendMessage" => Some(Self::FriendMessage),
            "TempMessage" => Some(Self::TempMessage),
            _ => None,
        }
    }
}

impl fmt::Display for MessageItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type discriminator attached to every fetched item.
///
/// Chat messages carry an enumerated tag; everything else (member joins,
/// bot going offline, ...) keeps the raw event type string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Message(MessageItemType),
    Event(String),
}

impl TypeTag {
    /// Classify a raw `type` field
    pub fn parse(raw: &str) -> Self {
        match MessageItemType::from_wire(raw) {
            Some(kind) => Self::Message(kind),
            None => Self::Event(raw.to_string()),
        }
    }

    /// The string the dispatch table is keyed by
    pub fn name(&self) -> &str {
        match self {
            Self::Message(kind) => kind.as_str(),
            Self::Event(raw) => raw,
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }
}

/// One inbound item: a chat message or a gateway event.
///
/// The payload is kept as the gateway sent it; handlers pick out the
/// fields they care about.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOrEvent {
    pub tag: TypeTag,
    pub payload: Value,
}

impl MessageOrEvent {
    pub fn new(tag: TypeTag, payload: Value) -> Self {
        Self { tag, payload }
    }

    /// Parse an item from its JSON form, reading the `type` field
    pub fn from_json(payload: Value) -> Result<Self> {
        let raw = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Inbound item has no string 'type' field: {}", payload))?;
        Ok(Self {
            tag: TypeTag::parse(raw),
            payload,
        })
    }

    /// Sender id for chat messages (`sender.id`)
    pub fn sender_id(&self) -> Option<i64> {
        self.payload.get("sender")?.get("id")?.as_i64()
    }

    /// Group id for group messages (`sender.group.id`)
    pub fn group_id(&self) -> Option<i64> {
        self.payload.get("sender")?.get("group")?.get("id")?.as_i64()
    }

    /// The message chain of a chat message, if present
    pub fn message_chain(&self) -> Option<&Value> {
        self.payload.get("messageChain")
    }
}

/// Bot's permission level inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Owner,
    Administrator,
    Member,
}

/// A group the bot account has joined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub permission: Permission,
}

/// A friend of the bot account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub remark: String,
}

/// Raw response of the authenticate call.
///
/// Only the shape is captured here; deciding whether it means success,
/// an invalid key, or something unexpected is the session's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl AuthResponse {
    pub fn success(session_key: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            session: Some(session_key.into()),
            msg: None,
        }
    }

    pub fn invalid_key() -> Self {
        Self {
            code: Some(1),
            session: None,
            msg: None,
        }
    }
}
