use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BuildError;

/// Free-form JSON object used for traits, properties, context and integration options.
pub type Properties = Map<String, Value>;

/// The six calls supported by the tracking API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Identify,
    Track,
    Page,
    Screen,
    Group,
    Alias,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Identify => "identify",
            MessageKind::Track => "track",
            MessageKind::Page => "page",
            MessageKind::Screen => "screen",
            MessageKind::Group => "group",
            MessageKind::Alias => "alias",
        }
    }
}

impl FromStr for MessageKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identify" => Ok(MessageKind::Identify),
            "track" => Ok(MessageKind::Track),
            "page" => Ok(MessageKind::Page),
            "screen" => Ok(MessageKind::Screen),
            "group" => Ok(MessageKind::Group),
            "alias" => Ok(MessageKind::Alias),
            invalid => Err(BuildError::InvalidEventKind(Some(invalid.to_owned()))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-destination setting: either a plain toggle or options that implicitly enable it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum IntegrationSetting {
    Enabled(bool),
    Options(Properties),
}

/// Fields shared by every message kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub message_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Properties>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub integrations: BTreeMap<String, IntegrationSetting>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            timestamp: OffsetDateTime::now_utc(),
            user_id: None,
            anonymous_id: None,
            context: None,
            integrations: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyMessage {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub traits: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMessage {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub event: String,
    pub properties: Properties,
}

/// Shared shape of page and screen views. At least one of `name` or `category` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMessage {
    #[serde(flatten)]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub group_id: String,
    pub traits: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasMessage {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub previous_id: String,
}

/// A validated message, serialized in the tracking API's wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypedMessage {
    Identify(IdentifyMessage),
    Track(TrackMessage),
    Page(ViewMessage),
    Screen(ViewMessage),
    Group(GroupMessage),
    Alias(AliasMessage),
}

impl TypedMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            TypedMessage::Identify(_) => MessageKind::Identify,
            TypedMessage::Track(_) => MessageKind::Track,
            TypedMessage::Page(_) => MessageKind::Page,
            TypedMessage::Screen(_) => MessageKind::Screen,
            TypedMessage::Group(_) => MessageKind::Group,
            TypedMessage::Alias(_) => MessageKind::Alias,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            TypedMessage::Identify(m) => &m.metadata,
            TypedMessage::Track(m) => &m.metadata,
            TypedMessage::Page(m) | TypedMessage::Screen(m) => &m.metadata,
            TypedMessage::Group(m) => &m.metadata,
            TypedMessage::Alias(m) => &m.metadata,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.metadata().message_id
    }
}
