use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BuildError;
use crate::message::{
    AliasMessage, GroupMessage, IdentifyMessage, IntegrationSetting, MessageKind, Metadata,
    Properties, TrackMessage, TypedMessage, ViewMessage,
};
use crate::timestamp::parse_timestamp;

/// A loosely typed event description, as found in CLI input.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EventDescriptor(Properties);

impl From<Properties> for EventDescriptor {
    fn from(fields: Properties) -> Self {
        Self(fields)
    }
}

impl EventDescriptor {
    pub fn fields(&self) -> &Properties {
        &self.0
    }

    fn str_field(&self, field: &'static str) -> Result<Option<&str>, BuildError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(BuildError::InvalidField {
                field,
                expected: "a string",
            }),
        }
    }

    fn object_field(&self, field: &'static str) -> Result<Option<&Properties>, BuildError> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(BuildError::InvalidField {
                field,
                expected: "an object",
            }),
        }
    }

    /// A string field the message kind cannot do without. Empty strings count as missing.
    fn required_str(&self, kind: MessageKind, field: &'static str) -> Result<String, BuildError> {
        match self.str_field(field)? {
            Some(value) if !value.is_empty() => Ok(value.to_owned()),
            _ => Err(BuildError::MissingField { kind, field }),
        }
    }

    fn non_empty_str(&self, field: &'static str) -> Result<Option<String>, BuildError> {
        Ok(self
            .str_field(field)?
            .filter(|value| !value.is_empty())
            .map(str::to_owned))
    }

    fn object_or_empty(&self, field: &'static str) -> Result<Properties, BuildError> {
        Ok(self.object_field(field)?.cloned().unwrap_or_default())
    }
}

/// Turn an `EventDescriptor` into a `TypedMessage`, validating every field it carries.
pub fn build_message(descriptor: &EventDescriptor) -> Result<TypedMessage, BuildError> {
    let kind: MessageKind = match descriptor.0.get("type") {
        Some(Value::String(kind)) => kind.parse()?,
        _ => return Err(BuildError::InvalidEventKind(None)),
    };

    let metadata = build_metadata(descriptor)?;

    let message = match kind {
        MessageKind::Identify => TypedMessage::Identify(IdentifyMessage {
            metadata,
            traits: descriptor.object_or_empty("traits")?,
        }),
        MessageKind::Track => TypedMessage::Track(TrackMessage {
            metadata,
            event: descriptor.required_str(kind, "event")?,
            properties: descriptor.object_or_empty("properties")?,
        }),
        MessageKind::Page => TypedMessage::Page(build_view(kind, metadata, descriptor)?),
        MessageKind::Screen => TypedMessage::Screen(build_view(kind, metadata, descriptor)?),
        MessageKind::Group => TypedMessage::Group(GroupMessage {
            metadata,
            group_id: descriptor.required_str(kind, "groupId")?,
            traits: descriptor.object_or_empty("traits")?,
        }),
        MessageKind::Alias => TypedMessage::Alias(AliasMessage {
            metadata,
            previous_id: descriptor.required_str(kind, "previousId")?,
        }),
    };

    Ok(message)
}

fn build_view(
    kind: MessageKind,
    metadata: Metadata,
    descriptor: &EventDescriptor,
) -> Result<ViewMessage, BuildError> {
    let name = descriptor.non_empty_str("name")?;
    let category = descriptor.non_empty_str("category")?;

    if name.is_none() && category.is_none() {
        return Err(BuildError::MissingField {
            kind,
            field: "name",
        });
    }

    Ok(ViewMessage {
        metadata,
        name,
        category,
        properties: descriptor.object_or_empty("properties")?,
    })
}

fn build_metadata(descriptor: &EventDescriptor) -> Result<Metadata, BuildError> {
    let mut metadata = Metadata {
        user_id: descriptor.non_empty_str("userId")?,
        anonymous_id: descriptor.non_empty_str("anonymousId")?,
        context: descriptor.object_field("context")?.cloned(),
        ..Default::default()
    };

    if let Some(message_id) = descriptor.str_field("messageId")? {
        if message_id.is_empty() {
            return Err(BuildError::InvalidField {
                field: "messageId",
                expected: "a non-empty string",
            });
        }
        metadata.message_id = message_id.to_owned();
    }

    if let Some(timestamp) = descriptor.str_field("timestamp")? {
        metadata.timestamp = parse_timestamp(timestamp)?;
    }

    if let Some(integrations) = descriptor.object_field("integrations")? {
        for (name, value) in integrations {
            if name.is_empty() {
                return Err(BuildError::InvalidField {
                    field: "integrations",
                    expected: "keyed by non-empty integration names",
                });
            }
            let setting = match value {
                Value::Bool(enabled) => IntegrationSetting::Enabled(*enabled),
                Value::Object(options) => IntegrationSetting::Options(options.clone()),
                other => {
                    return Err(BuildError::InvalidIntegrationValue {
                        name: name.clone(),
                        found: json_type_name(other),
                    })
                }
            };
            metadata.integrations.insert(name.clone(), setting);
        }
    }

    Ok(metadata)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
