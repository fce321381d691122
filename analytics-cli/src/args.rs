use analytics_core::message::Properties;
use analytics_core::EventDescriptor;
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "analytics", version, about = "Send a single analytics event")]
pub struct Args {
    /// Write key of the source to send to
    #[arg(long = "writeKey", env = "ANALYTICS_WRITE_KEY", hide_env_values = true)]
    pub write_key: String,

    /// One of identify, track, page, screen, group or alias
    #[arg(long = "type")]
    pub kind: String,

    #[arg(long = "userId")]
    pub user_id: Option<String>,

    #[arg(long = "anonymousId")]
    pub anonymous_id: Option<String>,

    /// Event name, for track
    #[arg(long)]
    pub event: Option<String>,

    /// Page or screen name
    #[arg(long)]
    pub name: Option<String>,

    /// Page or screen category
    #[arg(long)]
    pub category: Option<String>,

    /// Properties as a JSON object (e.g. '{"plan": "pro"}')
    #[arg(long)]
    pub properties: Option<String>,

    /// Traits as a JSON object, for identify and group
    #[arg(long)]
    pub traits: Option<String>,

    #[arg(long = "groupId")]
    pub group_id: Option<String>,

    #[arg(long = "previousId")]
    pub previous_id: Option<String>,

    /// Context as a JSON object
    #[arg(long)]
    pub context: Option<String>,

    /// Integrations as a JSON object of booleans or option objects
    #[arg(long)]
    pub integrations: Option<String>,

    /// ISO-8601 UTC timestamp, e.g. 2024-01-01T00:00:00.000Z
    #[arg(long)]
    pub timestamp: Option<String>,

    #[arg(long = "messageId")]
    pub message_id: Option<String>,

    /// API host, overriding ANALYTICS_HOST
    #[arg(long)]
    pub host: Option<String>,
}

impl Args {
    /// Collect the flags into the same shape the event builder reads from JSON input.
    pub fn descriptor(&self) -> Result<EventDescriptor> {
        let mut fields = Properties::new();
        fields.insert("type".to_owned(), Value::String(self.kind.clone()));

        let strings = [
            ("userId", &self.user_id),
            ("anonymousId", &self.anonymous_id),
            ("event", &self.event),
            ("name", &self.name),
            ("category", &self.category),
            ("groupId", &self.group_id),
            ("previousId", &self.previous_id),
            ("timestamp", &self.timestamp),
            ("messageId", &self.message_id),
        ];
        for (field, value) in strings {
            if let Some(value) = value {
                fields.insert(field.to_owned(), Value::String(value.clone()));
            }
        }

        let objects = [
            ("properties", &self.properties),
            ("traits", &self.traits),
            ("context", &self.context),
            ("integrations", &self.integrations),
        ];
        for (field, raw) in objects {
            if let Some(raw) = raw {
                fields.insert(field.to_owned(), parse_object(field, raw)?);
            }
        }

        Ok(fields.into())
    }
}

fn parse_object(field: &str, raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .with_context(|| format!("Failed to parse --{field} JSON. Expected format: '{{\"key\": \"value\"}}'"))?;

    if !value.is_object() {
        anyhow::bail!("--{field} must be a JSON object");
    }

    Ok(value)
}
