//! Conversation transcript and the values that flow through a turn.

use crate::core::errors::ChatError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Opaque identity binding a client to its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    pub fn new() -> Self {
        SessionHandle(Uuid::new_v4())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionHandle {
    fn from(id: Uuid) -> Self {
        SessionHandle(id)
    }
}

impl FromStr for SessionHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s).map(SessionHandle)
    }
}

impl Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifier of a model as reported by the inference runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> Self {
        ModelName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelName {
    fn from(name: &str) -> Self {
        ModelName::new(name)
    }
}

impl From<String> for ModelName {
    fn from(name: String) -> Self {
        ModelName(name)
    }
}

impl Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry. Never mutated after it has been appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "clock")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "seconds")]
    pub response_time: Option<Duration>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
            timestamp: Some(Utc::now()),
            response_time: None,
        }
    }

    pub fn assistant(content: impl Into<String>, response_time: Duration) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Some(Utc::now()),
            response_time: Some(response_time),
        }
    }
}

/// Timestamps are written as RFC 3339. Histories saved by the Streamlit front-end carry a
/// bare `HH:MM:SS` wall-clock time instead, read as today in the local timezone.
mod clock {
    use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(timestamp) => s.serialize_some(timestamp),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        parse(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("`{raw}` is not a timestamp")))
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
            return Some(timestamp.with_timezone(&Utc));
        }
        let time = NaiveTime::parse_from_str(raw, "%H:%M:%S").ok()?;
        let local = Local::now().date_naive().and_time(time);
        Local
            .from_local_datetime(&local)
            .earliest()
            .map(|timestamp| timestamp.with_timezone(&Utc))
    }
}

/// Durations travel as fractional seconds. Restored histories may also spell them as
/// text such as `"0.42s"`.
mod seconds {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => s.serialize_some(&duration.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = match Option::<Raw>::deserialize(d)? {
            None => return Ok(None),
            Some(Raw::Number(secs)) => secs,
            Some(Raw::Text(text)) => {
                let trimmed = text.trim();
                let number = trimmed.strip_suffix('s').unwrap_or(trimmed).trim_end();
                number.parse::<f64>().map_err(|_| {
                    D::Error::custom(format!("`{text}` is not a number of seconds"))
                })?
            }
        };

        if secs.is_finite() && secs >= 0.0 {
            Ok(Some(Duration::from_nanos((secs * 1e9).round() as u64)))
        } else {
            Err(D::Error::custom(format!(
                "response_time must be a non-negative number of seconds, got {secs}"
            )))
        }
    }
}

/// Ordered, append-only transcript of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn stats(&self) -> ConversationStats {
        let user = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();

        ConversationStats {
            total: self.messages.len(),
            user,
            assistant: self.messages.len() - user,
        }
    }

    /// Pretty-printed JSON array, the on-disk history format.
    pub fn to_json(&self) -> Result<String, ChatError> {
        serde_json::to_string_pretty(self).map_err(|e| ChatError::StorageFailure(e.to_string()))
    }

    /// Parses a JSON array of messages. Anything else is `MalformedHistory`.
    pub fn from_json(blob: &str) -> Result<Self, ChatError> {
        serde_json::from_str(blob).map_err(|e| ChatError::MalformedHistory(e.to_string()))
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Conversation { messages }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConversationStats {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
}

/// Per-call generation parameters. Not part of the transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: ModelName,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub content: String,
    pub response_time: Duration,
    pub timestamp: DateTime<Utc>,
}
