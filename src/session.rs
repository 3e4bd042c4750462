use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Capitalized form used in transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(with = "timestamp")]
    pub timestamp: NaiveDateTime,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, Local::now().naive_local())
    }

    pub fn at(role: Role, content: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn display_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Append-only conversation log for the active session.
///
/// Messages are never reordered or edited in place; the only way to shrink
/// the log is [`Session::clear`], which drops everything.
#[derive(Debug, Clone, Default)]
pub struct Session {
    messages: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_then_append_keeps_only_new_message() {
        let mut s = Session::new();
        let m1 = Message::new(Role::User, "one");
        let m2 = Message::new(Role::Assistant, "two");
        let m3 = Message::new(Role::User, "three");
        s.append(m1);
        s.append(m2);
        s.clear();
        s.append(m3.clone());
        assert_eq!(s.all(), &[m3]);
    }

    #[test]
    fn append_preserves_insertion_order() {
        let mut s = Session::new();
        for (i, role) in [Role::User, Role::Assistant, Role::User].into_iter().enumerate() {
            s.append(Message::new(role, format!("m{i}")));
        }
        let contents: Vec<&str> = s.all().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn message_json_uses_lowercase_role_and_plain_timestamp() {
        let ts = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", TIMESTAMP_FORMAT).unwrap();
        let m = Message::at(Role::Assistant, "hi", ts);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["timestamp"], "2024-01-01 00:00:00");
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back, m);
    }
}
