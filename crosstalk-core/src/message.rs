//! Chat message model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique message id. Generated at creation, never reused.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One chat message. Immutable once built; a translation produces a new value.
///
/// `translated_value` is empty, or text in `translation_language_code` that differs
/// from `value`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    username: String,
    value: String,
    timestamp: String,
    language_code: String,
    translation_language_code: String,
    translated_value: String,
}

impl Message {
    /// New untranslated message with unknown source language.
    pub fn new(
        username: impl Into<String>,
        value: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            username: username.into(),
            value: value.into(),
            timestamp: timestamp.into(),
            language_code: String::new(),
            translation_language_code: String::new(),
            translated_value: String::new(),
        }
    }

    /// Same message with a known source language.
    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = language_code.into();
        self
    }

    /// Translated variant of this message. Keeps the id; a translation equal to
    /// `value` is normalized to empty.
    pub fn translated(&self, target: &str, text: String) -> Message {
        let translated_value = if text == self.value { String::new() } else { text };
        Message {
            translation_language_code: target.to_string(),
            translated_value,
            ..self.clone()
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    pub fn translation_language_code(&self) -> &str {
        &self.translation_language_code
    }

    pub fn translated_value(&self) -> &str {
        &self.translated_value
    }

    pub fn has_translation(&self) -> bool {
        !self.translated_value.is_empty()
    }

    /// Whether `username` sent this message.
    pub fn is_from(&self, username: &str) -> bool {
        self.username == username
    }
}

/// Local wall-clock timestamp in short date / short time form, e.g. `1/20/20, 9:41 AM`.
pub fn timestamp_now() -> String {
    chrono::Local::now().format("%-m/%-d/%y, %-I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Message::new("ana", "hi", "");
        let b = Message::new("ana", "hi", "");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn translated_keeps_identity_and_original() {
        let m = Message::new("ana", "good morning", "1/1/20, 9:00 AM").with_language("en");
        let t = m.translated("nl", "goedemorgen".to_string());
        assert_eq!(t.id(), m.id());
        assert_eq!(t.value(), "good morning");
        assert_eq!(t.language_code(), "en");
        assert_eq!(t.translation_language_code(), "nl");
        assert_eq!(t.translated_value(), "goedemorgen");
        assert!(m.translated_value().is_empty());
    }

    #[test]
    fn identical_translation_is_empty() {
        let m = Message::new("ana", "OK", "");
        let t = m.translated("nl", "OK".to_string());
        assert_eq!(t.translation_language_code(), "nl");
        assert!(!t.has_translation());
    }

    #[test]
    fn timestamp_is_short_form() {
        let ts = timestamp_now();
        assert!(ts.contains(", "));
        assert!(ts.ends_with("AM") || ts.ends_with("PM"));
    }
}
