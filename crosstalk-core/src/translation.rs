//! Translation of incoming messages: client seam, response parsing, retry/fallback pipeline.

use async_trait::async_trait;
use serde::Deserialize;

use crate::message::Message;

/// Attempts per message: the first call plus one retry.
pub const TRANSLATION_ATTEMPTS: usize = 2;

/// One external translation call.
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// Translate `text` into `target`; returns the first translation.
    async fn fetch(&self, text: &str, target: &str) -> Result<String, TranslationError>;
}

/// Translation service response: `{ "lang": "en-nl", "text": ["..."] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationResponse {
    #[serde(rename = "lang")]
    pub language_code: String,
    #[serde(rename = "text")]
    pub translations: Vec<String>,
}

/// Parse a response body and take its first translation.
pub fn parse_translation(body: &[u8]) -> Result<String, TranslationError> {
    let response: TranslationResponse =
        serde_json::from_slice(body).map_err(TranslationError::Parse)?;
    response
        .translations
        .into_iter()
        .next()
        .ok_or(TranslationError::Empty)
}

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("service returned status {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("no translations in response")]
    Empty,
}

/// Wraps a client with the same-language short-circuit, one retry and fallback.
pub struct TranslationPipeline<C> {
    client: C,
}

impl<C: TranslationClient> TranslationPipeline<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Translated variant of `message`, or `message` unchanged when translation
    /// is unnecessary or unavailable. Never fails.
    pub async fn translate(&self, message: &Message, target: &str) -> Message {
        if message.language_code() == target {
            return message.clone();
        }
        for attempt in 1..=TRANSLATION_ATTEMPTS {
            match self.client.fetch(message.value(), target).await {
                Ok(text) => return message.translated(target, text),
                Err(e) => {
                    log::debug!(
                        "translation of {} to {} failed (attempt {}/{}): {}",
                        message.id(),
                        target,
                        attempt,
                        TRANSLATION_ATTEMPTS,
                        e
                    );
                }
            }
        }
        log::warn!(
            "translation of {} unavailable; showing original",
            message.id()
        );
        message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted results and counts calls.
    struct Scripted {
        results: Mutex<VecDeque<Result<String, TranslationError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(results: Vec<Result<String, TranslationError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TranslationClient for Scripted {
        async fn fetch(&self, _text: &str, _target: &str) -> Result<String, TranslationError> {
            *self.calls.lock().unwrap() += 1;
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TranslationError::Empty))
        }
    }

    fn incoming() -> Message {
        Message::new("Bram", "good morning", "2/6/20, 10:13 AM")
    }

    #[tokio::test]
    async fn same_language_short_circuit() {
        let pipeline = TranslationPipeline::new(Scripted::new(vec![]));
        let m = incoming().with_language("nl");
        let out = pipeline.translate(&m, "nl").await;
        assert_eq!(out, m);
        assert_eq!(pipeline.client().calls(), 0);
    }

    #[tokio::test]
    async fn success_sets_translation() {
        let pipeline = TranslationPipeline::new(Scripted::new(vec![Ok("goedemorgen".into())]));
        let m = incoming();
        let out = pipeline.translate(&m, "nl").await;
        assert_eq!(out.id(), m.id());
        assert_eq!(out.value(), "good morning");
        assert_eq!(out.translation_language_code(), "nl");
        assert_eq!(out.translated_value(), "goedemorgen");
        assert_eq!(pipeline.client().calls(), 1);
    }

    #[tokio::test]
    async fn identical_translation_normalized() {
        let pipeline = TranslationPipeline::new(Scripted::new(vec![Ok("good morning".into())]));
        let out = pipeline.translate(&incoming(), "nl").await;
        assert_eq!(out.translated_value(), "");
        assert_eq!(out.translation_language_code(), "nl");
    }

    #[tokio::test]
    async fn retry_then_success() {
        let pipeline = TranslationPipeline::new(Scripted::new(vec![
            Err(TranslationError::Status(503)),
            Ok("goedemorgen".into()),
        ]));
        let out = pipeline.translate(&incoming(), "nl").await;
        assert_eq!(out.translated_value(), "goedemorgen");
        assert_eq!(pipeline.client().calls(), 2);
    }

    #[tokio::test]
    async fn retry_then_fallback() {
        let pipeline = TranslationPipeline::new(Scripted::new(vec![
            Err(TranslationError::Request("timed out".into())),
            Err(TranslationError::Empty),
            Ok("never asked".into()),
        ]));
        let m = incoming();
        let out = pipeline.translate(&m, "nl").await;
        assert_eq!(out, m);
        assert_eq!(pipeline.client().calls(), 2);
    }

    #[test]
    fn parse_first_translation() {
        let body = br#"{"code":200,"lang":"en-nl","text":["goedemorgen","goeiemorgen"]}"#;
        assert_eq!(parse_translation(body).unwrap(), "goedemorgen");
    }

    #[test]
    fn parse_empty_list_fails() {
        let body = br#"{"lang":"en-nl","text":[]}"#;
        assert!(matches!(parse_translation(body), Err(TranslationError::Empty)));
    }

    #[test]
    fn parse_malformed_fails() {
        assert!(matches!(
            parse_translation(br#"{"code":401,"message":"API key is invalid"}"#),
            Err(TranslationError::Parse(_))
        ));
    }
}
