//! HTTP translation client (Yandex-style `tr.json/translate` endpoint).

use std::time::Duration;

use async_trait::async_trait;
use crosstalk_core::translation::{parse_translation, TranslationClient, TranslationError};

pub struct HttpTranslationClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpTranslationClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }

    fn request(&self, text: &str, target: &str) -> reqwest::RequestBuilder {
        self.http.get(&self.api_url).query(&[
            ("key", self.api_key.as_str()),
            ("text", text),
            ("lang", target),
        ])
    }
}

#[async_trait]
impl TranslationClient for HttpTranslationClient {
    async fn fetch(&self, text: &str, target: &str) -> Result<String, TranslationError> {
        let resp = self
            .request(text, target)
            .send()
            .await
            .map_err(|e| TranslationError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TranslationError::Status(status.as_u16()));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| TranslationError::Request(e.to_string()))?;
        parse_translation(&body)
    }
}
