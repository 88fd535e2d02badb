use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    StatusCode,
};
use serde::de::DeserializeOwned;

use crate::{
    body::{BodyState, ResponseBody},
    error::{BodyError, ProcessingError},
};

/// Completed HTTP response together with its single-read body.
#[derive(Debug)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: String,
    pub body: ResponseBody,
}

impl ResponseEnvelope {
    pub fn new(status: StatusCode, url: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url: url.into(),
            body,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Same status, headers and URL with a fresh body.
    pub(crate) fn replace_body(self, body: ResponseBody) -> Self {
        Self { body, ..self }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.headers.get(CONTENT_TYPE)
    }

    pub fn body_state(&self) -> BodyState {
        self.body.state()
    }

    /// Drains the body.
    pub async fn bytes(&mut self) -> Result<Bytes, BodyError> {
        self.body.drain().await
    }

    /// Drains the body as UTF-8 text, replacing invalid sequences.
    pub async fn text(&mut self) -> Result<String, BodyError> {
        let bytes = self.body.drain().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drains and decodes a JSON body.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, ProcessingError> {
        let bytes = self.body.drain().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
