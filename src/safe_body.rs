//! Body inspection that never costs the downstream consumer its read.

use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};

use crate::{
    body::ResponseBody,
    logging::{LogRecord, LogSink},
    ResponseEnvelope,
};

/// Body handed downstream when an error response had no readable text.
pub fn fallback_error_body(status: u16) -> String {
    serde_json::json!({ "detail": format!("Error {status}") }).to_string()
}

/// Logs response bodies while keeping them readable exactly once downstream.
///
/// Success bodies are peeked and handed on untouched. Error bodies are
/// captured (peek, then drain if the peek fails) and replaced by a buffered
/// copy of exactly the captured text, or by [`fallback_error_body`].
#[derive(Clone, Debug)]
pub struct SafeBodyReader {
    peek_limit: usize,
    log: LogSink,
}

impl SafeBodyReader {
    pub(crate) fn new(peek_limit: usize, log: LogSink) -> Self {
        Self { peek_limit, log }
    }

    pub async fn inspect(&self, response: ResponseEnvelope) -> ResponseEnvelope {
        if !self.log.level().logs_body() {
            return response;
        }
        if response.is_success() {
            if response.body.is_absent() {
                return response;
            }
            self.log_success(response).await
        } else {
            self.rebuild_error(response).await
        }
    }

    async fn log_success(&self, mut response: ResponseEnvelope) -> ResponseEnvelope {
        let status = response.status.as_u16();
        match response.body.peek(self.peek_limit).await {
            Ok(bytes) => self.log_body(&response.url, status, &bytes, false),
            Err(err) => tracing::debug!(
                url = %response.url,
                status,
                error = %err,
                "response body not logged"
            ),
        }
        response
    }

    async fn rebuild_error(&self, mut response: ResponseEnvelope) -> ResponseEnvelope {
        let status = response.status.as_u16();
        let captured = match response.body.peek(self.peek_limit).await {
            Ok(bytes) => Some(bytes),
            Err(peek_err) => {
                tracing::debug!(
                    url = %response.url,
                    status,
                    error = %peek_err,
                    "peek failed, draining error body"
                );
                match response.body.drain().await {
                    Ok(bytes) => Some(bytes),
                    Err(drain_err) => {
                        tracing::warn!(
                            url = %response.url,
                            status,
                            error = %drain_err,
                            "error body unreadable"
                        );
                        None
                    }
                }
            }
        };

        let (bytes, synthesized) = match captured.filter(|bytes| !bytes.is_empty()) {
            Some(bytes) => (bytes, false),
            None => (Bytes::from(fallback_error_body(status)), true),
        };
        self.log_body(&response.url, status, &bytes, synthesized);

        let content_type = if synthesized {
            Some(HeaderValue::from_static("application/json"))
        } else {
            response.content_type().cloned()
        };
        let mut rebuilt = response.replace_body(ResponseBody::buffered(bytes));
        if let Some(content_type) = content_type {
            rebuilt.headers.insert(CONTENT_TYPE, content_type);
        }
        rebuilt
    }

    fn log_body(&self, url: &str, status: u16, bytes: &[u8], synthesized: bool) {
        self.log.emit(LogRecord::ResponseBody {
            url: url.to_owned(),
            status,
            text: String::from_utf8_lossy(bytes).into_owned(),
            synthesized,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use reqwest::{
        header::{HeaderMap, HeaderValue, CONTENT_TYPE},
        StatusCode,
    };

    use super::{fallback_error_body, SafeBodyReader};
    use crate::{
        body::{BodyState, ResponseBody},
        logging::{tests::CapturingLogger, LogLevel, LogRecord, LogSink},
        ResponseEnvelope, TransportError,
    };

    fn reader(level: LogLevel, peek_limit: usize) -> (SafeBodyReader, Arc<CapturingLogger>) {
        let logger = Arc::new(CapturingLogger::default());
        let sink = LogSink::new(level, logger.clone());
        (SafeBodyReader::new(peek_limit, sink), logger)
    }

    fn streamed(status: StatusCode, parts: &[&'static str]) -> ResponseEnvelope {
        let body = ResponseBody::from_chunks(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part.as_bytes()))),
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        ResponseEnvelope::new(status, "http://x/analyze", body).with_headers(headers)
    }

    fn logged_bodies(logger: &CapturingLogger) -> Vec<(String, bool)> {
        logger
            .records()
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::ResponseBody {
                    text, synthesized, ..
                } => Some((text, synthesized)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn disabled_logging_passes_response_through() {
        let (reader, logger) = reader(LogLevel::Basic, 1024);
        let response = reader
            .inspect(streamed(StatusCode::INTERNAL_SERVER_ERROR, &["boom"]))
            .await;
        assert_eq!(response.body_state(), BodyState::Unread);
        assert!(logger.records().is_empty());
    }

    #[tokio::test]
    async fn success_body_is_peeked_not_drained() {
        let (reader, logger) = reader(LogLevel::Body, 1024);
        let mut response = reader
            .inspect(streamed(StatusCode::OK, &["{\"productId\":", "42}"]))
            .await;
        assert_eq!(response.body_state(), BodyState::Peeked);
        let text = response.text().await.expect("consumer must read the body");
        assert_eq!(text, "{\"productId\":42}");
        assert_eq!(logged_bodies(&logger), vec![(text, false)]);
    }

    #[tokio::test]
    async fn oversized_success_body_is_skipped_but_intact() {
        let (reader, logger) = reader(LogLevel::Body, 3);
        let mut response = reader.inspect(streamed(StatusCode::OK, &["abcd", "efgh"])).await;
        assert!(logged_bodies(&logger).is_empty());
        assert_eq!(response.text().await.expect("must read"), "abcdefgh");
    }

    #[tokio::test]
    async fn error_body_is_rebuilt_from_logged_text() {
        let (reader, logger) = reader(LogLevel::Body, 1024);
        let mut response = reader
            .inspect(streamed(StatusCode::UNPROCESSABLE_ENTITY, &["{\"detail\":", "\"bad\"}"]))
            .await;
        assert_eq!(response.body_state(), BodyState::Unread);
        assert_eq!(
            response.content_type().map(|v| v.as_bytes()),
            Some(&b"application/problem+json"[..])
        );
        let text = response.text().await.expect("consumer must read the body");
        assert_eq!(logged_bodies(&logger), vec![(text.clone(), false)]);
        assert_eq!(text, "{\"detail\":\"bad\"}");
    }

    #[tokio::test]
    async fn oversized_error_body_falls_back_to_drain() {
        let (reader, logger) = reader(LogLevel::Body, 4);
        let mut response = reader
            .inspect(streamed(StatusCode::INTERNAL_SERVER_ERROR, &["internal", " failure"]))
            .await;
        let text = response.text().await.expect("consumer must read the body");
        assert_eq!(text, "internal failure");
        assert_eq!(logged_bodies(&logger), vec![(text, false)]);
    }

    #[tokio::test]
    async fn absent_error_body_gets_fallback() {
        let (reader, _) = reader(LogLevel::Body, 1024);
        let original =
            ResponseEnvelope::new(StatusCode::UNAUTHORIZED, "http://x", ResponseBody::empty());
        let mut response = reader.inspect(original).await;
        assert!(!response.body.is_absent());
        assert_eq!(response.text().await.expect("must read"), r#"{"detail":"Error 401"}"#);
    }

    #[tokio::test]
    async fn already_drained_error_body_is_replaced_by_fallback() {
        let (reader, logger) = reader(LogLevel::Body, 1024);
        let mut original = streamed(StatusCode::BAD_GATEWAY, &["gone"]);
        original.body.drain().await.expect("drain must succeed");

        let mut response = reader.inspect(original).await;
        let text = response.text().await.expect("fallback must be readable");
        assert_eq!(text, fallback_error_body(502));
        assert_eq!(text, r#"{"detail":"Error 502"}"#);
        assert_eq!(response.content_type().map(|v| v.as_bytes()), Some(&b"application/json"[..]));
        assert_eq!(logged_bodies(&logger), vec![(text, true)]);
    }

    #[tokio::test]
    async fn unreadable_error_body_is_replaced_by_fallback() {
        let (reader, _) = reader(LogLevel::Body, 1024);
        let body = ResponseBody::from_chunks([Err(TransportError::io("reset by peer"))]);
        let original = ResponseEnvelope::new(StatusCode::SERVICE_UNAVAILABLE, "http://x", body);

        let mut response = reader.inspect(original).await;
        let text = response.text().await.expect("fallback must be readable");
        assert_eq!(text, r#"{"detail":"Error 503"}"#);
    }

    #[tokio::test]
    async fn empty_error_body_is_replaced_by_fallback() {
        let (reader, _) = reader(LogLevel::Body, 1024);
        let original =
            ResponseEnvelope::new(StatusCode::NOT_FOUND, "http://x", ResponseBody::buffered(""));
        let mut response = reader.inspect(original).await;
        assert_eq!(response.text().await.expect("must read"), r#"{"detail":"Error 404"}"#);
    }
}
