//! Structured HTTP logging.
//!
//! Stages describe what happened as [`LogRecord`]s; an [`HttpLogger`] decides
//! where they go. Records are filtered by [`LogLevel`] before they are built,
//! and a logger that panics is ignored.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    str::FromStr,
    sync::Arc,
};

use reqwest::header::{HeaderMap, AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION};

/// How much of each exchange is logged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    None,
    /// Request and response lines.
    #[default]
    Basic,
    /// Basic plus headers.
    Headers,
    /// Headers plus bodies.
    Body,
}

impl LogLevel {
    pub fn is_enabled(self) -> bool {
        self > Self::None
    }

    pub fn logs_headers(self) -> bool {
        self >= Self::Headers
    }

    pub fn logs_body(self) -> bool {
        self >= Self::Body
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "BASIC" => Ok(Self::Basic),
            "HEADERS" => Ok(Self::Headers),
            "BODY" => Ok(Self::Body),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Basic => "BASIC",
            Self::Headers => "HEADERS",
            Self::Body => "BODY",
        };
        f.write_str(name)
    }
}

/// One structured log line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogRecord {
    Request {
        method: String,
        url: String,
        headers: Vec<(String, String)>,
        body_preview: Option<String>,
    },
    Response {
        method: String,
        url: String,
        status: u16,
        elapsed_ms: u64,
        headers: Vec<(String, String)>,
    },
    /// Response body text captured for diagnostics.
    ResponseBody {
        url: String,
        status: u16,
        text: String,
        /// The body could not be read and `text` is a placeholder.
        synthesized: bool,
    },
    Retry {
        method: String,
        url: String,
        /// Attempt about to start.
        attempt: u32,
        max_attempts: u32,
        wait_ms: u64,
        reason: String,
    },
    Failure {
        method: String,
        url: String,
        elapsed_ms: u64,
        message: String,
    },
}

/// Receives log records from the pipeline.
pub trait HttpLogger: Send + Sync {
    fn log(&self, record: &LogRecord);
}

/// Forwards records to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl HttpLogger for TracingLogger {
    fn log(&self, record: &LogRecord) {
        match record {
            LogRecord::Request {
                method,
                url,
                headers,
                body_preview,
            } => tracing::info!(
                direction = "request",
                %method,
                %url,
                headers = ?headers,
                body = body_preview.as_deref().unwrap_or(""),
                "--> {method} {url}"
            ),
            LogRecord::Response {
                method,
                url,
                status,
                elapsed_ms,
                headers,
            } => tracing::info!(
                direction = "response",
                %method,
                %url,
                status,
                elapsed_ms,
                headers = ?headers,
                "<-- {status} {method} {url} ({elapsed_ms} ms)"
            ),
            LogRecord::ResponseBody {
                url,
                status,
                text,
                synthesized,
            } => tracing::info!(
                direction = "response",
                %url,
                status,
                synthesized,
                body = %text,
                "<-- body {url} ({} bytes)",
                text.len()
            ),
            LogRecord::Retry {
                method,
                url,
                attempt,
                max_attempts,
                wait_ms,
                reason,
            } => tracing::warn!(
                %method,
                %url,
                attempt,
                max_attempts,
                wait_ms,
                %reason,
                "retrying {method} {url} (attempt {attempt}/{max_attempts}) in {wait_ms} ms"
            ),
            LogRecord::Failure {
                method,
                url,
                elapsed_ms,
                message,
            } => tracing::warn!(
                %method,
                %url,
                elapsed_ms,
                %message,
                "<-- HTTP FAILED {method} {url} ({elapsed_ms} ms)"
            ),
        }
    }
}

/// Level-aware handle shared by the pipeline stages.
#[derive(Clone)]
pub(crate) struct LogSink {
    level: LogLevel,
    logger: Arc<dyn HttpLogger>,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("level", &self.level).finish()
    }
}

impl LogSink {
    pub(crate) fn new(level: LogLevel, logger: Arc<dyn HttpLogger>) -> Self {
        Self { level, logger }
    }

    pub(crate) fn level(&self) -> LogLevel {
        self.level
    }

    /// Emits a record unless logging is off. Never panics.
    pub(crate) fn emit(&self, record: LogRecord) {
        if !self.level.is_enabled() {
            return;
        }
        let logger = &self.logger;
        if panic::catch_unwind(AssertUnwindSafe(|| logger.log(&record))).is_err() {
            tracing::debug!("http logger panicked; record dropped");
        }
    }

    /// Header pairs for a record, or nothing below [`LogLevel::Headers`].
    pub(crate) fn headers(&self, headers: &HeaderMap) -> Vec<(String, String)> {
        if !self.level.logs_headers() {
            return Vec::new();
        }
        headers
            .iter()
            .map(|(name, value)| {
                let shown = if name == AUTHORIZATION
                    || name == PROXY_AUTHORIZATION
                    || name == COOKIE
                {
                    "<redacted>".to_owned()
                } else {
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                };
                (name.as_str().to_owned(), shown)
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

    use super::{HttpLogger, LogLevel, LogRecord, LogSink};

    /// Logger that keeps every record for assertions.
    #[derive(Default)]
    pub(crate) struct CapturingLogger(pub(crate) Mutex<Vec<LogRecord>>);

    impl HttpLogger for CapturingLogger {
        fn log(&self, record: &LogRecord) {
            self.0
                .lock()
                .expect("log mutex must not be poisoned")
                .push(record.clone());
        }
    }

    impl CapturingLogger {
        pub(crate) fn records(&self) -> Vec<LogRecord> {
            self.0.lock().expect("log mutex must not be poisoned").clone()
        }
    }

    struct PanickingLogger;

    impl HttpLogger for PanickingLogger {
        fn log(&self, _record: &LogRecord) {
            panic!("logger exploded");
        }
    }

    fn failure_record() -> LogRecord {
        LogRecord::Failure {
            method: "GET".to_owned(),
            url: "http://x".to_owned(),
            elapsed_ms: 1,
            message: "boom".to_owned(),
        }
    }

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!("body".parse::<LogLevel>(), Ok(LogLevel::Body));
        assert_eq!(" Headers ".parse::<LogLevel>(), Ok(LogLevel::Headers));
        assert_eq!("NONE".parse::<LogLevel>(), Ok(LogLevel::None));
        assert!("trace".parse::<LogLevel>().is_err());
    }

    #[test]
    fn none_level_emits_nothing() {
        let logger = Arc::new(CapturingLogger::default());
        let sink = LogSink::new(LogLevel::None, logger.clone());
        sink.emit(failure_record());
        assert!(logger.records().is_empty());
    }

    #[test]
    fn panicking_logger_is_swallowed() {
        let sink = LogSink::new(LogLevel::Basic, Arc::new(PanickingLogger));
        sink.emit(failure_record());
    }

    #[test]
    fn headers_are_redacted_and_level_gated() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let basic = LogSink::new(LogLevel::Basic, Arc::new(CapturingLogger::default()));
        assert!(basic.headers(&headers).is_empty());

        let verbose = LogSink::new(LogLevel::Headers, Arc::new(CapturingLogger::default()));
        let shown = verbose.headers(&headers);
        assert!(shown.contains(&("authorization".to_owned(), "<redacted>".to_owned())));
        assert!(shown.contains(&("content-type".to_owned(), "application/json".to_owned())));
        assert!(!format!("{shown:?}").contains("secret"));
    }
}
