use std::{error::Error as StdError, fmt, time::Duration};

/// Failure reported by a [`Transport`](crate::Transport) before a response
/// could be received.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    /// Coarse failure class.
    pub kind: TransportErrorKind,
    /// Full error text including the source chain.
    pub message: String,
}

/// Class of a [`TransportError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The transport gave up waiting for the server.
    Timeout,
    /// Connection could not be established (refused, DNS, TLS handshake).
    Connect,
    /// The stream or connection was already closed.
    Closed,
    /// Any other I/O failure while sending or receiving.
    Io,
    /// Failures that are not I/O at all, e.g. an invalid request.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Closed => "closed",
            Self::Io => "io",
            Self::Other => "transport",
        };
        f.write_str(name)
    }
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Closed, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Io, message)
    }

    /// Whether the failure text says the stream or connection was closed.
    pub fn is_connection_closed(&self) -> bool {
        self.kind == TransportErrorKind::Closed
            || (self.kind == TransportErrorKind::Io
                && self.message.to_ascii_lowercase().contains("closed"))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_request() || err.is_decode() {
            TransportErrorKind::Io
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, error_chain_text(&err))
    }
}

/// Joins an error and its sources into one line.
pub(crate) fn error_chain_text(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// Classified outcome of a failed attempt, threaded between pipeline stages.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Failure {
    /// The server took too long to answer.
    #[error("{message} (after {} ms)", .elapsed.as_millis())]
    Timeout { elapsed: Duration, message: String },
    /// Any other failure that prevented a response from being received.
    #[error(transparent)]
    Transport(TransportError),
    /// The caller abandoned the call.
    #[error("request cancelled")]
    Cancelled,
}

/// Failure raised while turning a successful response into a value.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// Reading the body failed.
    #[error("could not read response body: {0}")]
    Body(#[from] BodyError),
    /// The body was read but could not be decoded.
    #[error("could not decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// The payload lacked data the caller relies on.
    #[error("missing data: {0}")]
    MissingData(String),
    /// Anything else raised by the success continuation.
    #[error("{0}")]
    Other(String),
}

/// Errors from single-shot response bodies.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    /// The body was already drained; the stream is closed.
    #[error("response body stream already closed")]
    Closed,
    /// The body is larger than the requested peek window.
    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    /// The underlying stream failed.
    #[error("response body read failed: {0}")]
    Read(TransportError),
}

/// Closed taxonomy of caller-facing failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    ConnectionClosed,
    NetworkUnavailable,
    /// 4xx response.
    HttpClientError,
    /// 5xx response.
    HttpServerError,
    MalformedResponse,
    /// A bug on this side, e.g. data missing from a successful payload.
    InternalClientError,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::NetworkUnavailable => "network_unavailable",
            Self::HttpClientError => "http_client_error",
            Self::HttpServerError => "http_server_error",
            Self::MalformedResponse => "malformed_response",
            Self::InternalClientError => "internal_client_error",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Only these kinds are worth retrying from the caller's side.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::NetworkUnavailable | Self::HttpServerError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable failure value handed to callers. The message is ready to display.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NormalizedError {
    kind: ErrorKind,
    message: String,
    http_status: Option<u16>,
    server_detail: Option<String>,
}

impl NormalizedError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
            server_detail: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub(crate) fn with_server_detail(mut self, detail: Option<String>) -> Self {
        self.server_detail = detail;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Message extracted from the error body, if the server sent one.
    pub fn server_detail(&self) -> Option<&str> {
        self.server_detail.as_deref()
    }
}

/// Error building a client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0} environment variable")]
    MissingVar(&'static str),
    #[error("{0} is set but empty")]
    EmptyVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("could not build HTTP transport: {0}")]
    Transport(#[from] reqwest::Error),
}
