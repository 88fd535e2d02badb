//! `foodlabel-http` is the resilient HTTP layer of the food-label analysis
//! client.
//!
//! Every outbound call runs through a [`RequestPipeline`]:
//! - [`RetryPolicy`]: up to 3 attempts with exponential backoff and jitter
//! - [`TimeoutClassifier`]: timeouts reported apart from other I/O failures
//! - [`SafeBodyReader`]: bodies logged without stealing the consumer's read
//!
//! Failures end up as a [`NormalizedError`] from [`ErrorNormalizer`], and
//! [`ResponseDispatcher`] turns completed responses into values.
//! [`LabelClient`] bundles all of it.

mod body;
mod client;
mod dispatch;
mod error;
mod logging;
mod normalize;
mod options;
mod pipeline;
mod request;
mod response;
mod retry;
mod safe_body;
mod timeout;
mod transport;

pub use body::{BodyState, BodyStream, ChunkFuture, ResponseBody};
pub use client::LabelClient;
pub use dispatch::{Dispatched, ResponseDispatcher};
pub use error::{
    BodyError, ConfigError, ErrorKind, Failure, NormalizedError, ProcessingError, TransportError,
    TransportErrorKind,
};
pub use logging::{HttpLogger, LogLevel, LogRecord, TracingLogger};
pub use normalize::{extract_error_message, CallContext, ErrorNormalizer, Fault};
pub use options::{ClientOptions, RetryOptions};
pub use pipeline::RequestPipeline;
pub use request::HttpRequest;
pub use response::ResponseEnvelope;
pub use retry::{Attempt, RetryDecision, RetryPolicy};
pub use safe_body::{fallback_error_body, SafeBodyReader};
pub use timeout::{TimeoutClassifier, TIMEOUT_MESSAGE};
pub use transport::{ReqwestTransport, Transport};

/// Canned user-facing messages.
pub mod messages {
    pub use crate::normalize::{
        CONNECTION_CLOSED_MESSAGE, CREDENTIALS_INCORRECT, EMPTY_BODY_MESSAGE,
        LIKELY_SUCCEEDED_MESSAGE, NETWORK_UNAVAILABLE_MESSAGE, REQUEST_DATA_INVALID,
    };
    pub use crate::timeout::TIMEOUT_MESSAGE;
}

pub type Result<T> = std::result::Result<T, NormalizedError>;
