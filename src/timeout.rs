use std::{
    future::Future,
    time::{Duration, Instant},
};

use crate::{
    error::{Failure, TransportErrorKind},
    logging::{LogRecord, LogSink},
    HttpRequest, ResponseEnvelope, TransportError,
};

/// Message shown when the server does not answer in time.
pub const TIMEOUT_MESSAGE: &str =
    "The server took too long to respond. Check your connection and try again.";

/// Times one attempt and separates timeouts from other transport failures.
#[derive(Clone, Debug)]
pub struct TimeoutClassifier {
    deadline: Option<Duration>,
    log: LogSink,
}

impl TimeoutClassifier {
    pub(crate) fn new(deadline: Option<Duration>, log: LogSink) -> Self {
        Self { deadline, log }
    }

    /// Runs `attempt`, enforcing the optional deadline.
    ///
    /// A timeout becomes [`Failure::Timeout`]; other transport errors pass
    /// through unchanged as [`Failure::Transport`].
    pub async fn classify<F>(
        &self,
        request: &HttpRequest,
        attempt: F,
    ) -> Result<ResponseEnvelope, Failure>
    where
        F: Future<Output = Result<ResponseEnvelope, TransportError>>,
    {
        let started = Instant::now();
        let outcome = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::timeout(format!(
                    "no response within {} ms",
                    deadline.as_millis()
                ))),
            },
            None => attempt.await,
        };
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) => {
                self.log.emit(LogRecord::Response {
                    method: request.method.to_string(),
                    url: request.url.clone(),
                    status: response.status.as_u16(),
                    elapsed_ms,
                    headers: self.log.headers(&response.headers),
                });
                Ok(response)
            }
            Err(err) => {
                let failure = if err.kind == TransportErrorKind::Timeout {
                    Failure::Timeout {
                        elapsed,
                        message: TIMEOUT_MESSAGE.to_owned(),
                    }
                } else {
                    Failure::Transport(err)
                };
                self.log.emit(LogRecord::Failure {
                    method: request.method.to_string(),
                    url: request.url.clone(),
                    elapsed_ms,
                    message: failure.to_string(),
                });
                Err(failure)
            }
        }
    }
}
