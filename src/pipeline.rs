//! Ordered execution of one logical call.
//!
//! Nesting, outermost first: retry, timeout classification, transport, then
//! safe body handling on the transport's result.

use std::{future::Future, sync::Arc};

use tokio::time::sleep;

use crate::{
    error::Failure,
    logging::{HttpLogger, LogRecord, LogSink, TracingLogger},
    normalize::{CallContext, ErrorNormalizer, Fault},
    retry::{Attempt, RetryPolicy},
    safe_body::SafeBodyReader,
    timeout::TimeoutClassifier,
    ClientOptions, HttpRequest, NormalizedError, ResponseEnvelope, Transport,
};

/// Largest request body included in a request log record.
const REQUEST_BODY_PREVIEW: usize = 4 * 1024;

/// Applies retry, timeout and body policies around a [`Transport`].
#[derive(Debug)]
pub struct RequestPipeline<T> {
    transport: T,
    retry: RetryPolicy,
    timeouts: TimeoutClassifier,
    safe_body: SafeBodyReader,
    normalizer: ErrorNormalizer,
    log: LogSink,
}

impl<T: Transport> RequestPipeline<T> {
    /// Builds a pipeline that logs through `tracing`.
    pub fn new(options: &ClientOptions, transport: T) -> Self {
        Self::with_logger(options, transport, Arc::new(TracingLogger))
    }

    pub fn with_logger(options: &ClientOptions, transport: T, logger: Arc<dyn HttpLogger>) -> Self {
        let log = LogSink::new(options.log_level, logger);
        Self {
            transport,
            retry: RetryPolicy::new(options.retry.clone()),
            timeouts: TimeoutClassifier::new(options.attempt_timeout, log.clone()),
            safe_body: SafeBodyReader::new(options.peek_limit, log.clone()),
            normalizer: ErrorNormalizer,
            log,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs the call and normalizes a final failure.
    ///
    /// Non-2xx responses are returned as responses; only failures that
    /// prevented a response become errors.
    pub async fn execute(
        &self,
        request: HttpRequest,
        context: CallContext,
    ) -> Result<ResponseEnvelope, NormalizedError> {
        self.execute_until(request, context, std::future::pending()).await
    }

    /// Like [`execute`](Self::execute), but stops as soon as `cancel`
    /// completes, without further retries.
    pub async fn execute_until<C>(
        &self,
        request: HttpRequest,
        context: CallContext,
        cancel: C,
    ) -> Result<ResponseEnvelope, NormalizedError>
    where
        C: Future<Output = ()>,
    {
        self.run(request, cancel)
            .await
            .map_err(|failure| self.normalizer.normalize(&Fault::Failure(&failure), context))
    }

    /// The retry loop, returning the unnormalized final failure.
    ///
    /// After the last attempt, a transport failure seen on any attempt wins
    /// over a trailing 5xx response.
    pub async fn run<C>(&self, request: HttpRequest, cancel: C) -> Result<ResponseEnvelope, Failure>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        self.log_request(&request);

        let max_attempts = self.retry.max_attempts();
        let mut last_failure: Option<Failure> = None;
        let mut index = 0;
        loop {
            index += 1;
            let outcome = tokio::select! {
                biased;
                _ = &mut cancel => Err(Failure::Cancelled),
                outcome = self.attempt(&request) => outcome,
            };

            let decision = self.retry.should_retry(&Attempt {
                request: &request,
                index,
                outcome: &outcome,
            });

            if !decision.retry {
                return match outcome {
                    Ok(response) if response.is_server_error() => match last_failure {
                        Some(failure) => Err(failure),
                        None => Ok(response),
                    },
                    other => other,
                };
            }

            let reason = match &outcome {
                Ok(response) => format!("HTTP {}", response.status.as_u16()),
                Err(failure) => failure.to_string(),
            };
            if let Err(failure) = outcome {
                last_failure = Some(failure);
            }

            let wait_ms = u64::try_from(decision.wait.as_millis()).unwrap_or(u64::MAX);
            self.log.emit(LogRecord::Retry {
                method: request.method.to_string(),
                url: request.url.clone(),
                attempt: index + 1,
                max_attempts,
                wait_ms,
                reason,
            });

            tokio::select! {
                biased;
                _ = &mut cancel => return Err(Failure::Cancelled),
                _ = sleep(decision.wait) => {}
            }
        }
    }

    /// One attempt. The body stage runs once the status line is logged.
    async fn attempt(&self, request: &HttpRequest) -> Result<ResponseEnvelope, Failure> {
        let response = self
            .timeouts
            .classify(request, self.transport.send(request.clone()))
            .await?;
        Ok(self.safe_body.inspect(response).await)
    }

    fn log_request(&self, request: &HttpRequest) {
        if !self.log.level().is_enabled() {
            return;
        }
        let body_preview = request
            .body
            .as_ref()
            .filter(|_| self.log.level().logs_body())
            .map(|body| {
                if body.len() > REQUEST_BODY_PREVIEW {
                    format!("({}-byte body omitted)", body.len())
                } else {
                    String::from_utf8_lossy(body).into_owned()
                }
            });
        self.log.emit(LogRecord::Request {
            method: request.method.to_string(),
            url: request.url.clone(),
            headers: self.log.headers(&request.headers),
            body_preview,
        });
    }
}
