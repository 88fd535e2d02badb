use bytes::Bytes;
use reqwest::StatusCode;

use crate::{
    error::{BodyError, ProcessingError},
    normalize::{CallContext, ErrorNormalizer, Fault, EMPTY_BODY_MESSAGE, LIKELY_SUCCEEDED_MESSAGE},
    ErrorKind, NormalizedError, ResponseEnvelope,
};

/// Result of a dispatched response that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatched<T> {
    /// The success continuation produced a value.
    Completed(T),
    /// An authentication call returned 200 but its body stream was closed
    /// before it could be read. Its side effects had already happened.
    AssumedCompleted,
}

impl<T> Dispatched<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::AssumedCompleted => None,
        }
    }
}

/// Routes a finished response to exactly one of success or error.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseDispatcher {
    normalizer: ErrorNormalizer,
}

impl ResponseDispatcher {
    pub fn new(normalizer: ErrorNormalizer) -> Self {
        Self { normalizer }
    }

    /// Drains the body once and hands it to `on_success`, or normalizes the
    /// failure.
    pub async fn dispatch<T, F>(
        &self,
        mut response: ResponseEnvelope,
        context: CallContext,
        on_success: F,
    ) -> Result<Dispatched<T>, NormalizedError>
    where
        F: FnOnce(Bytes) -> Result<T, ProcessingError>,
    {
        let status = response.status;
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(self.normalizer.normalize(
                &Fault::Status {
                    status: status.as_u16(),
                    body: body.as_deref(),
                },
                context,
            ));
        }
        if response.body.is_absent() {
            return Err(empty_body(status));
        }

        let processed = match response.bytes().await {
            // Chunked or HTTP/2 bodies without a length only show up empty here.
            Ok(bytes) if bytes.is_empty() => return Err(empty_body(status)),
            Ok(bytes) => on_success(bytes),
            Err(err) => Err(ProcessingError::Body(err)),
        };

        match processed {
            Ok(value) => Ok(Dispatched::Completed(value)),
            Err(ProcessingError::Body(BodyError::Closed)) if status == StatusCode::OK => {
                if context.is_authentication() {
                    tracing::warn!(
                        url = %response.url,
                        ?context,
                        "body closed after 200 on authentication call; assuming success"
                    );
                    Ok(Dispatched::AssumedCompleted)
                } else {
                    Err(
                        NormalizedError::new(ErrorKind::ConnectionClosed, LIKELY_SUCCEEDED_MESSAGE)
                            .with_status(status.as_u16()),
                    )
                }
            }
            Err(err) => Err(self
                .normalizer
                .normalize(&Fault::Processing(&err), context)
                .with_status(status.as_u16())),
        }
    }

    /// Dispatches a JSON body decoded into `T`.
    pub async fn dispatch_json<T>(
        &self,
        response: ResponseEnvelope,
        context: CallContext,
    ) -> Result<Dispatched<T>, NormalizedError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.dispatch(response, context, |bytes| {
            Ok(serde_json::from_slice::<T>(&bytes)?)
        })
        .await
    }
}

fn empty_body(status: StatusCode) -> NormalizedError {
    NormalizedError::new(ErrorKind::MalformedResponse, EMPTY_BODY_MESSAGE)
        .with_status(status.as_u16())
}
