use std::{fmt, future::Future, sync::Arc};

use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    dispatch::{Dispatched, ResponseDispatcher},
    logging::HttpLogger,
    normalize::CallContext,
    pipeline::RequestPipeline,
    ClientOptions, ConfigError, ErrorKind, HttpRequest, NormalizedError, ReqwestTransport,
    ResponseEnvelope, Transport,
};

/// HTTP client for the food-label analysis API.
///
/// Every call goes through the [`RequestPipeline`] (retry, timeout
/// classification, safe body handling) and finishes in the
/// [`ResponseDispatcher`], so callers only ever see a decoded value or a
/// [`NormalizedError`].
pub struct LabelClient<T = ReqwestTransport> {
    pipeline: Arc<RequestPipeline<T>>,
    dispatcher: ResponseDispatcher,
    base_url: String,
    authorization: Option<HeaderValue>,
}

impl<T> Clone for LabelClient<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            dispatcher: self.dispatcher,
            base_url: self.base_url.clone(),
            authorization: self.authorization.clone(),
        }
    }
}

impl<T> fmt::Debug for LabelClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelClient")
            .field("base_url", &self.base_url)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl LabelClient<ReqwestTransport> {
    /// Creates a client backed by `reqwest`.
    pub fn new(options: ClientOptions) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(&options)?;
        Ok(Self::with_transport(options, transport))
    }

    /// Creates a client from `FOODLABEL_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`] for the variables read.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(ClientOptions::from_env()?)
    }
}

impl<T: Transport> LabelClient<T> {
    /// Creates a client over any transport, logging through `tracing`.
    pub fn with_transport(options: ClientOptions, transport: T) -> Self {
        let pipeline = RequestPipeline::new(&options, transport);
        Self::from_pipeline(options, pipeline)
    }

    /// Creates a client with a custom log destination.
    pub fn with_logger(options: ClientOptions, transport: T, logger: Arc<dyn HttpLogger>) -> Self {
        let pipeline = RequestPipeline::with_logger(&options, transport, logger);
        Self::from_pipeline(options, pipeline)
    }

    fn from_pipeline(options: ClientOptions, pipeline: RequestPipeline<T>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            dispatcher: ResponseDispatcher::default(),
            base_url: options.base_url,
            authorization: None,
        }
    }

    /// Returns a client that sends `Authorization: Bearer <token>`.
    ///
    /// If the token already carries the `Bearer ` prefix it is kept as-is.
    pub fn with_bearer(mut self, token: impl AsRef<str>) -> Result<Self, ConfigError> {
        let authorization = normalize_bearer_authorization(token.as_ref());
        let mut value =
            HeaderValue::from_str(&authorization).map_err(|_| ConfigError::InvalidValue {
                name: "authorization",
                value: "<redacted>".to_owned(),
            })?;
        value.set_sensitive(true);
        self.authorization = Some(value);
        Ok(self)
    }

    pub fn pipeline(&self) -> &RequestPipeline<T> {
        &self.pipeline
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Runs the pipeline and returns the raw response, including non-2xx.
    pub async fn execute(
        &self,
        request: HttpRequest,
        context: CallContext,
    ) -> Result<ResponseEnvelope, NormalizedError> {
        self.pipeline
            .execute(self.authorize(request), context)
            .await
    }

    /// Sends a request and decodes a JSON success body.
    pub async fn send_json<R: DeserializeOwned>(
        &self,
        request: HttpRequest,
        context: CallContext,
    ) -> Result<Dispatched<R>, NormalizedError> {
        self.send_json_until(request, context, std::future::pending())
            .await
    }

    /// Like [`send_json`](Self::send_json), abandoning the call once `cancel`
    /// completes.
    pub async fn send_json_until<R, C>(
        &self,
        request: HttpRequest,
        context: CallContext,
        cancel: C,
    ) -> Result<Dispatched<R>, NormalizedError>
    where
        R: DeserializeOwned,
        C: Future<Output = ()>,
    {
        let response = self
            .pipeline
            .execute_until(self.authorize(request), context, cancel)
            .await?;
        self.dispatcher.dispatch_json(response, context).await
    }

    pub async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        context: CallContext,
    ) -> Result<Dispatched<R>, NormalizedError> {
        self.send_json(HttpRequest::get(self.url(path)), context)
            .await
    }

    pub async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        context: CallContext,
    ) -> Result<Dispatched<R>, NormalizedError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = HttpRequest::post_json(self.url(path), body).map_err(|err| {
            NormalizedError::new(
                ErrorKind::InternalClientError,
                format!("Could not encode request body: {err}"),
            )
        })?;
        self.send_json(request, context).await
    }

    /// Sends a DELETE; any 2xx counts as success, with or without a body.
    pub async fn delete(&self, path: &str, context: CallContext) -> Result<(), NormalizedError> {
        let response = self
            .execute(HttpRequest::delete(self.url(path)), context)
            .await?;
        if response.is_success() {
            return Ok(());
        }
        self.dispatcher
            .dispatch(response, context, |_| Ok(()))
            .await
            .map(|_| ())
    }

    fn authorize(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(value) = &self.authorization {
            if !request.headers.contains_key(AUTHORIZATION) {
                request.headers.insert(AUTHORIZATION, value.clone());
            }
        }
        request
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
